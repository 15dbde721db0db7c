use chrono::{DateTime, Utc};
use diesel::{prelude::*, PgConnection};
use prost::Message;
use uuid::Uuid;

use crate::models::{EntityKind, NewOutbox, Order, Tab};
use crate::{schema, serializer, EVENT_CHANNEL};

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

/// A committed change to a tab or an order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub tab_id: Uuid,
    pub event_type: EventType,
    pub changed_fields: Vec<&'static str>,
    pub old_status: Option<&'static str>,
    pub new_status: Option<&'static str>,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn tab_created(tab: &Tab) -> Self {
        ChangeEvent {
            entity_kind: EntityKind::Tab,
            entity_id: tab.id,
            tab_id: tab.id,
            event_type: EventType::Created,
            changed_fields: vec!["name", "status", "created_at"],
            old_status: None,
            new_status: Some(tab.status.as_str()),
            occurred_at: tab.created_at,
        }
    }

    /// `None` when nothing differs between `before` and `after`.
    pub fn tab_updated(before: &Tab, after: &Tab, at: DateTime<Utc>) -> Option<Self> {
        let mut changed_fields = Vec::new();
        if before.name != after.name {
            changed_fields.push("name");
        }
        if before.status != after.status {
            changed_fields.push("status");
        }
        if before.closed_at != after.closed_at {
            changed_fields.push("closed_at");
        }
        if changed_fields.is_empty() {
            return None;
        }

        let status_changed = before.status != after.status;
        Some(ChangeEvent {
            entity_kind: EntityKind::Tab,
            entity_id: after.id,
            tab_id: after.id,
            event_type: EventType::Updated,
            changed_fields,
            old_status: status_changed.then(|| before.status.as_str()),
            new_status: status_changed.then(|| after.status.as_str()),
            occurred_at: at,
        })
    }

    pub fn tab_deleted(tab: &Tab, at: DateTime<Utc>) -> Self {
        ChangeEvent {
            entity_kind: EntityKind::Tab,
            entity_id: tab.id,
            tab_id: tab.id,
            event_type: EventType::Deleted,
            changed_fields: Vec::new(),
            old_status: Some(tab.status.as_str()),
            new_status: None,
            occurred_at: at,
        }
    }

    pub fn order_created(order: &Order) -> Self {
        let mut changed_fields = vec!["status", "items", "created_at"];
        if order.notes.is_some() {
            changed_fields.push("notes");
        }
        ChangeEvent {
            entity_kind: EntityKind::Order,
            entity_id: order.id,
            tab_id: order.tab_id,
            event_type: EventType::Created,
            changed_fields,
            old_status: None,
            new_status: Some(order.status.as_str()),
            occurred_at: order.created_at,
        }
    }

    /// `None` when neither the order row nor its items changed.
    pub fn order_updated(
        before: &Order,
        after: &Order,
        items_changed: bool,
        at: DateTime<Utc>,
    ) -> Option<Self> {
        let mut changed_fields = Vec::new();
        if before.status != after.status {
            changed_fields.push("status");
        }
        if before.edited_by != after.edited_by {
            changed_fields.push("edited_by");
        }
        if before.notes != after.notes {
            changed_fields.push("notes");
        }
        if before.completed_at != after.completed_at {
            changed_fields.push("completed_at");
        }
        if items_changed {
            changed_fields.push("items");
        }
        if changed_fields.is_empty() {
            return None;
        }

        let status_changed = before.status != after.status;
        Some(ChangeEvent {
            entity_kind: EntityKind::Order,
            entity_id: after.id,
            tab_id: after.tab_id,
            event_type: EventType::Updated,
            changed_fields,
            old_status: status_changed.then(|| before.status.as_str()),
            new_status: status_changed.then(|| after.status.as_str()),
            occurred_at: at,
        })
    }
}

/// Appends change events to the outbox inside the caller's transaction.
pub struct TabEventPublisher<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> TabEventPublisher<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }

    pub fn publish(&mut self, event: &ChangeEvent) -> Result<(), diesel::result::Error> {
        let buf = serializer::serialize_change_event(event).encode_to_vec();

        diesel::insert_into(schema::outbox::table)
            .values(NewOutbox {
                topic: EVENT_CHANNEL.to_string(),
                key: event.entity_id.to_string(),
                value: buf,
            })
            .execute(self.conn)
            .map(|_| ())
    }
}
