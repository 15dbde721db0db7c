use bar_proto::{
    common::Money,
    tab_service::{
        self as proto, ChangeEvent as ChangeEventMessage, KitchenTicket as KitchenTicketMessage,
    },
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use prost_types::Timestamp;

use crate::events::{ChangeEvent, EventType};
use crate::models;
use crate::totals::{order_subtotal, tab_total};

pub fn money(amount: &BigDecimal) -> Money {
    Money {
        amount: amount.to_string(),
    }
}

pub fn timestamp(t: &DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: t.timestamp(),
        nanos: t.timestamp_subsec_nanos() as i32,
    }
}

pub fn serialize_tab(details: &models::TabDetails) -> proto::Tab {
    let tab = &details.tab;
    proto::Tab {
        id: tab.id.to_string(),
        name: tab.name.clone(),
        status: proto::TabStatus::from(tab.status).into(),
        created_at: Some(timestamp(&tab.created_at)),
        closed_at: tab.closed_at.as_ref().map(timestamp),
        orders: details.orders.iter().map(serialize_order).collect(),
        total: Some(money(&tab_total(&details.orders))),
    }
}

pub fn serialize_order(details: &models::OrderDetails) -> proto::Order {
    let order = &details.order;
    proto::Order {
        id: order.id.to_string(),
        tab_id: order.tab_id.to_string(),
        status: proto::OrderStatus::from(order.status).into(),
        edited_by: order.edited_by.clone(),
        notes: order.notes.clone(),
        created_at: Some(timestamp(&order.created_at)),
        completed_at: order.completed_at.as_ref().map(timestamp),
        items: details
            .items
            .iter()
            .map(|i| proto::OrderItem {
                id: i.id.to_string(),
                order_id: i.order_id.to_string(),
                menu_item_id: i.menu_item_id.to_string(),
                quantity: i.quantity,
                price_at_order: Some(money(&i.price_at_order)),
                notes: i.notes.clone(),
            })
            .collect(),
        subtotal: Some(money(&order_subtotal(&details.items))),
    }
}

pub fn serialize_menu_item(item: &models::MenuItem) -> proto::MenuItem {
    proto::MenuItem {
        id: item.id.to_string(),
        name: item.name.clone(),
        price: Some(money(&item.price)),
        category: item.category.clone(),
        available: item.available,
    }
}

pub fn serialize_kitchen_ticket(
    ticket: &models::KitchenTicket,
    now: DateTime<Utc>,
) -> KitchenTicketMessage {
    KitchenTicketMessage {
        order: Some(serialize_order(&ticket.order)),
        tab_name: ticket.tab_name.clone(),
        item_count: ticket.item_count().try_into().unwrap_or(i32::MAX),
        elapsed_seconds: ticket.elapsed_seconds(now),
    }
}

pub fn serialize_change_event(event: &ChangeEvent) -> ChangeEventMessage {
    let event_type = match event.event_type {
        EventType::Created => proto::EventType::Created,
        EventType::Updated => proto::EventType::Updated,
        EventType::Deleted => proto::EventType::Deleted,
    };
    ChangeEventMessage {
        entity_kind: proto::EntityKind::from(event.entity_kind).into(),
        entity_id: event.entity_id.to_string(),
        tab_id: event.tab_id.to_string(),
        event_type: event_type.into(),
        changed_fields: event
            .changed_fields
            .iter()
            .map(|f| f.to_string())
            .collect(),
        old_status: event.old_status.map(str::to_string),
        new_status: event.new_status.map(str::to_string),
        occurred_at: Some(timestamp(&event.occurred_at)),
    }
}
