//! Change events published by the in-memory store.

mod common;

use bar_tab_service::aggregate::OrderEdit;
use bar_tab_service::events::{ChangeEvent, EventType};
use bar_tab_service::models::EntityKind;
use common::Bar;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast::{error::TryRecvError, Receiver};

fn drain(events: &mut Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
    let mut out = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => out.push(event),
            Err(TryRecvError::Empty) => return out,
            Err(err) => panic!("event stream broken: {err}"),
        }
    }
}

#[test]
fn order_lifecycle_events() {
    let bar = Bar::new();
    let mut events = bar.service.store().subscribe();
    let tab = bar.tab("Table 7");
    let order = bar.order(&tab, &[("A", 2)]);

    bar.service.begin_edit(order.order.id, "foh-1").unwrap();
    bar.service
        .apply_edit(
            order.order.id,
            &OrderEdit {
                items: vec![bar.keep(order.items[0].id, "A", 1)],
                ..OrderEdit::default()
            },
        )
        .unwrap();
    bar.service.end_edit(order.order.id).unwrap();
    bar.service.complete_order(order.order.id).unwrap();

    let summary: Vec<_> = drain(&mut events)
        .into_iter()
        .map(|e| {
            assert_eq!(e.tab_id, tab.id);
            (
                e.entity_kind,
                e.event_type,
                e.changed_fields,
                e.old_status,
                e.new_status,
            )
        })
        .collect();

    assert_eq!(
        summary,
        vec![
            (
                EntityKind::Tab,
                EventType::Created,
                vec!["name", "status", "created_at"],
                None,
                Some("open"),
            ),
            (
                EntityKind::Order,
                EventType::Created,
                vec!["status", "items", "created_at"],
                None,
                Some("in_progress"),
            ),
            (
                EntityKind::Order,
                EventType::Updated,
                vec!["status", "edited_by"],
                Some("in_progress"),
                Some("editing"),
            ),
            (EntityKind::Order, EventType::Updated, vec!["items"], None, None),
            (
                EntityKind::Order,
                EventType::Updated,
                vec!["status", "edited_by"],
                Some("editing"),
                Some("in_progress"),
            ),
            (
                EntityKind::Order,
                EventType::Updated,
                vec!["status", "completed_at"],
                Some("in_progress"),
                Some("complete"),
            ),
        ]
    );
}

#[test]
fn failed_operations_are_silent() {
    let bar = Bar::new();
    let tab = bar.tab("Table 7");
    let order = bar.order(&tab, &[("A", 1)]).order;
    bar.service.begin_edit(order.id, "foh-1").unwrap();
    let mut events = bar.service.store().subscribe();

    assert!(!bar.service.begin_edit(order.id, "foh-2").unwrap().is_applied());
    assert!(!bar.service.complete_order(order.id).unwrap().is_applied());
    assert!(bar.service.create_order(tab.id, None, &[]).is_err());

    assert!(drain(&mut events).is_empty());
}

#[test]
fn unchanged_edit_is_silent() {
    let bar = Bar::new();
    let tab = bar.tab("Table 7");
    let order = bar.order(&tab, &[("A", 1)]);
    bar.service.begin_edit(order.order.id, "foh-1").unwrap();
    let mut events = bar.service.store().subscribe();

    let outcome = bar
        .service
        .apply_edit(
            order.order.id,
            &OrderEdit {
                items: vec![bar.keep(order.items[0].id, "A", 1)],
                ..OrderEdit::default()
            },
        )
        .unwrap();

    assert!(outcome.is_applied());
    assert!(drain(&mut events).is_empty());
}

#[test]
fn tab_close_reopen_and_delete() {
    let bar = Bar::new();
    let tab = bar.tab("Table 7");
    let mut events = bar.service.store().subscribe();

    bar.service.close_tab(tab.id).unwrap();
    bar.service.reopen_tab(tab.id).unwrap();
    bar.service.delete_tab(tab.id).unwrap();

    let events = drain(&mut events);
    let kinds: Vec<_> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![EventType::Updated, EventType::Updated, EventType::Deleted]
    );
    assert_eq!(events[0].changed_fields, vec!["status", "closed_at"]);
    assert_eq!(events[1].new_status, Some("open"));
    assert!(events.iter().all(|e| e.entity_id == tab.id));
}
