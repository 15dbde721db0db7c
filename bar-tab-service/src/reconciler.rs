//! Turns a submitted item list for an order under edit into the inserts,
//! updates and deletes that make the stored item list match it.
//!
//! Updated lines keep their original `price_at_order`; inserted lines take
//! the catalog price at the time of the edit.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::aggregate::normalize_notes;
use crate::error::ServiceError;
use crate::models::{EntityKind, MenuItem, OrderItem};

/// One line of an edited order. `id` is `None` for lines added in this edit.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmittedItem {
    pub id: Option<Uuid>,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ItemUpdate {
    pub id: Uuid,
    pub quantity: i32,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconciliation {
    pub inserts: Vec<OrderItem>,
    pub updates: Vec<ItemUpdate>,
    pub deletes: Vec<Uuid>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// The item list that results from applying this reconciliation to `current`.
    pub fn apply(&self, current: &[OrderItem]) -> Vec<OrderItem> {
        let deleted: HashSet<&Uuid> = self.deletes.iter().collect();
        let updates: HashMap<&Uuid, &ItemUpdate> =
            self.updates.iter().map(|u| (&u.id, u)).collect();

        current
            .iter()
            .filter(|item| !deleted.contains(&item.id))
            .map(|item| match updates.get(&item.id) {
                Some(update) => OrderItem {
                    quantity: update.quantity,
                    notes: update.notes.clone(),
                    ..item.clone()
                },
                None => item.clone(),
            })
            .chain(self.inserts.iter().cloned())
            .collect()
    }
}

/// Menu items that must be priced to reconcile `submitted`.
pub fn menu_items_to_price(submitted: &[SubmittedItem]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = submitted
        .iter()
        .filter(|item| item.id.is_none())
        .map(|item| item.menu_item_id)
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Looks up a menu item that can be put on a new order line.
pub(crate) fn orderable<'a>(
    menu: &'a HashMap<Uuid, MenuItem>,
    menu_item_id: &Uuid,
) -> Result<&'a MenuItem, ServiceError> {
    let menu_item = menu
        .get(menu_item_id)
        .ok_or_else(|| ServiceError::not_found(EntityKind::MenuItem, *menu_item_id))?;
    if !menu_item.available {
        return Err(ServiceError::validation(format!(
            "menu item {} is not available",
            menu_item.name
        )));
    }
    Ok(menu_item)
}

pub fn reconcile(
    order_id: Uuid,
    current: &[OrderItem],
    submitted: &[SubmittedItem],
    menu: &HashMap<Uuid, MenuItem>,
) -> Result<Reconciliation, ServiceError> {
    let mut keyed: HashMap<Uuid, &SubmittedItem> = HashMap::new();
    let mut unkeyed = Vec::new();
    for item in submitted {
        match item.id {
            Some(id) => {
                let stored = current.iter().find(|c| c.id == id).ok_or_else(|| {
                    ServiceError::validation(format!(
                        "item {} is not part of order {}",
                        id, order_id
                    ))
                })?;
                if stored.menu_item_id != item.menu_item_id {
                    return Err(ServiceError::validation(format!(
                        "item {} cannot change menu item",
                        id
                    )));
                }
                if keyed.insert(id, item).is_some() {
                    return Err(ServiceError::validation(format!(
                        "item {} submitted more than once",
                        id
                    )));
                }
            }
            None => unkeyed.push(item),
        }
    }

    let mut plan = Reconciliation::default();

    for item in current {
        match keyed.get(&item.id) {
            // A line reduced to zero is removed, never kept with quantity 0.
            Some(wanted) if wanted.quantity > 0 => {
                let notes = normalize_notes(wanted.notes.clone());
                if wanted.quantity != item.quantity || notes != item.notes {
                    plan.updates.push(ItemUpdate {
                        id: item.id,
                        quantity: wanted.quantity,
                        notes,
                    });
                }
            }
            _ => plan.deletes.push(item.id),
        }
    }

    for wanted in unkeyed {
        if wanted.quantity <= 0 {
            return Err(ServiceError::validation(format!(
                "quantity must be positive, got {}",
                wanted.quantity
            )));
        }
        let menu_item = orderable(menu, &wanted.menu_item_id)?;
        plan.inserts.push(OrderItem {
            id: Uuid::new_v4(),
            order_id,
            menu_item_id: menu_item.id,
            quantity: wanted.quantity,
            price_at_order: menu_item.price.clone(),
            notes: normalize_notes(wanted.notes.clone()),
        });
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn money(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn menu_item(price: &str) -> MenuItem {
        MenuItem {
            id: Uuid::new_v4(),
            name: format!("item at {}", price),
            price: money(price),
            category: "Drinks".to_string(),
            available: true,
            updated_at: Utc::now(),
        }
    }

    fn line(order_id: Uuid, menu_item: &MenuItem, quantity: i32, price: &str) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id,
            menu_item_id: menu_item.id,
            quantity,
            price_at_order: money(price),
            notes: None,
        }
    }

    fn keep(item: &OrderItem, quantity: i32) -> SubmittedItem {
        SubmittedItem {
            id: Some(item.id),
            menu_item_id: item.menu_item_id,
            quantity,
            notes: item.notes.clone(),
        }
    }

    fn add(menu_item: &MenuItem, quantity: i32) -> SubmittedItem {
        SubmittedItem {
            id: None,
            menu_item_id: menu_item.id,
            quantity,
            notes: None,
        }
    }

    fn index(items: &[&MenuItem]) -> HashMap<Uuid, MenuItem> {
        items.iter().map(|m| (m.id, (*m).clone())).collect()
    }

    #[test]
    fn updates_keep_old_price_and_inserts_take_catalog_price() {
        let order_id = Uuid::new_v4();
        // A has since been repriced to 6.00; the existing line keeps 5.00.
        let a = menu_item("6.00");
        let b = menu_item("4.00");
        let current = vec![line(order_id, &a, 2, "5.00")];

        let plan = reconcile(
            order_id,
            &current,
            &[keep(&current[0], 3), add(&b, 1)],
            &index(&[&a, &b]),
        )
        .unwrap();

        assert_eq!(
            plan.updates,
            vec![ItemUpdate {
                id: current[0].id,
                quantity: 3,
                notes: None,
            }]
        );
        assert!(plan.deletes.is_empty());
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].menu_item_id, b.id);
        assert_eq!(plan.inserts[0].quantity, 1);
        assert_eq!(plan.inserts[0].price_at_order, money("4.00"));

        let result = plan.apply(&current);
        assert_eq!(result[0].price_at_order, money("5.00"));
        assert_eq!(result[0].quantity, 3);
    }

    #[test]
    fn omitted_items_are_deleted() {
        let order_id = Uuid::new_v4();
        let a = menu_item("5.00");
        let current = vec![line(order_id, &a, 1, "5.00"), line(order_id, &a, 2, "5.00")];

        let plan = reconcile(order_id, &current, &[keep(&current[0], 1)], &index(&[&a])).unwrap();

        assert_eq!(plan.deletes, vec![current[1].id]);
        assert!(plan.updates.is_empty());
        assert!(plan.inserts.is_empty());
    }

    #[test]
    fn non_positive_quantity_on_existing_item_deletes_it() {
        let order_id = Uuid::new_v4();
        let a = menu_item("5.00");
        let current = vec![line(order_id, &a, 2, "5.00"), line(order_id, &a, 1, "5.00")];

        let plan = reconcile(
            order_id,
            &current,
            &[keep(&current[0], 0), keep(&current[1], -3)],
            &index(&[&a]),
        )
        .unwrap();

        assert_eq!(plan.deletes, vec![current[0].id, current[1].id]);
        assert!(plan.apply(&current).is_empty());
    }

    #[test]
    fn unchanged_items_produce_no_operations() {
        let order_id = Uuid::new_v4();
        let a = menu_item("5.00");
        let current = vec![line(order_id, &a, 2, "5.00")];

        let plan = reconcile(order_id, &current, &[keep(&current[0], 2)], &index(&[&a])).unwrap();

        assert!(plan.is_empty());
    }

    #[test]
    fn notes_change_is_an_update() {
        let order_id = Uuid::new_v4();
        let a = menu_item("5.00");
        let current = vec![line(order_id, &a, 2, "5.00")];
        let mut wanted = keep(&current[0], 2);
        wanted.notes = Some("  no ice ".to_string());

        let plan = reconcile(order_id, &current, &[wanted], &index(&[&a])).unwrap();

        assert_eq!(plan.updates[0].notes.as_deref(), Some("no ice"));
    }

    #[test]
    fn new_item_with_zero_quantity_is_rejected() {
        let order_id = Uuid::new_v4();
        let a = menu_item("5.00");

        let result = reconcile(order_id, &[], &[add(&a, 0)], &index(&[&a]));

        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn foreign_item_id_is_rejected() {
        let order_id = Uuid::new_v4();
        let a = menu_item("5.00");
        let other = line(Uuid::new_v4(), &a, 1, "5.00");

        let result = reconcile(order_id, &[], &[keep(&other, 1)], &index(&[&a]));

        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn repeated_item_id_is_rejected() {
        let order_id = Uuid::new_v4();
        let a = menu_item("5.00");
        let current = vec![line(order_id, &a, 1, "5.00")];

        let result = reconcile(
            order_id,
            &current,
            &[keep(&current[0], 1), keep(&current[0], 2)],
            &index(&[&a]),
        );

        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn keyed_item_cannot_switch_menu_item() {
        let order_id = Uuid::new_v4();
        let a = menu_item("5.00");
        let d = menu_item("10.00");
        let current = vec![line(order_id, &a, 2, "5.00")];
        let mut wanted = keep(&current[0], 2);
        wanted.menu_item_id = d.id;

        let result = reconcile(order_id, &current, &[wanted], &index(&[&a, &d]));

        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn unknown_menu_item_is_not_found() {
        let order_id = Uuid::new_v4();
        let a = menu_item("5.00");

        let result = reconcile(order_id, &[], &[add(&a, 1)], &HashMap::new());

        assert!(matches!(
            result,
            Err(ServiceError::NotFound {
                kind: EntityKind::MenuItem,
                ..
            })
        ));
    }

    #[test]
    fn unavailable_menu_item_cannot_be_added() {
        let order_id = Uuid::new_v4();
        let mut a = menu_item("5.00");
        a.available = false;

        let result = reconcile(order_id, &[], &[add(&a, 1)], &index(&[&a]));

        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn menu_items_to_price_lists_new_lines_only() {
        let order_id = Uuid::new_v4();
        let a = menu_item("5.00");
        let b = menu_item("4.00");
        let current = vec![line(order_id, &a, 1, "5.00")];

        let ids = menu_items_to_price(&[keep(&current[0], 1), add(&b, 1), add(&b, 2)]);

        assert_eq!(ids, vec![b.id]);
    }

    fn cents(c: u32) -> BigDecimal {
        format!("{}.{:02}", c / 100, c % 100).parse().unwrap()
    }

    proptest! {
        #[test]
        fn applying_reconciliation_matches_submission(
            current_lines in prop::collection::vec((0usize..4, 1i32..6, 0u32..2000), 0..6),
            wanted_quantities in prop::collection::vec(prop::option::of(-1i32..6), 6),
            new_lines in prop::collection::vec((0usize..4, 1i32..6), 0..4),
            catalog_cents in prop::collection::vec(0u32..2000, 4),
        ) {
            let order_id = Uuid::new_v4();
            let catalog: Vec<MenuItem> = catalog_cents
                .iter()
                .map(|c| MenuItem { price: cents(*c), ..menu_item("0.00") })
                .collect();
            let menu: HashMap<Uuid, MenuItem> = catalog.iter().map(|m| (m.id, m.clone())).collect();

            let current: Vec<OrderItem> = current_lines
                .iter()
                .map(|(m, q, c)| OrderItem {
                    price_at_order: cents(*c),
                    ..line(order_id, &catalog[*m], *q, "0.00")
                })
                .collect();

            let mut submitted = Vec::new();
            let mut expected = Vec::new();
            for (item, wanted) in current.iter().zip(&wanted_quantities) {
                if let Some(quantity) = wanted {
                    submitted.push(keep(item, *quantity));
                    if *quantity > 0 {
                        expected.push((item.menu_item_id, *quantity, item.price_at_order.clone()));
                    }
                }
            }
            for (m, q) in &new_lines {
                submitted.push(add(&catalog[*m], *q));
                expected.push((catalog[*m].id, *q, catalog[*m].price.clone()));
            }

            let plan = reconcile(order_id, &current, &submitted, &menu).unwrap();
            let result: Vec<_> = plan
                .apply(&current)
                .into_iter()
                .map(|i| (i.menu_item_id, i.quantity, i.price_at_order))
                .collect();

            prop_assert_eq!(result, expected);
            prop_assert!(plan.updates.iter().all(|u| u.quantity > 0));
        }
    }
}
