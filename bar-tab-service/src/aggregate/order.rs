use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{normalize_notes, Conflict, Outcome};
use crate::error::ServiceError;
use crate::models::{MenuItem, NewOrderItem, Order, OrderDetails, OrderItem, OrderStatus, Tab};
use crate::reconciler::{self, Reconciliation, SubmittedItem};

/// A replacement item list (and optionally notes) for an order under edit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderEdit {
    /// `None` keeps the current notes; blank text clears them.
    pub notes: Option<String>,
    pub items: Vec<SubmittedItem>,
    /// Release the edit lock as part of the same transition.
    pub finish: bool,
}

/// What an accepted edit will write.
#[derive(Clone, Debug, PartialEq)]
pub struct EditPlan {
    pub order: Order,
    pub reconciliation: Reconciliation,
    pub items: Vec<OrderItem>,
}

impl EditPlan {
    pub fn details(&self) -> OrderDetails {
        OrderDetails {
            order: self.order.clone(),
            items: self.items.clone(),
        }
    }
}

impl Order {
    /// Builds a new order on `tab`, snapshotting each line's price from `menu`.
    pub fn place(
        tab: &Tab,
        notes: Option<String>,
        items: &[NewOrderItem],
        menu: &HashMap<Uuid, MenuItem>,
        now: DateTime<Utc>,
    ) -> Result<Outcome<OrderDetails>, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::validation("an order needs at least one item"));
        }
        if let Some(item) = items.iter().find(|i| i.quantity <= 0) {
            return Err(ServiceError::validation(format!(
                "quantity must be positive, got {}",
                item.quantity
            )));
        }
        if let Err(conflict) = tab.ensure_open() {
            return Ok(Outcome::Rejected(conflict));
        }

        let order = Order {
            id: Uuid::new_v4(),
            tab_id: tab.id,
            status: OrderStatus::InProgress,
            edited_by: None,
            notes: normalize_notes(notes),
            created_at: now,
            completed_at: None,
        };
        let items = items
            .iter()
            .map(|i| {
                let menu_item = reconciler::orderable(menu, &i.menu_item_id)?;
                Ok(OrderItem {
                    id: Uuid::new_v4(),
                    order_id: order.id,
                    menu_item_id: menu_item.id,
                    quantity: i.quantity,
                    price_at_order: menu_item.price.clone(),
                    notes: normalize_notes(i.notes.clone()),
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(Outcome::Applied(OrderDetails { order, items }))
    }

    pub fn begin_edit(&self, editor: &str) -> Result<Order, Conflict> {
        self.expect(OrderStatus::InProgress)?;
        Ok(Order {
            status: OrderStatus::Editing,
            edited_by: Some(editor.to_string()),
            ..self.clone()
        })
    }

    pub fn end_edit(&self) -> Result<Order, Conflict> {
        self.expect(OrderStatus::Editing)?;
        Ok(Order {
            status: OrderStatus::InProgress,
            edited_by: None,
            ..self.clone()
        })
    }

    /// The kitchen marks the order served. Held while editing; terminal.
    pub fn complete(&self, now: DateTime<Utc>) -> Result<Order, Conflict> {
        self.expect(OrderStatus::InProgress)?;
        Ok(Order {
            status: OrderStatus::Complete,
            completed_at: Some(now),
            ..self.clone()
        })
    }

    /// `completed_at` is set exactly when complete, `edited_by` exactly when editing.
    pub fn is_consistent(&self) -> bool {
        (self.status == OrderStatus::Complete) == self.completed_at.is_some()
            && (self.status == OrderStatus::Editing) == self.edited_by.is_some()
    }

    fn expect(&self, expect: OrderStatus) -> Result<(), Conflict> {
        if self.status != expect {
            return Err(Conflict::Order {
                current: self.status,
                expect,
            });
        }
        Ok(())
    }
}

/// Checks the edit lock and reconciles the submitted items against `current`.
pub fn plan_edit(
    current: &OrderDetails,
    edit: &OrderEdit,
    menu: &HashMap<Uuid, MenuItem>,
) -> Result<Outcome<EditPlan>, ServiceError> {
    if let Err(conflict) = current.order.expect(OrderStatus::Editing) {
        return Ok(Outcome::Rejected(conflict));
    }

    let reconciliation =
        reconciler::reconcile(current.order.id, &current.items, &edit.items, menu)?;
    let items = reconciliation.apply(&current.items);
    if items.is_empty() {
        return Err(ServiceError::validation(
            "an order must keep at least one item",
        ));
    }

    let mut order = current.order.clone();
    if let Some(notes) = &edit.notes {
        order.notes = normalize_notes(Some(notes.clone()));
    }
    if edit.finish {
        order = match order.end_edit() {
            Ok(order) => order,
            Err(conflict) => return Ok(Outcome::Rejected(conflict)),
        };
    }

    Ok(Outcome::Applied(EditPlan {
        order,
        reconciliation,
        items,
    }))
}
