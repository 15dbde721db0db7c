use bigdecimal::BigDecimal;
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::aggregate::{OrderEdit, Outcome};
use crate::error::ServiceError;
use crate::models::{
    KitchenTicket, MenuItem, NewOrderItem, Order, OrderDetails, Tab, TabDetails,
};
use crate::store::TabStore;
use crate::totals::tab_total;

/// Front-of-house and kitchen commands over a [`TabStore`].
///
/// Precondition failures come back as [`Outcome::Rejected`]; only unknown ids,
/// bad input and storage failures are errors.
pub struct TabService<S> {
    store: S,
}

impl<S: TabStore> TabService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(skip(self))]
    pub fn create_tab(&self, name: &str) -> Result<Tab, ServiceError> {
        let tab = self.store.create_tab(Tab::open(name, Utc::now())?)?;
        info!(tab_id = %tab.id, "tab opened");
        Ok(tab)
    }

    pub fn get_tab(&self, tab_id: Uuid) -> Result<TabDetails, ServiceError> {
        self.store.get_tab(tab_id)
    }

    pub fn list_open_tabs(&self) -> Result<Vec<TabDetails>, ServiceError> {
        self.store.list_open_tabs()
    }

    /// Sum of every line on the tab, recomputed from stored items.
    pub fn get_tab_total(&self, tab_id: Uuid) -> Result<BigDecimal, ServiceError> {
        let details = self.store.get_tab(tab_id)?;
        Ok(tab_total(&details.orders))
    }

    #[instrument(skip(self))]
    pub fn close_tab(&self, tab_id: Uuid) -> Result<Outcome<BigDecimal>, ServiceError> {
        let outcome = self.store.close_tab(tab_id, Utc::now())?;
        log_outcome("close_tab", &outcome);
        Ok(outcome.map(|(_, total)| total))
    }

    #[instrument(skip(self))]
    pub fn reopen_tab(&self, tab_id: Uuid) -> Result<Outcome<Tab>, ServiceError> {
        let outcome = self.store.reopen_tab(tab_id, Utc::now())?;
        log_outcome("reopen_tab", &outcome);
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub fn delete_tab(&self, tab_id: Uuid) -> Result<Tab, ServiceError> {
        let tab = self.store.delete_tab(tab_id, Utc::now())?;
        info!("tab deleted");
        Ok(tab)
    }

    #[instrument(skip(self, items), fields(items = items.len()))]
    pub fn create_order(
        &self,
        tab_id: Uuid,
        notes: Option<String>,
        items: &[NewOrderItem],
    ) -> Result<Outcome<OrderDetails>, ServiceError> {
        let outcome = self.store.create_order(tab_id, notes, items, Utc::now())?;
        match &outcome {
            Outcome::Applied(details) => info!(order_id = %details.order.id, "order placed"),
            Outcome::Rejected(conflict) => warn!(%conflict, "create_order rejected"),
        }
        Ok(outcome)
    }

    pub fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        self.store.get_order(order_id)
    }

    #[instrument(skip(self))]
    pub fn begin_edit(&self, order_id: Uuid, editor: &str) -> Result<Outcome<Order>, ServiceError> {
        let editor = editor.trim();
        if editor.is_empty() {
            return Err(ServiceError::validation("editor must not be blank"));
        }
        let outcome = self.store.begin_edit(order_id, editor, Utc::now())?;
        log_outcome("begin_edit", &outcome);
        Ok(outcome)
    }

    #[instrument(skip(self, edit), fields(items = edit.items.len(), finish = edit.finish))]
    pub fn apply_edit(
        &self,
        order_id: Uuid,
        edit: &OrderEdit,
    ) -> Result<Outcome<OrderDetails>, ServiceError> {
        let outcome = self.store.apply_edit(order_id, edit, Utc::now())?;
        log_outcome("apply_edit", &outcome);
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub fn end_edit(&self, order_id: Uuid) -> Result<Outcome<Order>, ServiceError> {
        let outcome = self.store.end_edit(order_id, Utc::now())?;
        log_outcome("end_edit", &outcome);
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub fn complete_order(&self, order_id: Uuid) -> Result<Outcome<Order>, ServiceError> {
        let outcome = self.store.complete_order(order_id, Utc::now())?;
        log_outcome("complete_order", &outcome);
        Ok(outcome)
    }

    pub fn kitchen_queue(&self) -> Result<Vec<KitchenTicket>, ServiceError> {
        self.store.kitchen_queue()
    }

    pub fn list_menu(&self) -> Result<Vec<MenuItem>, ServiceError> {
        self.store.list_menu()
    }
}

fn log_outcome<T>(operation: &str, outcome: &Outcome<T>) {
    match outcome {
        Outcome::Applied(_) => info!(operation, "applied"),
        Outcome::Rejected(conflict) => warn!(operation, %conflict, "rejected"),
    }
}
