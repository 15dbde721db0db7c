//! Persistence for tabs, orders and their items.
//!
//! Every mutating method is one atomic read-modify-write scoped to a single
//! tab or order: it locks the entity, checks the precondition through the
//! state machines in [`crate::aggregate`], writes, and emits the resulting
//! [`ChangeEvent`](crate::events::ChangeEvent) before the lock is released.
//! Operations on different entities never wait on each other.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::aggregate::{OrderEdit, Outcome};
use crate::error::ServiceError;
use crate::models::{
    KitchenTicket, MenuItem, NewOrderItem, Order, OrderDetails, Tab, TabDetails,
};

pub mod memory;
pub mod pg;

pub use memory::MemoryTabStore;
pub use pg::PgTabStore;

pub trait TabStore: Send + Sync {
    fn create_tab(&self, tab: Tab) -> Result<Tab, ServiceError>;

    fn get_tab(&self, tab_id: Uuid) -> Result<TabDetails, ServiceError>;

    /// Open tabs, newest first.
    fn list_open_tabs(&self) -> Result<Vec<TabDetails>, ServiceError>;

    /// Closes the tab and returns it with its final total.
    fn close_tab(
        &self,
        tab_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Outcome<(Tab, BigDecimal)>, ServiceError>;

    fn reopen_tab(&self, tab_id: Uuid, now: DateTime<Utc>) -> Result<Outcome<Tab>, ServiceError>;

    /// Removes the tab with all of its orders and items, whatever their state.
    fn delete_tab(&self, tab_id: Uuid, now: DateTime<Utc>) -> Result<Tab, ServiceError>;

    fn create_order(
        &self,
        tab_id: Uuid,
        notes: Option<String>,
        items: &[NewOrderItem],
        now: DateTime<Utc>,
    ) -> Result<Outcome<OrderDetails>, ServiceError>;

    fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError>;

    fn begin_edit(
        &self,
        order_id: Uuid,
        editor: &str,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Order>, ServiceError>;

    fn apply_edit(
        &self,
        order_id: Uuid,
        edit: &OrderEdit,
        now: DateTime<Utc>,
    ) -> Result<Outcome<OrderDetails>, ServiceError>;

    fn end_edit(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<Outcome<Order>, ServiceError>;

    fn complete_order(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Order>, ServiceError>;

    /// Orders still in the kitchen (in progress or held for edit), oldest first.
    fn kitchen_queue(&self) -> Result<Vec<KitchenTicket>, ServiceError>;

    /// Available menu items by category, then name.
    fn list_menu(&self) -> Result<Vec<MenuItem>, ServiceError>;
}
