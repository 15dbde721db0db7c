use std::collections::HashMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::TabStore;
use crate::aggregate::order::plan_edit;
use crate::aggregate::{Conflict, OrderEdit, Outcome};
use crate::catalog::{MenuChange, MenuReplica};
use crate::error::ServiceError;
use crate::events::ChangeEvent;
use crate::models::{
    EntityKind, KitchenTicket, MenuItem, NewOrderItem, Order, OrderDetails, OrderStatus, Tab,
    TabDetails, TabStatus,
};
use crate::reconciler::menu_items_to_price;
use crate::totals::tab_total;

const EVENT_CAPACITY: usize = 1024;

/// Process-local store. Each map entry is guarded by its shard lock; when an
/// operation needs both, the tab is locked before any order.
pub struct MemoryTabStore {
    tabs: DashMap<Uuid, Tab>,
    orders: DashMap<Uuid, OrderDetails>,
    menu: DashMap<Uuid, MenuItem>,
    events: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryTabStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTabStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tabs: DashMap::new(),
            orders: DashMap::new(),
            menu: DashMap::new(),
            events,
        }
    }

    /// Committed changes, in commit order per entity.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    pub fn upsert_menu_item(&self, item: MenuItem) {
        self.menu.insert(item.id, item);
    }

    fn emit(&self, event: ChangeEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn menu_snapshot(&self, ids: impl IntoIterator<Item = Uuid>) -> HashMap<Uuid, MenuItem> {
        ids.into_iter()
            .filter_map(|id| self.menu.get(&id).map(|item| (id, item.clone())))
            .collect()
    }

    fn orders_of(&self, tab_id: Uuid) -> Vec<OrderDetails> {
        let mut orders: Vec<OrderDetails> = self
            .orders
            .iter()
            .filter(|entry| entry.order.tab_id == tab_id)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|o| o.order.created_at);
        orders
    }

    fn transition_tab(
        &self,
        tab_id: Uuid,
        now: DateTime<Utc>,
        f: impl FnOnce(&Tab) -> Result<Tab, Conflict>,
    ) -> Result<Outcome<Tab>, ServiceError> {
        let mut entry = self
            .tabs
            .get_mut(&tab_id)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Tab, tab_id))?;
        let next = match f(entry.value()) {
            Ok(next) => next,
            Err(conflict) => return Ok(Outcome::Rejected(conflict)),
        };
        if let Some(event) = ChangeEvent::tab_updated(entry.value(), &next, now) {
            self.emit(event);
        }
        *entry = next.clone();
        Ok(Outcome::Applied(next))
    }

    fn transition_order(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
        f: impl FnOnce(&Order) -> Result<Order, Conflict>,
    ) -> Result<Outcome<Order>, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Order, order_id))?;
        let next = match f(&entry.order) {
            Ok(next) => next,
            Err(conflict) => return Ok(Outcome::Rejected(conflict)),
        };
        if let Some(event) = ChangeEvent::order_updated(&entry.order, &next, false, now) {
            self.emit(event);
        }
        entry.order = next.clone();
        Ok(Outcome::Applied(next))
    }
}

impl MenuReplica for MemoryTabStore {
    fn apply_menu_change(&self, change: MenuChange) -> Result<(), ServiceError> {
        match change {
            MenuChange::Upsert(item) => self.upsert_menu_item(item),
            MenuChange::Remove(id) => {
                if let Some(mut item) = self.menu.get_mut(&id) {
                    item.available = false;
                }
            }
        }
        Ok(())
    }
}

impl TabStore for MemoryTabStore {
    fn create_tab(&self, tab: Tab) -> Result<Tab, ServiceError> {
        match self.tabs.entry(tab.id) {
            Entry::Occupied(_) => Err(ServiceError::validation(format!(
                "tab {} already exists",
                tab.id
            ))),
            Entry::Vacant(vacant) => {
                let created = vacant.insert(tab);
                self.emit(ChangeEvent::tab_created(&created));
                Ok(created.clone())
            }
        }
    }

    fn get_tab(&self, tab_id: Uuid) -> Result<TabDetails, ServiceError> {
        let tab = self
            .tabs
            .get(&tab_id)
            .map(|tab| tab.clone())
            .ok_or_else(|| ServiceError::not_found(EntityKind::Tab, tab_id))?;
        let orders = self.orders_of(tab_id);
        Ok(TabDetails { tab, orders })
    }

    fn list_open_tabs(&self) -> Result<Vec<TabDetails>, ServiceError> {
        let mut tabs: Vec<Tab> = self
            .tabs
            .iter()
            .filter(|entry| entry.status == TabStatus::Open)
            .map(|entry| entry.value().clone())
            .collect();
        tabs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(tabs
            .into_iter()
            .map(|tab| {
                let orders = self.orders_of(tab.id);
                TabDetails { tab, orders }
            })
            .collect())
    }

    fn close_tab(
        &self,
        tab_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Outcome<(Tab, BigDecimal)>, ServiceError> {
        let mut entry = self
            .tabs
            .get_mut(&tab_id)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Tab, tab_id))?;
        let next = match entry.close(now) {
            Ok(next) => next,
            Err(conflict) => return Ok(Outcome::Rejected(conflict)),
        };
        let total = tab_total(&self.orders_of(tab_id));
        if let Some(event) = ChangeEvent::tab_updated(entry.value(), &next, now) {
            self.emit(event);
        }
        *entry = next.clone();
        Ok(Outcome::Applied((next, total)))
    }

    fn reopen_tab(&self, tab_id: Uuid, now: DateTime<Utc>) -> Result<Outcome<Tab>, ServiceError> {
        self.transition_tab(tab_id, now, Tab::reopen)
    }

    fn delete_tab(&self, tab_id: Uuid, now: DateTime<Utc>) -> Result<Tab, ServiceError> {
        let (_, tab) = self
            .tabs
            .remove(&tab_id)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Tab, tab_id))?;
        self.orders.retain(|_, details| details.order.tab_id != tab_id);
        self.emit(ChangeEvent::tab_deleted(&tab, now));
        Ok(tab)
    }

    fn create_order(
        &self,
        tab_id: Uuid,
        notes: Option<String>,
        items: &[NewOrderItem],
        now: DateTime<Utc>,
    ) -> Result<Outcome<OrderDetails>, ServiceError> {
        // held until the order is in place so a concurrent close waits for it
        let tab = self
            .tabs
            .get(&tab_id)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Tab, tab_id))?;
        let menu = self.menu_snapshot(items.iter().map(|i| i.menu_item_id));

        let details = match Order::place(&tab, notes, items, &menu, now)? {
            Outcome::Applied(details) => details,
            Outcome::Rejected(conflict) => return Ok(Outcome::Rejected(conflict)),
        };
        let created = self.orders.entry(details.order.id).or_insert(details);
        self.emit(ChangeEvent::order_created(&created.order));
        Ok(Outcome::Applied(created.clone()))
    }

    fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        self.orders
            .get(&order_id)
            .map(|details| details.clone())
            .ok_or_else(|| ServiceError::not_found(EntityKind::Order, order_id))
    }

    fn begin_edit(
        &self,
        order_id: Uuid,
        editor: &str,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Order>, ServiceError> {
        self.transition_order(order_id, now, |order| order.begin_edit(editor))
    }

    fn apply_edit(
        &self,
        order_id: Uuid,
        edit: &OrderEdit,
        now: DateTime<Utc>,
    ) -> Result<Outcome<OrderDetails>, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Order, order_id))?;
        let menu = self.menu_snapshot(menu_items_to_price(&edit.items));

        let plan = match plan_edit(entry.value(), edit, &menu)? {
            Outcome::Applied(plan) => plan,
            Outcome::Rejected(conflict) => return Ok(Outcome::Rejected(conflict)),
        };
        if let Some(event) = ChangeEvent::order_updated(
            &entry.order,
            &plan.order,
            !plan.reconciliation.is_empty(),
            now,
        ) {
            self.emit(event);
        }
        *entry = plan.details();
        Ok(Outcome::Applied(entry.clone()))
    }

    fn end_edit(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<Outcome<Order>, ServiceError> {
        self.transition_order(order_id, now, Order::end_edit)
    }

    fn complete_order(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Order>, ServiceError> {
        self.transition_order(order_id, now, |order| order.complete(now))
    }

    fn kitchen_queue(&self) -> Result<Vec<KitchenTicket>, ServiceError> {
        let mut pending: Vec<OrderDetails> = self
            .orders
            .iter()
            .filter(|entry| entry.order.status != OrderStatus::Complete)
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|o| o.order.created_at);

        // orders guards are released before tabs are read
        Ok(pending
            .into_iter()
            .filter_map(|order| {
                let tab_name = self.tabs.get(&order.order.tab_id)?.name.clone();
                Some(KitchenTicket { order, tab_name })
            })
            .collect())
    }

    fn list_menu(&self) -> Result<Vec<MenuItem>, ServiceError> {
        let mut items: Vec<MenuItem> = self
            .menu
            .iter()
            .filter(|entry| entry.available)
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_menu() -> (MemoryTabStore, MenuItem) {
        let store = MemoryTabStore::new();
        let item = MenuItem {
            id: Uuid::new_v4(),
            name: "Stout".to_string(),
            price: "7.00".parse().unwrap(),
            category: "Drinks".to_string(),
            available: true,
            updated_at: Utc::now(),
        };
        store.upsert_menu_item(item.clone());
        (store, item)
    }

    fn order_one(store: &MemoryTabStore, tab: &Tab, item: &MenuItem) -> OrderDetails {
        store
            .create_order(
                tab.id,
                None,
                &[NewOrderItem {
                    menu_item_id: item.id,
                    quantity: 1,
                    notes: None,
                }],
                Utc::now(),
            )
            .unwrap()
            .applied()
            .unwrap()
    }

    #[test]
    fn delete_tab_removes_its_orders() {
        let (store, item) = store_with_menu();
        let tab = store.create_tab(Tab::open("Booth 4", Utc::now()).unwrap()).unwrap();
        let order = order_one(&store, &tab, &item);

        store.delete_tab(tab.id, Utc::now()).unwrap();

        assert!(matches!(
            store.get_order(order.order.id),
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete_tab(tab.id, Utc::now()),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn rejected_transition_emits_nothing() {
        let (store, item) = store_with_menu();
        let tab = store.create_tab(Tab::open("Booth 4", Utc::now()).unwrap()).unwrap();
        let order = order_one(&store, &tab, &item);
        let mut events = store.subscribe();

        let outcome = store.end_edit(order.order.id, Utc::now()).unwrap();

        assert!(!outcome.is_applied());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn kitchen_queue_skips_complete_orders() {
        let (store, item) = store_with_menu();
        let tab = store.create_tab(Tab::open("Booth 4", Utc::now()).unwrap()).unwrap();
        let first = order_one(&store, &tab, &item);
        let second = order_one(&store, &tab, &item);
        store.complete_order(first.order.id, Utc::now()).unwrap();

        let queue = store.kitchen_queue().unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].order.order.id, second.order.id);
        assert_eq!(queue[0].tab_name, "Booth 4");
    }

    #[test]
    fn removed_menu_items_are_hidden() {
        let (store, item) = store_with_menu();
        assert_eq!(store.list_menu().unwrap().len(), 1);

        store.apply_menu_change(MenuChange::Remove(item.id)).unwrap();

        assert!(store.list_menu().unwrap().is_empty());
        let tab = store.create_tab(Tab::open("Booth 4", Utc::now()).unwrap()).unwrap();
        assert!(matches!(
            store.create_order(
                tab.id,
                None,
                &[NewOrderItem {
                    menu_item_id: item.id,
                    quantity: 1,
                    notes: None,
                }],
                Utc::now(),
            ),
            Err(ServiceError::Validation(_))
        ));
    }
}
