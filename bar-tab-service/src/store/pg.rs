use std::collections::HashMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::{delete, insert_into, update, PgConnection};
use uuid::Uuid;

use super::TabStore;
use crate::aggregate::order::plan_edit;
use crate::aggregate::{Conflict, OrderEdit, Outcome};
use crate::catalog::{MenuChange, MenuReplica};
use crate::error::ServiceError;
use crate::events::{ChangeEvent, TabEventPublisher};
use crate::models::{
    EntityKind, KitchenTicket, MenuItem, NewOrderItem, Order, OrderDetails, OrderItem,
    OrderStatus, Tab, TabDetails, TabStatus,
};
use crate::reconciler::menu_items_to_price;
use crate::totals::tab_total;
use crate::{establish_connection, schema};

/// Postgres-backed store. Every mutation runs in one transaction that locks
/// the row with `FOR UPDATE` and appends its change event to the outbox.
pub struct PgTabStore {
    database_url: String,
}

impl PgTabStore {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    fn connect(&self) -> Result<PgConnection, ServiceError> {
        establish_connection(&self.database_url)
    }

    fn transition_order(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
        f: impl FnOnce(&Order) -> Result<Order, Conflict>,
    ) -> Result<Outcome<Order>, ServiceError> {
        let conn = &mut self.connect()?;
        conn.transaction::<_, ServiceError, _>(|conn| {
            let order = lock_order(conn, order_id)?;
            let next = match f(&order) {
                Ok(next) => next,
                Err(conflict) => return Ok(Outcome::Rejected(conflict)),
            };
            write_order(conn, &next)?;

            if let Some(event) = ChangeEvent::order_updated(&order, &next, false, now) {
                TabEventPublisher::new(conn).publish(&event)?;
            }
            Ok(Outcome::Applied(next))
        })
    }
}

fn lock_tab(conn: &mut PgConnection, tab_id: Uuid) -> Result<Tab, ServiceError> {
    schema::tabs::table
        .find(tab_id)
        .select(Tab::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Tab, tab_id))
}

/// Blocks close and delete of the tab, not other orders being placed on it.
fn share_tab(conn: &mut PgConnection, tab_id: Uuid) -> Result<Tab, ServiceError> {
    schema::tabs::table
        .find(tab_id)
        .select(Tab::as_select())
        .for_share()
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Tab, tab_id))
}

fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Order, ServiceError> {
    schema::orders::table
        .find(order_id)
        .select(Order::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Order, order_id))
}

fn write_tab(conn: &mut PgConnection, tab: &Tab) -> QueryResult<usize> {
    use schema::tabs::dsl::*;

    update(tabs.find(tab.id))
        .set((status.eq(tab.status), closed_at.eq(tab.closed_at)))
        .execute(conn)
}

fn write_order(conn: &mut PgConnection, order: &Order) -> QueryResult<usize> {
    use schema::orders::dsl::*;

    update(orders.find(order.id))
        .set((
            status.eq(order.status),
            edited_by.eq(&order.edited_by),
            notes.eq(&order.notes),
            completed_at.eq(order.completed_at),
        ))
        .execute(conn)
}

fn load_menu(conn: &mut PgConnection, ids: &[Uuid]) -> QueryResult<HashMap<Uuid, MenuItem>> {
    let items: Vec<MenuItem> = schema::menu_items::table
        .filter(schema::menu_items::id.eq_any(ids))
        .select(MenuItem::as_select())
        .load(conn)?;
    Ok(items.into_iter().map(|item| (item.id, item)).collect())
}

fn load_order_details(
    conn: &mut PgConnection,
    orders: Vec<Order>,
) -> QueryResult<Vec<OrderDetails>> {
    let items = OrderItem::belonging_to(&orders)
        .select(OrderItem::as_select())
        .load::<OrderItem>(conn)?
        .grouped_by(&orders);

    Ok(orders
        .into_iter()
        .zip(items)
        .map(|(order, items)| OrderDetails { order, items })
        .collect())
}

fn load_tab_details(conn: &mut PgConnection, tabs: Vec<Tab>) -> QueryResult<Vec<TabDetails>> {
    let orders = Order::belonging_to(&tabs)
        .select(Order::as_select())
        .order(schema::orders::created_at.asc())
        .load(conn)?;

    let mut by_tab: HashMap<Uuid, Vec<OrderDetails>> = HashMap::new();
    for details in load_order_details(conn, orders)? {
        by_tab.entry(details.order.tab_id).or_default().push(details);
    }

    Ok(tabs
        .into_iter()
        .map(|tab| {
            let orders = by_tab.remove(&tab.id).unwrap_or_default();
            TabDetails { tab, orders }
        })
        .collect())
}

impl MenuReplica for PgTabStore {
    fn apply_menu_change(&self, change: MenuChange) -> Result<(), ServiceError> {
        use schema::menu_items::dsl::*;

        let conn = &mut self.connect()?;
        match change {
            MenuChange::Upsert(item) => {
                insert_into(menu_items)
                    .values(&item)
                    .on_conflict(id)
                    .do_update()
                    .set(&item)
                    .execute(conn)?;
            }
            MenuChange::Remove(menu_item_id) => {
                update(menu_items.find(menu_item_id))
                    .set((available.eq(false), updated_at.eq(diesel::dsl::now)))
                    .execute(conn)?;
            }
        }
        Ok(())
    }
}

impl TabStore for PgTabStore {
    fn create_tab(&self, tab: Tab) -> Result<Tab, ServiceError> {
        let conn = &mut self.connect()?;
        conn.transaction::<_, ServiceError, _>(|conn| {
            insert_into(schema::tabs::table)
                .values(&tab)
                .execute(conn)?;
            TabEventPublisher::new(conn).publish(&ChangeEvent::tab_created(&tab))?;
            Ok(tab)
        })
    }

    fn get_tab(&self, tab_id: Uuid) -> Result<TabDetails, ServiceError> {
        let conn = &mut self.connect()?;
        let tab = schema::tabs::table
            .find(tab_id)
            .select(Tab::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Tab, tab_id))?;

        let mut details = load_tab_details(conn, vec![tab])?;
        Ok(details.remove(0))
    }

    fn list_open_tabs(&self) -> Result<Vec<TabDetails>, ServiceError> {
        use schema::tabs::dsl::*;

        let conn = &mut self.connect()?;
        let results = tabs
            .filter(status.eq(TabStatus::Open))
            .order(created_at.desc())
            .select(Tab::as_select())
            .load(conn)?;

        Ok(load_tab_details(conn, results)?)
    }

    fn close_tab(
        &self,
        tab_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Outcome<(Tab, BigDecimal)>, ServiceError> {
        let conn = &mut self.connect()?;
        conn.transaction::<_, ServiceError, _>(|conn| {
            let tab = lock_tab(conn, tab_id)?;
            let next = match tab.close(now) {
                Ok(next) => next,
                Err(conflict) => return Ok(Outcome::Rejected(conflict)),
            };

            let orders = Order::belonging_to(&tab)
                .select(Order::as_select())
                .load(conn)?;
            let total = tab_total(&load_order_details(conn, orders)?);

            write_tab(conn, &next)?;
            if let Some(event) = ChangeEvent::tab_updated(&tab, &next, now) {
                TabEventPublisher::new(conn).publish(&event)?;
            }
            Ok(Outcome::Applied((next, total)))
        })
    }

    fn reopen_tab(&self, tab_id: Uuid, now: DateTime<Utc>) -> Result<Outcome<Tab>, ServiceError> {
        let conn = &mut self.connect()?;
        conn.transaction::<_, ServiceError, _>(|conn| {
            let tab = lock_tab(conn, tab_id)?;
            let next = match tab.reopen() {
                Ok(next) => next,
                Err(conflict) => return Ok(Outcome::Rejected(conflict)),
            };

            write_tab(conn, &next)?;
            if let Some(event) = ChangeEvent::tab_updated(&tab, &next, now) {
                TabEventPublisher::new(conn).publish(&event)?;
            }
            Ok(Outcome::Applied(next))
        })
    }

    fn delete_tab(&self, tab_id: Uuid, now: DateTime<Utc>) -> Result<Tab, ServiceError> {
        let conn = &mut self.connect()?;
        conn.transaction::<_, ServiceError, _>(|conn| {
            let tab = lock_tab(conn, tab_id)?;
            // orders and their items go with it (ON DELETE CASCADE)
            delete(schema::tabs::table.find(tab_id)).execute(conn)?;
            TabEventPublisher::new(conn).publish(&ChangeEvent::tab_deleted(&tab, now))?;
            Ok(tab)
        })
    }

    fn create_order(
        &self,
        tab_id: Uuid,
        notes: Option<String>,
        items: &[NewOrderItem],
        now: DateTime<Utc>,
    ) -> Result<Outcome<OrderDetails>, ServiceError> {
        let conn = &mut self.connect()?;
        conn.transaction::<_, ServiceError, _>(|conn| {
            let tab = share_tab(conn, tab_id)?;
            let ids: Vec<Uuid> = items.iter().map(|i| i.menu_item_id).collect();
            let menu = load_menu(conn, &ids)?;

            let details = match Order::place(&tab, notes, items, &menu, now)? {
                Outcome::Applied(details) => details,
                Outcome::Rejected(conflict) => return Ok(Outcome::Rejected(conflict)),
            };

            insert_into(schema::orders::table)
                .values(&details.order)
                .execute(conn)?;
            insert_into(schema::order_items::table)
                .values(&details.items)
                .execute(conn)?;

            TabEventPublisher::new(conn).publish(&ChangeEvent::order_created(&details.order))?;
            Ok(Outcome::Applied(details))
        })
    }

    fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let conn = &mut self.connect()?;
        let order = schema::orders::table
            .find(order_id)
            .select(Order::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Order, order_id))?;
        let items = OrderItem::belonging_to(&order)
            .select(OrderItem::as_select())
            .load(conn)?;

        Ok(OrderDetails { order, items })
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
        let conn = &mut self.connect()?;
        conn.transaction::<_, ServiceError, _>(|conn| {
            let order = lock_order(conn, order_id)?;
            let items = OrderItem::belonging_to(&order)
                .select(OrderItem::as_select())
                .load(conn)?;
            let current = OrderDetails { order, items };
            let menu = load_menu(conn, &menu_items_to_price(&edit.items))?;

            let plan = match plan_edit(&current, edit, &menu)? {
                Outcome::Applied(plan) => plan,
                Outcome::Rejected(conflict) => return Ok(Outcome::Rejected(conflict)),
            };

            let changes = &plan.reconciliation;
            if !changes.deletes.is_empty() {
                delete(
                    schema::order_items::table
                        .filter(schema::order_items::id.eq_any(&changes.deletes)),
                )
                .execute(conn)?;
            }
            for change in &changes.updates {
                update(schema::order_items::table.find(change.id))
                    .set((
                        schema::order_items::quantity.eq(change.quantity),
                        schema::order_items::notes.eq(&change.notes),
                    ))
                    .execute(conn)?;
            }
            if !changes.inserts.is_empty() {
                insert_into(schema::order_items::table)
                    .values(&changes.inserts)
                    .execute(conn)?;
            }
            write_order(conn, &plan.order)?;

            if let Some(event) = ChangeEvent::order_updated(
                &current.order,
                &plan.order,
                !changes.is_empty(),
                now,
            ) {
                TabEventPublisher::new(conn).publish(&event)?;
            }
            Ok(Outcome::Applied(plan.details()))
        })
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
        use schema::orders::dsl::*;

        let conn = &mut self.connect()?;
        let rows: Vec<(Order, String)> = orders
            .inner_join(schema::tabs::table)
            .filter(status.eq_any([OrderStatus::InProgress, OrderStatus::Editing]))
            .order(created_at.asc())
            .select((Order::as_select(), schema::tabs::name))
            .load(conn)?;
        let (pending, tab_names): (Vec<Order>, Vec<String>) = rows.into_iter().unzip();

        Ok(load_order_details(conn, pending)?
            .into_iter()
            .zip(tab_names)
            .map(|(order, tab_name)| KitchenTicket { order, tab_name })
            .collect())
    }

    fn list_menu(&self) -> Result<Vec<MenuItem>, ServiceError> {
        use schema::menu_items::dsl::*;

        let conn = &mut self.connect()?;
        Ok(menu_items
            .filter(available.eq(true))
            .order((category.asc(), name.asc()))
            .select(MenuItem::as_select())
            .load(conn)?)
    }
}
