use std::fmt;
use std::io::Write;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
};
use uuid::Uuid;

use crate::schema::{menu_items, order_items, orders, outbox, tabs};

#[derive(FromSqlRow, AsExpression, PartialEq, Eq, Copy, Clone, Debug)]
#[diesel(sql_type = crate::schema::sql_types::TabStatus)]
pub enum TabStatus {
    Open,
    Closed,
}

impl TabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabStatus::Open => "open",
            TabStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for TabStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<crate::schema::sql_types::TabStatus, Pg> for TabStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::TabStatus, Pg> for TabStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"open" => Ok(TabStatus::Open),
            b"closed" => Ok(TabStatus::Closed),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl From<TabStatus> for bar_proto::tab_service::TabStatus {
    fn from(s: TabStatus) -> Self {
        match s {
            TabStatus::Open => bar_proto::tab_service::TabStatus::Open,
            TabStatus::Closed => bar_proto::tab_service::TabStatus::Closed,
        }
    }
}

#[derive(FromSqlRow, AsExpression, PartialEq, Eq, Copy, Clone, Debug)]
#[diesel(sql_type = crate::schema::sql_types::OrderStatus)]
pub enum OrderStatus {
    InProgress,
    Editing,
    Complete,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Editing => "editing",
            OrderStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<crate::schema::sql_types::OrderStatus, Pg> for OrderStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::OrderStatus, Pg> for OrderStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"in_progress" => Ok(OrderStatus::InProgress),
            b"editing" => Ok(OrderStatus::Editing),
            b"complete" => Ok(OrderStatus::Complete),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl From<OrderStatus> for bar_proto::tab_service::OrderStatus {
    fn from(s: OrderStatus) -> Self {
        match s {
            OrderStatus::InProgress => bar_proto::tab_service::OrderStatus::InProgress,
            OrderStatus::Editing => bar_proto::tab_service::OrderStatus::Editing,
            OrderStatus::Complete => bar_proto::tab_service::OrderStatus::Complete,
        }
    }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum EntityKind {
    Tab,
    Order,
    MenuItem,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Tab => "tab",
            EntityKind::Order => "order",
            EntityKind::MenuItem => "menu item",
        })
    }
}

impl From<EntityKind> for bar_proto::tab_service::EntityKind {
    fn from(k: EntityKind) -> Self {
        match k {
            EntityKind::Tab => bar_proto::tab_service::EntityKind::Tab,
            EntityKind::Order => bar_proto::tab_service::EntityKind::Order,
            EntityKind::MenuItem => bar_proto::tab_service::EntityKind::MenuItem,
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Insertable, Clone, Debug, PartialEq)]
#[diesel(table_name = tabs)]
pub struct Tab {
    pub id: Uuid,
    pub name: String,
    pub status: TabStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(
    Queryable, Selectable, Identifiable, Associations, Insertable, Clone, Debug, PartialEq,
)]
#[diesel(belongs_to(Tab))]
#[diesel(table_name = orders)]
pub struct Order {
    pub id: Uuid,
    pub tab_id: Uuid,
    pub status: OrderStatus,
    pub edited_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(
    Queryable, Selectable, Identifiable, Associations, Insertable, Clone, Debug, PartialEq,
)]
#[diesel(belongs_to(Order))]
#[diesel(table_name = order_items)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub price_at_order: BigDecimal,
    pub notes: Option<String>,
}

#[derive(
    Queryable, Selectable, Identifiable, Insertable, AsChangeset, Clone, Debug, PartialEq,
)]
#[diesel(table_name = menu_items)]
pub struct MenuItem {
    pub id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub category: String,
    pub available: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Debug, PartialEq)]
#[diesel(table_name = outbox)]
pub struct Outbox {
    pub id: i32,
    pub topic: String,
    pub key: String,
    pub value: Vec<u8>,
}

#[derive(Insertable, Debug, PartialEq)]
#[diesel(table_name = outbox)]
pub struct NewOutbox {
    pub topic: String,
    pub key: String,
    pub value: Vec<u8>,
}

/// An order together with its line items.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// A tab with its orders, oldest first.
#[derive(Clone, Debug, PartialEq)]
pub struct TabDetails {
    pub tab: Tab,
    pub orders: Vec<OrderDetails>,
}

/// An order waiting in the kitchen, with the name of the tab it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct KitchenTicket {
    pub order: OrderDetails,
    pub tab_name: String,
}

impl KitchenTicket {
    pub fn item_count(&self) -> i64 {
        self.order.items.iter().map(|i| i64::from(i.quantity)).sum()
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.order.order.created_at).num_seconds().max(0)
    }
}

/// A line submitted with a new order.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrderItem {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub notes: Option<String>,
}
