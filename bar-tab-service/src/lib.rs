use diesel::{Connection, PgConnection};

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod reconciler;
pub mod schema;
pub mod serializer;
pub mod service;
pub mod store;
pub mod totals;

pub const EVENT_CHANNEL: &str = "tab.event";
pub const MENU_EVENT_CHANNEL: &str = "menu.event";

pub fn establish_connection(database_url: &str) -> Result<PgConnection, error::ServiceError> {
    Ok(PgConnection::establish(database_url)?)
}
