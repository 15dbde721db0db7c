//! Local replica of the menu catalog, fed from `menu.event`.

use bar_proto::menu::{menu_event, MenuEvent};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use prost::Message;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::MenuItem;

#[derive(Clone, Debug, PartialEq)]
pub enum MenuChange {
    Upsert(MenuItem),
    /// Order items keep referencing removed menu items, so removal only hides them.
    Remove(Uuid),
}

impl MenuChange {
    /// `None` for an event without a payload.
    pub fn decode(value: &[u8], now: DateTime<Utc>) -> Result<Option<Self>, ServiceError> {
        let event = MenuEvent::decode(value)
            .map_err(|err| ServiceError::validation(format!("Cannot decode menu event: {err}")))?;

        let change = match event.event {
            Some(menu_event::Event::MenuItemUpserted(item)) => {
                let price = item
                    .price
                    .ok_or_else(|| ServiceError::validation("menu item price must be set"))?
                    .amount
                    .parse::<BigDecimal>()
                    .map_err(|_| ServiceError::validation("Invalid menu item price"))?;
                MenuChange::Upsert(MenuItem {
                    id: parse_id(&item.id)?,
                    name: item.name,
                    price,
                    category: item.category,
                    available: item.available,
                    updated_at: now,
                })
            }
            Some(menu_event::Event::MenuItemRemoved(item)) => {
                MenuChange::Remove(parse_id(&item.id)?)
            }
            None => return Ok(None),
        };
        Ok(Some(change))
    }
}

fn parse_id(id: &str) -> Result<Uuid, ServiceError> {
    id.parse()
        .map_err(|_| ServiceError::validation(format!("Invalid menu item id: {id}")))
}

/// A store that keeps a copy of the catalog.
pub trait MenuReplica {
    fn apply_menu_change(&self, change: MenuChange) -> Result<(), ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bar_proto::common::Money;
    use bar_proto::menu::{MenuItemRemoved, MenuItemUpserted};

    #[test]
    fn decodes_upsert() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let buf = MenuEvent {
            event: Some(menu_event::Event::MenuItemUpserted(MenuItemUpserted {
                id: id.to_string(),
                name: "Negroni".to_string(),
                price: Some(Money {
                    amount: "11.50".to_string(),
                }),
                category: "Cocktails".to_string(),
                available: true,
            })),
        }
        .encode_to_vec();

        let change = MenuChange::decode(&buf, now).unwrap();

        assert_eq!(
            change,
            Some(MenuChange::Upsert(MenuItem {
                id,
                name: "Negroni".to_string(),
                price: "11.50".parse().unwrap(),
                category: "Cocktails".to_string(),
                available: true,
                updated_at: now,
            }))
        );
    }

    #[test]
    fn decodes_removal() {
        let id = Uuid::new_v4();
        let buf = MenuEvent {
            event: Some(menu_event::Event::MenuItemRemoved(MenuItemRemoved {
                id: id.to_string(),
            })),
        }
        .encode_to_vec();

        assert_eq!(
            MenuChange::decode(&buf, Utc::now()).unwrap(),
            Some(MenuChange::Remove(id))
        );
    }

    #[test]
    fn rejects_bad_price() {
        let buf = MenuEvent {
            event: Some(menu_event::Event::MenuItemUpserted(MenuItemUpserted {
                id: Uuid::new_v4().to_string(),
                name: "Negroni".to_string(),
                price: Some(Money {
                    amount: "eleven".to_string(),
                }),
                category: "Cocktails".to_string(),
                available: true,
            })),
        }
        .encode_to_vec();

        assert!(matches!(
            MenuChange::decode(&buf, Utc::now()),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn empty_event_is_skipped() {
        let buf = MenuEvent { event: None }.encode_to_vec();
        assert_eq!(MenuChange::decode(&buf, Utc::now()).unwrap(), None);
    }
}
