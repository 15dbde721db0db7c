#![allow(dead_code)]

use std::collections::HashMap;

use bar_tab_service::aggregate::Outcome;
use bar_tab_service::models::{MenuItem, NewOrderItem, OrderDetails, Tab};
use bar_tab_service::reconciler::SubmittedItem;
use bar_tab_service::service::TabService;
use bar_tab_service::store::MemoryTabStore;
use bigdecimal::BigDecimal;
use chrono::Utc;
use uuid::Uuid;

pub fn money(s: &str) -> BigDecimal {
    s.parse().unwrap()
}

/// A service over an in-memory store with a small menu.
pub struct Bar {
    pub service: TabService<MemoryTabStore>,
    menu: HashMap<&'static str, MenuItem>,
}

impl Bar {
    pub fn new() -> Self {
        let service = TabService::new(MemoryTabStore::new());
        let menu: HashMap<&'static str, MenuItem> = [
            ("A", "Drinks", "5.00"),
            ("B", "Drinks", "4.00"),
            ("C", "Snacks", "3.00"),
            ("D", "Mains", "10.00"),
        ]
        .into_iter()
        .map(|(name, category, price)| {
            let item = MenuItem {
                id: Uuid::new_v4(),
                name: name.to_string(),
                price: money(price),
                category: category.to_string(),
                available: true,
                updated_at: Utc::now(),
            };
            service.store().upsert_menu_item(item.clone());
            (name, item)
        })
        .collect();

        Self { service, menu }
    }

    pub fn item(&self, name: &str) -> Uuid {
        self.menu[name].id
    }

    pub fn reprice(&self, name: &str, price: &str) {
        self.service.store().upsert_menu_item(MenuItem {
            price: money(price),
            updated_at: Utc::now(),
            ..self.menu[name].clone()
        });
    }

    pub fn line(&self, name: &str, quantity: i32) -> NewOrderItem {
        NewOrderItem {
            menu_item_id: self.item(name),
            quantity,
            notes: None,
        }
    }

    pub fn keep(&self, id: Uuid, name: &str, quantity: i32) -> SubmittedItem {
        SubmittedItem {
            id: Some(id),
            menu_item_id: self.item(name),
            quantity,
            notes: None,
        }
    }

    pub fn add(&self, name: &str, quantity: i32) -> SubmittedItem {
        SubmittedItem {
            id: None,
            menu_item_id: self.item(name),
            quantity,
            notes: None,
        }
    }

    pub fn tab(&self, name: &str) -> Tab {
        self.service.create_tab(name).unwrap()
    }

    pub fn order(&self, tab: &Tab, lines: &[(&str, i32)]) -> OrderDetails {
        let items: Vec<NewOrderItem> = lines.iter().map(|(n, q)| self.line(n, *q)).collect();
        match self.service.create_order(tab.id, None, &items).unwrap() {
            Outcome::Applied(details) => details,
            Outcome::Rejected(conflict) => panic!("order rejected: {conflict}"),
        }
    }
}
