//! Order and tab totals, recomputed on every call from line items.

use bigdecimal::{BigDecimal, Zero};

use crate::models::{OrderDetails, OrderItem};

pub fn line_total(item: &OrderItem) -> BigDecimal {
    BigDecimal::from(item.quantity) * &item.price_at_order
}

pub fn order_subtotal(items: &[OrderItem]) -> BigDecimal {
    items
        .iter()
        .fold(BigDecimal::zero(), |total, item| total + line_total(item))
}

pub fn tab_total(orders: &[OrderDetails]) -> BigDecimal {
    orders
        .iter()
        .fold(BigDecimal::zero(), |total, order| {
            total + order_subtotal(&order.items)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Order, OrderStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn money(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn order(lines: &[(i32, &str)]) -> OrderDetails {
        let order = Order {
            id: Uuid::new_v4(),
            tab_id: Uuid::new_v4(),
            status: OrderStatus::InProgress,
            edited_by: None,
            notes: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let items = lines
            .iter()
            .map(|(quantity, price)| OrderItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                menu_item_id: Uuid::new_v4(),
                quantity: *quantity,
                price_at_order: money(price),
                notes: None,
            })
            .collect();
        OrderDetails { order, items }
    }

    #[test]
    fn tab_total_sums_every_order() {
        let orders = vec![order(&[(2, "5.00"), (1, "3.00")]), order(&[(1, "10.00")])];

        assert_eq!(order_subtotal(&orders[0].items), money("13.00"));
        assert_eq!(tab_total(&orders), money("23.00"));
    }

    #[test]
    fn empty_tab_totals_zero() {
        assert_eq!(tab_total(&[]), BigDecimal::zero());
    }

    #[test]
    fn decimal_amounts_do_not_drift() {
        let orders = vec![order(&[(3, "0.10"), (7, "0.20")])];

        assert_eq!(tab_total(&orders), money("1.70"));
    }

    #[test]
    fn quantity_change_is_reflected_immediately() {
        let mut details = order(&[(3, "4.50")]);
        assert_eq!(order_subtotal(&details.items), money("13.50"));

        details.items[0].quantity = 1;
        assert_eq!(order_subtotal(&details.items), money("4.50"));
    }
}
