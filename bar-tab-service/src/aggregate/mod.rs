//! State machines for tabs and orders.
//!
//! Transition methods are pure: they take the current record and return the
//! next one, or a [`Conflict`] when the precondition does not hold. Stores run
//! them inside their per-entity critical section and persist the result.

use thiserror::Error;

use crate::models::{OrderStatus, TabStatus};

pub mod order;
pub mod tab;

pub use order::{EditPlan, OrderEdit};

/// A precondition violation. Someone else changed the entity first.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    #[error("order is {current}, expected {expect}")]
    Order {
        current: OrderStatus,
        expect: OrderStatus,
    },
    #[error("tab is {current}, expected {expect}")]
    Tab {
        current: TabStatus,
        expect: TabStatus,
    },
}

/// Result of an atomic transition. A rejected transition leaves the store
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Applied(T),
    Rejected(Conflict),
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn conflict(&self) -> Option<Conflict> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Rejected(conflict) => Some(*conflict),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Applied(value) => Outcome::Applied(f(value)),
            Outcome::Rejected(conflict) => Outcome::Rejected(conflict),
        }
    }
}

/// Trims free text; blank text becomes `None`.
pub fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}
