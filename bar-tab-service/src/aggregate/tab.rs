use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Conflict;
use crate::error::ServiceError;
use crate::models::{Tab, TabStatus};

impl Tab {
    pub fn open(name: &str, now: DateTime<Utc>) -> Result<Tab, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("tab name must not be empty"));
        }
        Ok(Tab {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: TabStatus::Open,
            created_at: now,
            closed_at: None,
        })
    }

    pub fn close(&self, now: DateTime<Utc>) -> Result<Tab, Conflict> {
        self.expect(TabStatus::Open)?;
        Ok(Tab {
            status: TabStatus::Closed,
            closed_at: Some(now),
            ..self.clone()
        })
    }

    pub fn reopen(&self) -> Result<Tab, Conflict> {
        self.expect(TabStatus::Closed)?;
        Ok(Tab {
            status: TabStatus::Open,
            closed_at: None,
            ..self.clone()
        })
    }

    pub fn ensure_open(&self) -> Result<(), Conflict> {
        self.expect(TabStatus::Open)
    }

    /// `closed_at` is set exactly when the tab is closed.
    pub fn is_consistent(&self) -> bool {
        (self.status == TabStatus::Closed) == self.closed_at.is_some()
    }

    fn expect(&self, expect: TabStatus) -> Result<(), Conflict> {
        if self.status != expect {
            return Err(Conflict::Tab {
                current: self.status,
                expect,
            });
        }
        Ok(())
    }
}
