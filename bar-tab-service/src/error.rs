use thiserror::Error;
use uuid::Uuid;

use crate::models::EntityKind;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Unexpected database error")]
    Database(#[from] diesel::result::Error),
    #[error("Cannot connect to database")]
    Connection(#[from] diesel::ConnectionError),
}

impl ServiceError {
    pub fn not_found(kind: EntityKind, id: Uuid) -> Self {
        ServiceError::NotFound { kind, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }
}
