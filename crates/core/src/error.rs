//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, per-operation failures (validation,
/// state-machine violations, conflicts). Infrastructure concerns belong
/// elsewhere. Nothing here is fatal to the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (malformed or missing input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A state machine was asked for a transition it does not allow.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A booking request targets a time the staff member's profile does not offer.
    #[error("slot unavailable: {0}")]
    SlotUnavailable(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found.
    #[error("not found")]
    NotFound,

    /// Lost an atomic update race (stale version). Safe to retry with fresh state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A derivation was requested without enough history to compute it.
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn slot_unavailable(msg: impl Into<String>) -> Self {
        Self::SlotUnavailable(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
