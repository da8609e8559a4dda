//! Error types for the memo_core library.

use std::io;
use uuid::Uuid;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for memo_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Card or deck content rejected at the store boundary
    #[error("Validation error: {0}")]
    Validation(String),

    /// Grade outside the 0..=5 quality scale
    #[error("Invalid grade {0}: expected a value between 0 and 5")]
    InvalidGrade(i64),

    /// Writing an updated memory state back to the store failed
    #[error("Failed to persist memory state for card {card_id}: {reason}")]
    PersistenceWrite { card_id: Uuid, reason: String },

    /// No card with this id exists in the store
    #[error("Card not found: {0}")]
    CardNotFound(Uuid),

    /// No deck with this name exists in the store
    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    /// Review session received an event its current state does not accept
    #[error("Cannot apply {event} while session is {state}")]
    InvalidTransition { state: String, event: String },

    /// Session bookkeeping is inconsistent
    #[error("State error: {0}")]
    State(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
