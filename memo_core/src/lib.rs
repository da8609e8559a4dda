#![forbid(unsafe_code)]

//! Core domain model and scheduling logic for the memo flashcard system.
//!
//! This crate provides:
//! - Domain types (grades, memory state, flashcards, decks)
//! - SM-2 scheduling engine
//! - Review queue building and the review session state machine
//! - Persistence (JSON card store, JSONL study log)
//! - Deck progress summaries

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod scheduler;
pub mod queue;
pub mod session;
pub mod store;
pub mod study_log;
pub mod progress;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use scheduler::compute_next_state;
pub use queue::{QueueFilter, QueueSpec, ReviewQueue};
pub use session::{GradeOutcome, ReviewSession, SessionEvent, SessionObserver, SessionState};
pub use store::{CardDocument, CardStore, JsonCardStore, MemoryStore};
pub use study_log::{JsonlStudyLog, StudyLogEntry, StudyLogSink};
pub use progress::DeckProgress;
