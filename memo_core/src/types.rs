//! Core domain types for the memo flashcard system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Grades and the three review actions offered after revealing an answer
//! - Per-card memory state consumed and produced by the scheduler
//! - Flashcards and decks as stored in the card store

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Grades
// ============================================================================

/// Quality rating on the 0..=5 scale a learner assigns after seeing an answer
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Grade(u8);

impl Grade {
    /// Highest grade on the scale
    pub const MAX: u8 = 5;

    /// Grades at or above this value count as a successful review
    pub const PASSING: u8 = 3;

    /// Validate a raw grade coming from an input boundary
    pub fn new(value: i64) -> Result<Self> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(Error::InvalidGrade(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_passing(self) -> bool {
        self.0 >= Self::PASSING
    }

    /// Collapse every failing grade to 0 before it reaches the scheduler.
    ///
    /// Only the `< 3` / `>= 3` split carries meaning for low grades.
    pub fn normalized(self) -> Self {
        if self.is_passing() {
            self
        } else {
            Self(0)
        }
    }
}

impl TryFrom<u8> for Grade {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value as i64)
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> Self {
        grade.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three grading buttons shown once the answer is revealed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Again,
    Good,
    Easy,
}

impl ReviewAction {
    /// Fixed score for each action: Again=1, Good=4, Easy=5
    pub fn grade(self) -> Grade {
        match self {
            ReviewAction::Again => Grade(1),
            ReviewAction::Good => Grade(4),
            ReviewAction::Easy => Grade(5),
        }
    }
}

// ============================================================================
// Memory State
// ============================================================================

/// The part of a card's memory state the scheduler reads and writes
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulingState {
    pub repetition: u32,
    pub interval: f64,
    pub ease_factor: f64,
}

impl SchedulingState {
    pub const DEFAULT_INTERVAL: f64 = 1.0;
    pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
}

impl Default for SchedulingState {
    fn default() -> Self {
        Self {
            repetition: 0,
            interval: Self::DEFAULT_INTERVAL,
            ease_factor: Self::DEFAULT_EASE_FACTOR,
        }
    }
}

/// Per-card memory strength, owned by the flashcard record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    pub repetition: u32,
    pub interval: f64,
    pub ease_factor: f64,
    pub next_review_at: DateTime<Utc>,
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

impl MemoryState {
    /// Memory state of a card that has never been reviewed; due at `now`
    pub fn new_card(now: DateTime<Utc>) -> Self {
        let defaults = SchedulingState::default();
        Self {
            repetition: defaults.repetition,
            interval: defaults.interval,
            ease_factor: defaults.ease_factor,
            next_review_at: now,
        }
    }

    /// Stamp a freshly computed scheduling state with its next review time.
    ///
    /// `next_review_at` is always `graded_at + interval` days. Fails when that
    /// lands outside the representable date range.
    pub fn scheduled(state: SchedulingState, graded_at: DateTime<Utc>) -> Result<Self> {
        let millis = (state.interval * MILLIS_PER_DAY).round();
        let next_review_at = Some(millis)
            .filter(|m| m.is_finite() && m.abs() < i64::MAX as f64)
            .and_then(|m| Duration::try_milliseconds(m as i64))
            .and_then(|delay| graded_at.checked_add_signed(delay))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "interval of {} days from {} is out of range",
                    state.interval, graded_at
                ))
            })?;

        Ok(Self {
            repetition: state.repetition,
            interval: state.interval,
            ease_factor: state.ease_factor,
            next_review_at,
        })
    }

    pub fn scheduling(&self) -> SchedulingState {
        SchedulingState {
            repetition: self.repetition,
            interval: self.interval,
            ease_factor: self.ease_factor,
        }
    }

    /// Due iff `next_review_at <= now` (inclusive boundary)
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }
}

// ============================================================================
// Cards and Decks
// ============================================================================

/// A single flashcard
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: Uuid,
    pub deck: String,
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub bookmarked: bool,
    pub created_at: DateTime<Utc>,
    pub memory: MemoryState,
}

impl Flashcard {
    /// Create a new card in `deck`, due immediately
    pub fn new(
        deck: impl Into<String>,
        front: impl Into<String>,
        back: impl Into<String>,
        tag: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            deck: deck.into(),
            front: front.into(),
            back: back.into(),
            tag,
            bookmarked: false,
            created_at: now,
            memory: MemoryState::new_card(now),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.memory.is_due(now)
    }

    /// Check the content a learner typed or a generator supplied
    pub fn validate(&self) -> Result<()> {
        if self.deck.trim().is_empty() {
            return Err(Error::Validation("card has an empty deck name".into()));
        }
        if self.front.trim().is_empty() {
            return Err(Error::Validation(format!("card {} has an empty front", self.id)));
        }
        if self.back.trim().is_empty() {
            return Err(Error::Validation(format!("card {} has an empty back", self.id)));
        }
        Ok(())
    }
}

/// A named collection of cards
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_grade_bounds() {
        assert!(Grade::new(0).is_ok());
        assert!(Grade::new(5).is_ok());
        assert!(matches!(Grade::new(-1), Err(Error::InvalidGrade(-1))));
        assert!(matches!(Grade::new(6), Err(Error::InvalidGrade(6))));
        assert!(Grade::try_from(9u8).is_err());
    }

    #[test]
    fn test_low_grades_normalize_to_zero() {
        for raw in 0..3 {
            assert_eq!(Grade::new(raw).unwrap().normalized().value(), 0);
        }
        for raw in 3..=5 {
            assert_eq!(Grade::new(raw).unwrap().normalized().value(), raw as u8);
        }
    }

    #[test]
    fn test_action_scores() {
        assert_eq!(ReviewAction::Again.grade().value(), 1);
        assert_eq!(ReviewAction::Good.grade().value(), 4);
        assert_eq!(ReviewAction::Easy.grade().value(), 5);
        assert!(!ReviewAction::Again.grade().is_passing());
    }

    #[test]
    fn test_grade_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Grade>("4").is_ok());
        assert!(serde_json::from_str::<Grade>("7").is_err());
    }

    #[test]
    fn test_new_card_defaults_and_due() {
        let now = Utc.with_ymd_and_hms(2025, 8, 16, 9, 0, 0).unwrap();
        let memory = MemoryState::new_card(now);
        assert_eq!(memory.repetition, 0);
        assert_eq!(memory.interval, 1.0);
        assert_eq!(memory.ease_factor, 2.5);
        assert!(memory.is_due(now));
    }

    #[test]
    fn test_scheduled_adds_fractional_days() {
        let now = Utc.with_ymd_and_hms(2025, 8, 16, 9, 0, 0).unwrap();
        let memory = MemoryState::scheduled(
            SchedulingState {
                repetition: 0,
                interval: 0.0001,
                ease_factor: 2.5,
            },
            now,
        )
        .unwrap();
        // 0.0001 days is 8.64 seconds
        assert_eq!(memory.next_review_at - now, Duration::milliseconds(8_640));

        let memory = MemoryState::scheduled(
            SchedulingState {
                repetition: 2,
                interval: 6.0,
                ease_factor: 2.5,
            },
            now,
        )
        .unwrap();
        assert_eq!(memory.next_review_at - now, Duration::days(6));
    }

    #[test]
    fn test_scheduled_rejects_out_of_range_interval() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        for interval in [1.6e8, 1e300, f64::INFINITY] {
            let result = MemoryState::scheduled(
                SchedulingState {
                    repetition: 6,
                    interval,
                    ease_factor: 2.5,
                },
                now,
            );
            assert!(matches!(result, Err(Error::Validation(_))), "interval {}", interval);
        }
    }

    #[test]
    fn test_validate_rejects_blank_content() {
        let now = Utc::now();
        assert!(Flashcard::new("english", "apple", "りんご", None, now)
            .validate()
            .is_ok());
        assert!(Flashcard::new("english", "  ", "りんご", None, now)
            .validate()
            .is_err());
        assert!(Flashcard::new("", "apple", "りんご", None, now)
            .validate()
            .is_err());
    }
}
