//! Review session state machine.
//!
//! A session walks a frozen [`ReviewQueue`] one card at a time:
//!
//! ```text
//! Loading ─► Question ─reveal─► Answer ─grade─► Grading ─commit─► Advancing ─┬─► Question
//!    │                                                                       └─► Complete
//!    └─(empty queue)─► Complete
//! ```
//!
//! [`SessionState::next`] is the pure transition function. [`ReviewSession`]
//! is the caller-owned driver that performs the I/O around it: reading the
//! card store, calling the scheduler and writing the new memory state back.
//!
//! A card graded "Again" is scheduled 0.0001 days out but is not put back into
//! the running queue; it shows up again in the next session that is built
//! after that moment.

use crate::queue::{QueueSpec, ReviewQueue};
use crate::store::CardStore;
use crate::{scheduler, Error, Flashcard, Grade, MemoryState, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;
use uuid::Uuid;

/// Receiver of the single end-of-session signal
pub trait SessionObserver {
    /// Called exactly once, when the session reaches `Complete`
    fn on_session_complete(&mut self, cards_reviewed: usize);
}

impl<F: FnMut(usize)> SessionObserver for F {
    fn on_session_complete(&mut self, cards_reviewed: usize) {
        self(cards_reviewed)
    }
}

// ============================================================================
// Pure state machine
// ============================================================================

/// Where a review session currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Queue not built yet
    Loading,
    /// Front of the card at `index` is shown
    Question { index: usize },
    /// Back of the card at `index` is shown, waiting for a grade
    Answer { index: usize },
    /// Grade chosen; the write for the card at `index` has not succeeded yet
    Grading { index: usize, grade: Grade },
    /// Card at `index` is done
    Advancing { index: usize },
    /// Queue exhausted
    Complete,
}

/// Things that can happen to a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Loaded,
    Reveal,
    Grade(Grade),
    Committed,
    Skip,
    Advance,
}

impl SessionState {
    /// Apply `event` to a session whose queue holds `queue_len` cards
    pub fn next(self, event: SessionEvent, queue_len: usize) -> Result<SessionState> {
        use SessionEvent as E;
        use SessionState as S;

        let next = match (self, event) {
            (S::Loading, E::Loaded) if queue_len == 0 => S::Complete,
            (S::Loading, E::Loaded) => S::Question { index: 0 },
            (S::Question { index }, E::Reveal) => S::Answer { index },
            (S::Answer { index }, E::Grade(grade)) => S::Grading { index, grade },
            (S::Grading { index, .. }, E::Committed) => S::Advancing { index },
            (S::Question { index }, E::Skip)
            | (S::Answer { index }, E::Skip)
            | (S::Grading { index, .. }, E::Skip) => S::Advancing { index },
            (S::Advancing { index }, E::Advance) if index + 1 < queue_len => {
                S::Question { index: index + 1 }
            }
            (S::Advancing { .. }, E::Advance) => S::Complete,
            (state, event) => {
                return Err(Error::InvalidTransition {
                    state: state.to_string(),
                    event: format!("{:?}", event),
                })
            }
        };
        Ok(next)
    }

    /// Queue position of the card this state refers to
    pub fn index(&self) -> Option<usize> {
        match *self {
            SessionState::Question { index }
            | SessionState::Answer { index }
            | SessionState::Grading { index, .. }
            | SessionState::Advancing { index } => Some(index),
            SessionState::Loading | SessionState::Complete => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Loading => write!(f, "loading"),
            SessionState::Question { index } => write!(f, "showing question {}", index),
            SessionState::Answer { index } => write!(f, "showing answer {}", index),
            SessionState::Grading { index, grade } => {
                write!(f, "grading card {} with {}", index, grade)
            }
            SessionState::Advancing { index } => write!(f, "advancing past {}", index),
            SessionState::Complete => write!(f, "complete"),
        }
    }
}

// ============================================================================
// Session driver
// ============================================================================

/// What happened to the card that was just graded
#[derive(Clone, Debug, PartialEq)]
pub enum GradeOutcome {
    /// New memory state written to the store
    Scheduled { card_id: Uuid, memory: MemoryState },
    /// Card disappeared from the store; nothing written, session moved on
    Missing { card_id: Uuid },
}

/// One review session: its frozen queue, position and counters
#[derive(Clone, Debug)]
pub struct ReviewSession {
    queue: ReviewQueue,
    state: SessionState,
    reviewed: usize,
    completion_sent: bool,
}

impl Default for ReviewSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewSession {
    /// A session in `Loading`, before any queue exists
    pub fn new() -> Self {
        Self {
            queue: ReviewQueue::default(),
            state: SessionState::Loading,
            reviewed: 0,
            completion_sent: false,
        }
    }

    /// Fetch cards from `store`, build and shuffle the queue, and load it
    pub fn start<S, R, O>(
        store: &S,
        spec: &QueueSpec,
        now: DateTime<Utc>,
        rng: &mut R,
        observer: &mut O,
    ) -> Result<Self>
    where
        S: CardStore + ?Sized,
        R: Rng + ?Sized,
        O: SessionObserver + ?Sized,
    {
        let cards = store.cards()?;
        let queue = ReviewQueue::build(&cards, spec, now, rng);

        let mut session = Self::new();
        session.load(queue, observer)?;
        Ok(session)
    }

    /// Hand a built queue to a `Loading` session
    pub fn load<O>(&mut self, queue: ReviewQueue, observer: &mut O) -> Result<()>
    where
        O: SessionObserver + ?Sized,
    {
        let next = self.state.next(SessionEvent::Loaded, queue.len())?;
        self.queue = queue;
        self.state = next;
        tracing::info!("Review session loaded with {} cards", self.queue.len());

        if self.state == SessionState::Complete {
            self.notify_complete(observer);
        }
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn queue(&self) -> &ReviewQueue {
        &self.queue
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// Cards whose grade was written successfully
    pub fn reviewed(&self) -> usize {
        self.reviewed
    }

    /// `(1-based position of the current card, queue length)`
    pub fn progress(&self) -> (usize, usize) {
        let position = match self.state {
            SessionState::Complete => self.queue.len(),
            state => state.index().map(|i| i + 1).unwrap_or(0),
        };
        (position, self.queue.len())
    }

    /// Card under review, if any
    pub fn current(&self) -> Option<&Flashcard> {
        self.state.index().and_then(|i| self.queue.get(i))
    }

    /// Question → Answer
    pub fn reveal(&mut self) -> Result<()> {
        self.apply(SessionEvent::Reveal)
    }

    /// Grade the revealed card and write its new memory state
    ///
    /// On a write failure the session stays in `Grading` and the error is
    /// returned; call [`retry`](Self::retry) or [`skip`](Self::skip) next.
    pub fn grade<S, O>(
        &mut self,
        grade: Grade,
        now: DateTime<Utc>,
        store: &mut S,
        observer: &mut O,
    ) -> Result<GradeOutcome>
    where
        S: CardStore + ?Sized,
        O: SessionObserver + ?Sized,
    {
        self.apply(SessionEvent::Grade(grade))?;
        self.commit(now, store, observer)
    }

    /// Repeat the write for a card left in `Grading` by a failure
    pub fn retry<S, O>(
        &mut self,
        now: DateTime<Utc>,
        store: &mut S,
        observer: &mut O,
    ) -> Result<GradeOutcome>
    where
        S: CardStore + ?Sized,
        O: SessionObserver + ?Sized,
    {
        match self.state {
            SessionState::Grading { .. } => self.commit(now, store, observer),
            state => Err(Error::InvalidTransition {
                state: state.to_string(),
                event: "Retry".into(),
            }),
        }
    }

    /// Move past the current card without writing anything
    pub fn skip<O>(&mut self, observer: &mut O) -> Result<()>
    where
        O: SessionObserver + ?Sized,
    {
        self.apply(SessionEvent::Skip)?;
        self.advance(observer)
    }

    fn commit<S, O>(
        &mut self,
        now: DateTime<Utc>,
        store: &mut S,
        observer: &mut O,
    ) -> Result<GradeOutcome>
    where
        S: CardStore + ?Sized,
        O: SessionObserver + ?Sized,
    {
        let (index, grade) = match self.state {
            SessionState::Grading { index, grade } => (index, grade),
            state => {
                return Err(Error::InvalidTransition {
                    state: state.to_string(),
                    event: "Commit".into(),
                })
            }
        };
        let card_id = self
            .queue
            .get(index)
            .map(|c| c.id)
            .ok_or_else(|| Error::State(format!("queue has no card at {}", index)))?;

        let card = match store.card(card_id) {
            Ok(Some(card)) => card,
            Ok(None) => return self.skip_missing(card_id, observer),
            Err(e) => {
                return Err(Error::PersistenceWrite {
                    card_id,
                    reason: format!("reading card: {}", e),
                })
            }
        };

        let next = scheduler::compute_next_state(grade.normalized(), card.memory.scheduling());
        let memory = MemoryState::scheduled(next, now)?;

        match store.update_memory(card_id, &memory) {
            Ok(()) => {}
            Err(Error::CardNotFound(_)) => return self.skip_missing(card_id, observer),
            Err(e @ Error::PersistenceWrite { .. }) => return Err(e),
            Err(e) => {
                return Err(Error::PersistenceWrite {
                    card_id,
                    reason: e.to_string(),
                })
            }
        }

        tracing::debug!(
            "Card {} graded {}: repetition {}, interval {} days, ease {:.2}, next review {}",
            card_id,
            grade,
            memory.repetition,
            memory.interval,
            memory.ease_factor,
            memory.next_review_at
        );

        if let Some(snapshot) = self.queue.get_mut(index) {
            snapshot.memory = memory.clone();
        }
        self.reviewed += 1;
        self.apply(SessionEvent::Committed)?;
        self.advance(observer)?;

        Ok(GradeOutcome::Scheduled { card_id, memory })
    }

    fn skip_missing<O>(&mut self, card_id: Uuid, observer: &mut O) -> Result<GradeOutcome>
    where
        O: SessionObserver + ?Sized,
    {
        tracing::warn!("Card {} no longer exists, skipping it", card_id);
        self.apply(SessionEvent::Skip)?;
        self.advance(observer)?;
        Ok(GradeOutcome::Missing { card_id })
    }

    fn advance<O>(&mut self, observer: &mut O) -> Result<()>
    where
        O: SessionObserver + ?Sized,
    {
        self.apply(SessionEvent::Advance)?;
        if self.state == SessionState::Complete {
            self.notify_complete(observer);
        }
        Ok(())
    }

    fn apply(&mut self, event: SessionEvent) -> Result<()> {
        self.state = self.state.next(event, self.queue.len())?;
        Ok(())
    }

    fn notify_complete<O>(&mut self, observer: &mut O)
    where
        O: SessionObserver + ?Sized,
    {
        if self.completion_sent {
            return;
        }
        self.completion_sent = true;
        tracing::info!("Review session complete: {} cards reviewed", self.reviewed);
        observer.on_session_complete(self.reviewed);
    }
}
