//! Review queue construction.
//!
//! A queue is built once per session:
//! - Select the cards the session should cover (due cards, or bookmarks)
//! - Shuffle them once with Fisher–Yates
//!
//! The result is frozen. Cards that become due while the session runs are not
//! picked up, and the order never changes afterwards.

use crate::Flashcard;
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// Which cards a review session covers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum QueueFilter {
    /// Every card with `next_review_at <= now`
    #[default]
    Due,
    /// Every bookmarked card, due or not
    Bookmarked,
}

/// Selection criteria for a queue build
#[derive(Clone, Debug, Default)]
pub struct QueueSpec {
    pub filter: QueueFilter,
    /// Restrict the queue to a single deck
    pub deck: Option<String>,
}

impl QueueSpec {
    pub fn due() -> Self {
        Self::default()
    }

    pub fn bookmarked() -> Self {
        Self {
            filter: QueueFilter::Bookmarked,
            deck: None,
        }
    }

    pub fn in_deck(mut self, deck: impl Into<String>) -> Self {
        self.deck = Some(deck.into());
        self
    }

    pub fn matches(&self, card: &Flashcard, now: DateTime<Utc>) -> bool {
        if let Some(ref deck) = self.deck {
            if &card.deck != deck {
                return false;
            }
        }
        match self.filter {
            QueueFilter::Due => card.is_due(now),
            QueueFilter::Bookmarked => card.bookmarked,
        }
    }
}

/// Cards whose `next_review_at <= now`, in input order
pub fn select_due<'a, I>(cards: I, now: DateTime<Utc>) -> Vec<Flashcard>
where
    I: IntoIterator<Item = &'a Flashcard>,
{
    cards
        .into_iter()
        .filter(|card| card.is_due(now))
        .cloned()
        .collect()
}

/// In-place Fisher–Yates shuffle
///
/// For `i` from `len - 1` down to 1, draw `j` uniformly from `[0, i]` and swap
/// positions `i` and `j`.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// A frozen, shuffled sequence of card snapshots for one session
#[derive(Clone, Debug, Default)]
pub struct ReviewQueue {
    cards: Vec<Flashcard>,
}

impl ReviewQueue {
    /// Select the cards matching `spec` at `now` and shuffle them once
    pub fn build<'a, I, R>(cards: I, spec: &QueueSpec, now: DateTime<Utc>, rng: &mut R) -> Self
    where
        I: IntoIterator<Item = &'a Flashcard>,
        R: Rng + ?Sized,
    {
        let mut selected: Vec<Flashcard> = cards
            .into_iter()
            .filter(|card| spec.matches(card, now))
            .cloned()
            .collect();
        shuffle(&mut selected, rng);

        tracing::info!(
            "Built review queue: {} cards ({:?}, deck {:?})",
            selected.len(),
            spec.filter,
            spec.deck
        );

        Self { cards: selected }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Flashcard> {
        self.cards.get(index)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.cards.iter().map(|c| c.id).collect()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Flashcard> {
        self.cards.get_mut(index)
    }
}

impl From<Vec<Flashcard>> for ReviewQueue {
    /// Wrap an already ordered list without shuffling
    fn from(cards: Vec<Flashcard>) -> Self {
        Self { cards }
    }
}
