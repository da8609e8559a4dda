//! Per-deck review progress.
//!
//! A deck's progress compares the cards that are due now against all of its
//! cards: `done = max(total - due, 0)` and `progress = done / total`.

use crate::Flashcard;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Due and total card counts for one deck (or all decks)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeckProgress {
    pub deck: String,
    pub total: usize,
    pub due: usize,
}

impl DeckProgress {
    /// Cards that are not waiting for review
    pub fn done(&self) -> usize {
        self.total.saturating_sub(self.due)
    }

    /// Fraction of cards done, 0.0 for an empty deck
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.done() as f64 / self.total as f64
        }
    }

    /// Whole percent, rounded down
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).floor() as u32
    }
}

/// Progress of every deck that appears in `decks` or on a card, by name
pub fn deck_progress<'a, C, D>(decks: D, cards: C, now: DateTime<Utc>) -> Vec<DeckProgress>
where
    C: IntoIterator<Item = &'a Flashcard>,
    D: IntoIterator<Item = &'a str>,
{
    let mut by_deck: BTreeMap<&str, DeckProgress> = decks
        .into_iter()
        .map(|name| {
            (
                name,
                DeckProgress {
                    deck: name.to_string(),
                    ..Default::default()
                },
            )
        })
        .collect();

    for card in cards {
        let entry = by_deck.entry(card.deck.as_str()).or_insert_with(|| DeckProgress {
            deck: card.deck.clone(),
            ..Default::default()
        });
        entry.total += 1;
        if card.is_due(now) {
            entry.due += 1;
        }
    }

    by_deck.into_values().collect()
}

/// Sum of several deck progress rows
pub fn overall(rows: &[DeckProgress]) -> DeckProgress {
    DeckProgress {
        deck: "all".to_string(),
        total: rows.iter().map(|r| r.total).sum(),
        due: rows.iter().map(|r| r.due).sum(),
    }
}
