//! Card storage with file locking.
//!
//! The review session only needs the narrow [`CardStore`] contract: read card
//! snapshots and write one card's memory state back. Two stores implement it:
//! - [`MemoryStore`] keeps cards in a map (embedding, tests)
//! - [`JsonCardStore`] keeps a [`CardDocument`] in a JSON file, locked with
//!   `fs2` and replaced atomically on every write

use crate::{Deck, Error, Flashcard, MemoryState, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Source of card snapshots and sink for updated memory states
///
/// Writes are atomic at single-card granularity; nothing spans several cards.
pub trait CardStore {
    /// All cards in the store
    fn cards(&self) -> Result<Vec<Flashcard>>;

    /// Current snapshot of one card, `None` if it no longer exists
    fn card(&self, id: Uuid) -> Result<Option<Flashcard>>;

    /// Cards with `next_review_at <= now`
    fn due_cards(&self, now: DateTime<Utc>) -> Result<Vec<Flashcard>> {
        Ok(self
            .cards()?
            .into_iter()
            .filter(|card| card.is_due(now))
            .collect())
    }

    /// Replace the memory state of card `id`
    fn update_memory(&mut self, id: Uuid, memory: &MemoryState) -> Result<()>;
}

// ============================================================================
// Card Document
// ============================================================================

/// Everything the local store persists: decks and their cards
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CardDocument {
    #[serde(default)]
    pub decks: BTreeMap<String, Deck>,
    #[serde(default)]
    pub cards: BTreeMap<Uuid, Flashcard>,
}

impl CardDocument {
    pub fn add_deck(
        &mut self,
        name: &str,
        tag: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&Deck> {
        let name = self.free_deck_name(name)?;
        let deck = self.decks.entry(name.clone()).or_insert(Deck {
            name,
            tag,
            created_at: now,
        });
        tracing::info!("Created deck '{}'", deck.name);
        Ok(deck)
    }

    /// Rename a deck, moving its cards along with it
    pub fn rename_deck(&mut self, from: &str, to: &str) -> Result<&Deck> {
        let to = self.free_deck_name(to)?;
        let mut deck = self
            .decks
            .remove(from)
            .ok_or_else(|| Error::DeckNotFound(from.to_string()))?;

        deck.name = to.clone();
        let mut moved = 0;
        for card in self.cards.values_mut().filter(|c| c.deck == from) {
            card.deck = to.clone();
            moved += 1;
        }
        tracing::info!("Renamed deck '{}' to '{}' ({} cards)", from, to, moved);
        Ok(self.decks.entry(to).or_insert(deck))
    }

    /// Remove a deck and every card in it, returning the number of cards removed
    pub fn remove_deck(&mut self, name: &str) -> Result<usize> {
        if self.decks.remove(name).is_none() {
            return Err(Error::DeckNotFound(name.to_string()));
        }
        let before = self.cards.len();
        self.cards.retain(|_, card| card.deck != name);
        let removed = before - self.cards.len();
        tracing::info!("Removed deck '{}' and {} cards", name, removed);
        Ok(removed)
    }

    fn free_deck_name(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("deck name is empty".into()));
        }
        if self.decks.contains_key(name) {
            return Err(Error::Validation(format!("deck '{}' already exists", name)));
        }
        Ok(name.to_string())
    }

    /// Create the deck if it does not exist yet
    pub fn ensure_deck(&mut self, name: &str, now: DateTime<Utc>) -> Result<()> {
        if !self.decks.contains_key(name.trim()) {
            self.add_deck(name, None, now)?;
        }
        Ok(())
    }

    /// Insert a validated card into an existing deck
    pub fn add_card(&mut self, card: Flashcard) -> Result<Uuid> {
        card.validate()?;
        if !self.decks.contains_key(&card.deck) {
            return Err(Error::DeckNotFound(card.deck));
        }
        let id = card.id;
        tracing::debug!("Added card {} to deck '{}'", id, card.deck);
        self.cards.insert(id, card);
        Ok(id)
    }

    /// Replace front, back and tag; memory state is left alone
    ///
    /// `tag` is `Some(None)` to clear the tag, `None` to keep it.
    pub fn edit_card(
        &mut self,
        id: Uuid,
        front: Option<String>,
        back: Option<String>,
        tag: Option<Option<String>>,
    ) -> Result<&Flashcard> {
        let card = self.cards.get(&id).ok_or(Error::CardNotFound(id))?;
        let mut edited = card.clone();
        if let Some(front) = front {
            edited.front = front;
        }
        if let Some(back) = back {
            edited.back = back;
        }
        if let Some(tag) = tag {
            edited.tag = tag;
        }
        edited.validate()?;

        self.cards.insert(id, edited);
        Ok(&self.cards[&id])
    }

    pub fn remove_card(&mut self, id: Uuid) -> Result<Flashcard> {
        self.cards.remove(&id).ok_or(Error::CardNotFound(id))
    }

    /// Flip the bookmark flag, returning the new value
    pub fn toggle_bookmark(&mut self, id: Uuid) -> Result<bool> {
        let card = self.cards.get_mut(&id).ok_or(Error::CardNotFound(id))?;
        card.bookmarked = !card.bookmarked;
        Ok(card.bookmarked)
    }

    pub fn cards_in_deck<'a>(&'a self, deck: &'a str) -> impl Iterator<Item = &'a Flashcard> + 'a {
        self.cards.values().filter(move |c| c.deck == deck)
    }

    pub fn set_memory(&mut self, id: Uuid, memory: &MemoryState) -> Result<()> {
        let card = self.cards.get_mut(&id).ok_or(Error::CardNotFound(id))?;
        card.memory = memory.clone();
        Ok(())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Card store held entirely in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    cards: BTreeMap<Uuid, Flashcard>,
}

impl MemoryStore {
    pub fn new(cards: impl IntoIterator<Item = Flashcard>) -> Self {
        Self {
            cards: cards.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn insert(&mut self, card: Flashcard) {
        self.cards.insert(card.id, card);
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Flashcard> {
        self.cards.remove(&id)
    }
}

impl CardStore for MemoryStore {
    fn cards(&self) -> Result<Vec<Flashcard>> {
        Ok(self.cards.values().cloned().collect())
    }

    fn card(&self, id: Uuid) -> Result<Option<Flashcard>> {
        Ok(self.cards.get(&id).cloned())
    }

    fn update_memory(&mut self, id: Uuid, memory: &MemoryState) -> Result<()> {
        let card = self.cards.get_mut(&id).ok_or(Error::CardNotFound(id))?;
        card.memory = memory.clone();
        Ok(())
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Card store backed by a single JSON document on disk
#[derive(Clone, Debug)]
pub struct JsonCardStore {
    path: PathBuf,
}

impl JsonCardStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document with a shared lock
    ///
    /// Returns an empty document if the file doesn't exist. A file that
    /// exists but cannot be parsed is an error: saving over it would drop
    /// every card.
    pub fn load(&self) -> Result<CardDocument> {
        if !self.path.exists() {
            tracing::info!("No card file found at {:?}, starting empty", self.path);
            return Ok(CardDocument::default());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        if contents.trim().is_empty() {
            return Ok(CardDocument::default());
        }

        let document: CardDocument = serde_json::from_str(&contents)?;
        tracing::debug!(
            "Loaded {} cards in {} decks from {:?}",
            document.cards.len(),
            document.decks.len(),
            self.path
        );
        Ok(document)
    }

    /// Save the document atomically
    ///
    /// Writes to a temp file in the same directory, syncs it, then renames it
    /// over the original.
    pub fn save(&self, document: &CardDocument) -> Result<()> {
        let parent = self.parent_dir()?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, document)?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} cards to {:?}", document.cards.len(), self.path);
        Ok(())
    }

    /// Load, modify and save the document under an exclusive writer lock
    ///
    /// The lock lives on a sidecar `.lock` file so concurrent writers cannot
    /// interleave their load and save steps.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut CardDocument) -> Result<T>,
    {
        let parent = self.parent_dir()?;
        std::fs::create_dir_all(parent)?;

        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;

        let result: Result<T> = (|| {
            let mut document = self.load()?;
            let value = f(&mut document)?;
            self.save(&document)?;
            Ok(value)
        })();

        lock.unlock()?;
        result
    }

    fn parent_dir(&self) -> Result<&Path> {
        self.path.parent().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "card store path missing parent",
            ))
        })
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }
}

impl CardStore for JsonCardStore {
    fn cards(&self) -> Result<Vec<Flashcard>> {
        Ok(self.load()?.cards.into_values().collect())
    }

    fn card(&self, id: Uuid) -> Result<Option<Flashcard>> {
        Ok(self.load()?.cards.remove(&id))
    }

    fn update_memory(&mut self, id: Uuid, memory: &MemoryState) -> Result<()> {
        self.update(|document| document.set_memory(id, memory))
            .map_err(|e| match e {
                Error::CardNotFound(id) => Error::CardNotFound(id),
                other => Error::PersistenceWrite {
                    card_id: id,
                    reason: other.to_string(),
                },
            })
    }
}
