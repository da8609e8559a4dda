//! Study log for completed review sessions.
//!
//! Every completed session is appended to a JSONL (JSON Lines) file with file
//! locking, one record per line. The log is the consumer of the session-complete
//! signal and backs the per-day review counts shown by `memo history`.

use crate::session::SessionObserver;
use crate::{Error, Result};
use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One completed review session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudyLogEntry {
    pub id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub cards_reviewed: usize,
    #[serde(default)]
    pub deck: Option<String>,
}

/// Sink for completed-session records
pub trait StudyLogSink {
    fn append(&mut self, entry: &StudyLogEntry) -> Result<()>;
}

/// JSONL-based study log with file locking
pub struct JsonlStudyLog {
    path: PathBuf,
    deck: Option<String>,
    failure: Option<Error>,
}

impl JsonlStudyLog {
    /// Create a new study log for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            deck: None,
            failure: None,
        }
    }

    /// Tag entries recorded through [`SessionObserver`] with a deck name
    pub fn for_deck(mut self, deck: Option<String>) -> Self {
        self.deck = deck;
        self
    }

    /// Error from the last session-complete write, if it failed
    pub fn take_failure(&mut self) -> Option<Error> {
        self.failure.take()
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl StudyLogSink for JsonlStudyLog {
    fn append(&mut self, entry: &StudyLogEntry) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(entry)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Appended study log entry {} ({} cards)", entry.id, entry.cards_reviewed);
        Ok(())
    }
}

impl SessionObserver for JsonlStudyLog {
    fn on_session_complete(&mut self, cards_reviewed: usize) {
        let entry = StudyLogEntry {
            id: Uuid::new_v4(),
            completed_at: Utc::now(),
            cards_reviewed,
            deck: self.deck.clone(),
        };
        if let Err(e) = self.append(&entry) {
            tracing::error!("Failed to record study log entry at {:?}: {}", self.path, e);
            self.failure = Some(e);
        }
    }
}

/// Read all entries from a study log file
///
/// Unparseable lines are skipped with a warning.
pub fn read_entries(path: &Path) -> Result<Vec<StudyLogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut entries = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<StudyLogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!("Failed to parse study log at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} study log entries", entries.len());
    Ok(entries)
}

/// Cards reviewed per calendar day in the given UTC offset
pub fn daily_counts(entries: &[StudyLogEntry], offset: FixedOffset) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        let day = entry.completed_at.with_timezone(&offset).date_naive();
        *counts.entry(day).or_insert(0) += entry.cards_reviewed;
    }
    counts
}

/// The `days` calendar days ending at `today`, oldest first, with zero-filled gaps
///
/// Days before the earliest representable date are dropped.
pub fn recent_daily_counts(
    entries: &[StudyLogEntry],
    today: NaiveDate,
    days: u32,
    offset: FixedOffset,
) -> Vec<(NaiveDate, usize)> {
    let counts = daily_counts(entries, offset);
    let mut recent: Vec<_> = (0..u64::from(days))
        .map_while(|back| today.checked_sub_days(Days::new(back)))
        .map(|day| (day, counts.get(&day).copied().unwrap_or(0)))
        .collect();
    recent.reverse();
    recent
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry_at(at: DateTime<Utc>, cards: usize) -> StudyLogEntry {
        StudyLogEntry {
            id: Uuid::new_v4(),
            completed_at: at,
            cards_reviewed: cards,
            deck: None,
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_append_and_read_single_entry() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("study_log.jsonl");

        let entry = entry_at(Utc::now(), 12);
        let mut log = JsonlStudyLog::new(&log_path);
        log.append(&entry).unwrap();

        let entries = read_entries(&log_path).unwrap();
        assert_eq!(entries, vec![entry]);
    }

    #[test]
    fn test_observer_appends_once_per_call() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("logs").join("study_log.jsonl");

        let mut log = JsonlStudyLog::new(&log_path).for_deck(Some("toeic".into()));
        log.on_session_complete(3);
        log.on_session_complete(0);
        assert!(log.take_failure().is_none());

        let entries = read_entries(&log_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].cards_reviewed, 3);
        assert_eq!(entries[0].deck.as_deref(), Some("toeic"));
        assert_eq!(entries[1].cards_reviewed, 0);
    }

    #[test]
    fn test_read_missing_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let entries = read_entries(&temp_dir.path().join("nope.jsonl")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("study_log.jsonl");

        let good = entry_at(Utc::now(), 4);
        let contents = format!(
            "{}\n{{ truncated\n\n{}\n",
            serde_json::to_string(&good).unwrap(),
            serde_json::to_string(&good).unwrap()
        );
        std::fs::write(&log_path, contents).unwrap();

        assert_eq!(read_entries(&log_path).unwrap().len(), 2);
    }

    #[test]
    fn test_daily_counts_sum_sessions_per_day() {
        let entries = vec![
            entry_at(Utc.with_ymd_and_hms(2025, 8, 15, 8, 0, 0).unwrap(), 5),
            entry_at(Utc.with_ymd_and_hms(2025, 8, 15, 21, 0, 0).unwrap(), 7),
            entry_at(Utc.with_ymd_and_hms(2025, 8, 16, 1, 0, 0).unwrap(), 16),
        ];

        let counts = daily_counts(&entries, utc());
        assert_eq!(counts[&NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()], 12);
        assert_eq!(counts[&NaiveDate::from_ymd_opt(2025, 8, 16).unwrap()], 16);
    }

    #[test]
    fn test_daily_counts_respect_offset() {
        // 21:00 UTC is already the next day in Tokyo
        let entries = vec![entry_at(Utc.with_ymd_and_hms(2025, 8, 15, 21, 0, 0).unwrap(), 7)];
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();

        let counts = daily_counts(&entries, tokyo);
        assert_eq!(counts.keys().next(), NaiveDate::from_ymd_opt(2025, 8, 16).as_ref());
    }

    #[test]
    fn test_recent_daily_counts_fill_gaps() {
        let entries = vec![entry_at(Utc.with_ymd_and_hms(2025, 8, 14, 10, 0, 0).unwrap(), 9)];
        let today = NaiveDate::from_ymd_opt(2025, 8, 16).unwrap();

        let recent = recent_daily_counts(&entries, today, 3, utc());
        assert_eq!(
            recent,
            vec![
                (NaiveDate::from_ymd_opt(2025, 8, 14).unwrap(), 9),
                (NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(), 0),
                (today, 0),
            ]
        );
    }

    #[test]
    fn test_recent_daily_counts_stop_at_earliest_date() {
        let today = NaiveDate::MIN + Days::new(2);

        let recent = recent_daily_counts(&[], today, 200_000_000, utc());
        assert_eq!(
            recent,
            vec![
                (NaiveDate::MIN, 0),
                (NaiveDate::MIN + Days::new(1), 0),
                (today, 0),
            ]
        );
    }
}
