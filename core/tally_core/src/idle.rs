use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::model::Position;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Wall-clock time of day at minute resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockTime {
    minutes: u32,
}

impl ClockTime {
    /// Accepts `HHhMM`, `HH:MM` or a bare `HHMM`.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let invalid = || TallyError::InvalidTimeFormat(input.to_string());

        let (h, m) = if let Some(parts) = raw.split_once(['h', 'H', ':']) {
            parts
        } else if raw.len() == 4 && raw.bytes().all(|b| b.is_ascii_digit()) {
            raw.split_at(2)
        } else {
            return Err(invalid());
        };

        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(h) || !digits(m) || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(ClockTime {
            minutes: hour * 60 + minute,
        })
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

/// Minutes from `start` to `end`; an earlier `end` is taken to be on the next day.
pub fn duration_minutes(start: ClockTime, end: ClockTime) -> u32 {
    if end < start {
        end.minutes + MINUTES_PER_DAY - start.minutes
    } else {
        end.minutes - start.minutes
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIdleEntry")]
pub struct IdleEntry {
    pub crane: Position,
    /// Normalized `HH:MM`.
    pub start_time: String,
    pub end_time: String,
    pub reason: String,
    pub duration_minutes: u32,
}

impl IdleEntry {
    /// Normalizes both times and derives the duration from them.
    pub fn new(crane: Position, start: &str, end: &str, reason: &str) -> Result<Self> {
        let start = ClockTime::parse(start)?;
        let end = ClockTime::parse(end)?;
        Ok(IdleEntry {
            crane,
            start_time: start.to_string(),
            end_time: end.to_string(),
            reason: reason.trim().to_string(),
            duration_minutes: duration_minutes(start, end),
        })
    }
}

// Incoming entries (backups) carry a duration of their own; it is recomputed.
#[derive(Deserialize)]
struct RawIdleEntry {
    crane: Position,
    start_time: String,
    end_time: String,
    #[serde(default)]
    reason: String,
}

impl TryFrom<RawIdleEntry> for IdleEntry {
    type Error = TallyError;

    fn try_from(raw: RawIdleEntry) -> Result<Self> {
        IdleEntry::new(raw.crane, &raw.start_time, &raw.end_time, &raw.reason)
    }
}

/// An entry as listed for display, with its position in storage order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListedIdleEntry {
    pub index: usize,
    #[serde(flatten)]
    pub entry: IdleEntry,
}

/// Delay events in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdleLog {
    entries: Vec<IdleEntry>,
}

impl IdleLog {
    pub fn from_entries(entries: Vec<IdleEntry>) -> Self {
        IdleLog { entries }
    }

    /// Parses both times before touching the log; a bad time leaves it unchanged.
    pub fn add_entry(
        &mut self,
        crane: Position,
        start: &str,
        end: &str,
        reason: &str,
    ) -> Result<IdleEntry> {
        let entry = IdleEntry::new(crane, start, end, reason)?;
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Newest first.
    pub fn list_entries(&self) -> Vec<ListedIdleEntry> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .map(|(index, entry)| ListedIdleEntry {
                index,
                entry: entry.clone(),
            })
            .collect()
    }

    /// Storage order.
    pub fn entries(&self) -> &[IdleEntry] {
        &self.entries
    }

    /// Remove by storage index. Indices past the end are ignored.
    pub fn delete_entries(&mut self, indices: &[usize]) -> usize {
        let doomed: HashSet<usize> = indices.iter().copied().collect();
        let before = self.entries.len();
        let mut i = 0;
        self.entries.retain(|_| {
            let keep = !doomed.contains(&i);
            i += 1;
            keep
        });
        before - self.entries.len()
    }

    pub fn total_minutes(&self) -> u32 {
        self.entries.iter().map(|e| e.duration_minutes).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
