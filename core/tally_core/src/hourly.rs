use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ledger::LedgerState;
use crate::model::{CategoryTotals, MoveGrid};

/// Hour labels start at the beginning of the shift day.
const SHIFT_START_HOUR: usize = 6;
const HOUR_LABEL_COUNT: u8 = 24;
const BLOCK_COUNT: u8 = 6;
const BLOCK_HOURS: usize = 4;
/// Hourly snapshots kept for the automatic 4-hour totals.
pub const WINDOW_HOURS: usize = 4;

/// One of the 24 `"HHh00 - HHh00"` hour labels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct HourPointer(u8);

impl HourPointer {
    pub fn label(self) -> String {
        let start = (SHIFT_START_HOUR + self.0 as usize) % 24;
        format!("{:02}h00 - {:02}h00", start, (start + 1) % 24)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        (0..HOUR_LABEL_COUNT)
            .map(HourPointer)
            .find(|p| p.label() == label)
    }

    /// Unknown labels fall back to the first label.
    pub fn select(label: &str) -> Self {
        Self::from_label(label).unwrap_or_else(|| {
            warn!("hour label {label:?} out of range, using {}", HourPointer::default().label());
            HourPointer::default()
        })
    }

    pub fn next(self) -> Self {
        HourPointer((self.0 + 1) % HOUR_LABEL_COUNT)
    }

    pub fn labels() -> Vec<String> {
        (0..HOUR_LABEL_COUNT).map(|i| HourPointer(i).label()).collect()
    }
}

impl From<String> for HourPointer {
    fn from(s: String) -> Self {
        HourPointer::select(&s)
    }
}

impl From<HourPointer> for String {
    fn from(p: HourPointer) -> Self {
        p.label()
    }
}

/// One of the six fixed 4-hour reporting blocks. Chosen by the user, never auto-advanced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FourHourBlock(u8);

impl FourHourBlock {
    pub fn label(self) -> String {
        let start = (SHIFT_START_HOUR + BLOCK_HOURS * self.0 as usize) % 24;
        format!("{:02}h00-{:02}h00", start, (start + BLOCK_HOURS) % 24)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        (0..BLOCK_COUNT)
            .map(FourHourBlock)
            .find(|b| b.label() == label)
    }

    pub fn select(label: &str) -> Self {
        Self::from_label(label).unwrap_or_else(|| {
            warn!("block label {label:?} out of range, using {}", FourHourBlock::default().label());
            FourHourBlock::default()
        })
    }

    pub fn labels() -> Vec<String> {
        (0..BLOCK_COUNT).map(|i| FourHourBlock(i).label()).collect()
    }
}

impl From<String> for FourHourBlock {
    fn from(s: String) -> Self {
        FourHourBlock::select(&s)
    }
}

impl From<FourHourBlock> for String {
    fn from(b: FourHourBlock) -> Self {
        b.label()
    }
}

/// Last few committed hours, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VecDeque<MoveGrid>", into = "VecDeque<MoveGrid>")]
pub struct RollingWindow {
    entries: VecDeque<MoveGrid>,
}

// Stored or restored windows keep only the newest WINDOW_HOURS entries.
impl From<VecDeque<MoveGrid>> for RollingWindow {
    fn from(mut entries: VecDeque<MoveGrid>) -> Self {
        while entries.len() > WINDOW_HOURS {
            entries.pop_front();
        }
        RollingWindow { entries }
    }
}

impl From<RollingWindow> for VecDeque<MoveGrid> {
    fn from(w: RollingWindow) -> Self {
        w.entries
    }
}

impl RollingWindow {
    pub fn push(&mut self, grid: MoveGrid) {
        self.entries.push_back(grid);
        while self.entries.len() > WINDOW_HOURS {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &MoveGrid> {
        self.entries.iter()
    }
}

/// Staged values of a single hour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HourSnapshot {
    pub grid: MoveGrid,
    pub totals: CategoryTotals,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TotalsSource {
    /// Summed from this many committed hours.
    Auto { hours: usize },
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FourHourTotals {
    pub grid: MoveGrid,
    pub totals: CategoryTotals,
    pub source: TotalsSource,
}

impl FourHourTotals {
    pub fn is_manual(&self) -> bool {
        self.source == TotalsSource::Manual
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HourCommit {
    pub done: CategoryTotals,
    pub committed: HourPointer,
    pub next: HourPointer,
}

pub fn stage_hour(grid: &MoveGrid) -> HourSnapshot {
    HourSnapshot {
        grid: *grid,
        totals: CategoryTotals::of_grid(grid),
    }
}

/// Fold an hour into the ledger and the rolling window, then move to the next hour label.
pub fn commit_hour(state: &mut LedgerState, snapshot: &HourSnapshot) -> HourCommit {
    let done = state.record_hour(snapshot);
    state.window.push(snapshot.grid);
    state.draft = MoveGrid::default();

    let committed = state.hour;
    state.hour = committed.next();
    HourCommit {
        done,
        committed,
        next: state.hour,
    }
}

/// Skip an hour with nothing to record: clears the draft and advances the hour label only.
pub fn reset_hour_inputs(state: &mut LedgerState) -> HourPointer {
    state.draft = MoveGrid::default();
    state.hour = state.hour.next();
    state.hour
}

pub fn compute_4h_auto(window: &RollingWindow) -> FourHourTotals {
    let mut grid = MoveGrid::default();
    for g in window.iter() {
        grid.accumulate(g);
    }
    FourHourTotals {
        grid,
        totals: CategoryTotals::of_grid(&grid),
        source: TotalsSource::Auto {
            hours: window.len(),
        },
    }
}

pub fn compute_4h_manual(overrides: MoveGrid) -> FourHourTotals {
    FourHourTotals {
        grid: overrides,
        totals: CategoryTotals::of_grid(&overrides),
        source: TotalsSource::Manual,
    }
}

pub fn reset_4h_window(state: &mut LedgerState) {
    state.window.clear();
}

pub fn select_hour(state: &mut LedgerState, label: &str) -> HourPointer {
    state.hour = HourPointer::select(label);
    state.hour
}

pub fn select_block(state: &mut LedgerState, label: &str) -> FourHourBlock {
    state.block = FourHourBlock::select(label);
    state.block
}
