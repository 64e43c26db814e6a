//! The vessel ledger: plan, cumulative done counters and the derived remaining figures.
//!
//! Opening balances are never folded into `done`; they are added when the effective
//! done figure is read. The plan behaves as a ceiling that only moves up: whenever
//! remaining work is computed and effective done has overrun the plan, the plan is
//! raised to match.

use serde::{Deserialize, Serialize};

use crate::hourly::{FourHourBlock, HourPointer, HourSnapshot, RollingWindow};
use crate::idle::IdleLog;
use crate::model::{clamp_count, Category, CategoryTotals, MoveGrid, PlanFigures};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselPlan {
    pub vessel_name: String,
    /// Free-form, usually `DD/MM/YYYY @ HHhMM`.
    pub berthed_date: String,
    pub first_lift: String,
    pub last_lift: String,
    pub planned: PlanFigures,
    pub opening: PlanFigures,
}

/// Partial plan edit. Absent fields are left alone; unknown fields are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlanUpdate {
    #[serde(default)]
    pub vessel_name: Option<String>,
    #[serde(default)]
    pub berthed_date: Option<String>,
    #[serde(default)]
    pub first_lift: Option<String>,
    #[serde(default)]
    pub last_lift: Option<String>,
    #[serde(default)]
    pub planned_load: Option<i64>,
    #[serde(default)]
    pub planned_discharge: Option<i64>,
    #[serde(default)]
    pub planned_restow_load: Option<i64>,
    #[serde(default)]
    pub planned_restow_disch: Option<i64>,
    #[serde(default)]
    pub opening_load: Option<i64>,
    #[serde(default)]
    pub opening_discharge: Option<i64>,
    #[serde(default)]
    pub opening_restow_load: Option<i64>,
    #[serde(default)]
    pub opening_restow_disch: Option<i64>,
}

impl PlanUpdate {
    fn planned(&self, c: Category) -> Option<i64> {
        match c {
            Category::Load => self.planned_load,
            Category::Discharge => self.planned_discharge,
            Category::RestowLoad => self.planned_restow_load,
            Category::RestowDisch => self.planned_restow_disch,
            Category::HatchOpen | Category::HatchClose => None,
        }
    }

    fn opening(&self, c: Category) -> Option<i64> {
        match c {
            Category::Load => self.opening_load,
            Category::Discharge => self.opening_discharge,
            Category::RestowLoad => self.opening_restow_load,
            Category::RestowDisch => self.opening_restow_disch,
            Category::HatchOpen | Category::HatchClose => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CumulativeRow {
    pub category: Category,
    pub plan: u64,
    pub done: u64,
    pub remaining: u64,
}

/// Plan / done / remaining for the planned categories, after the ratchet has been applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CumulativeView {
    pub rows: Vec<CumulativeRow>,
}

impl CumulativeView {
    pub fn row(&self, c: Category) -> CumulativeRow {
        self.rows
            .iter()
            .copied()
            .find(|r| r.category == c)
            .unwrap_or(CumulativeRow {
                category: c,
                plan: 0,
                done: 0,
                remaining: 0,
            })
    }
}

/// Everything the application tracks for one vessel. Persisted as a single record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerState {
    pub plan: VesselPlan,
    pub done: CategoryTotals,
    pub hour: HourPointer,
    pub block: FourHourBlock,
    pub window: RollingWindow,
    pub idle_log: IdleLog,
    /// Per-hour inputs not yet committed.
    pub draft: MoveGrid,
}

impl LedgerState {
    pub fn get_plan(&self) -> VesselPlan {
        self.plan.clone()
    }

    pub fn update_plan(&mut self, u: PlanUpdate) -> VesselPlan {
        if let Some(v) = u.vessel_name.as_deref() {
            self.plan.vessel_name = v.trim().to_string();
        }
        if let Some(v) = u.berthed_date.as_deref() {
            self.plan.berthed_date = v.trim().to_string();
        }
        if let Some(v) = u.first_lift.as_deref() {
            self.plan.first_lift = v.trim().to_string();
        }
        if let Some(v) = u.last_lift.as_deref() {
            self.plan.last_lift = v.trim().to_string();
        }
        for c in Category::PLANNED {
            if let Some(v) = u.planned(c) {
                self.plan.planned.set(c, clamp_count(v));
            }
            if let Some(v) = u.opening(c) {
                self.plan.opening.set(c, clamp_count(v));
            }
        }
        self.get_plan()
    }

    /// Add one hour's category totals to the cumulative done counters.
    pub fn record_hour(&mut self, snapshot: &HourSnapshot) -> CategoryTotals {
        for c in Category::ALL {
            let slot = self.done.get_mut(c);
            *slot = slot.saturating_add(snapshot.totals.get(c));
        }
        self.done
    }

    pub fn effective_done(&self, c: Category) -> u64 {
        self.done.get(c).saturating_add(self.plan.opening.get(c))
    }

    /// Remaining work for `c`. Raises the plan to effective done on overrun.
    pub fn remaining(&mut self, c: Category) -> u64 {
        if !c.is_planned() {
            return 0;
        }
        let done = self.effective_done(c);
        if done > self.plan.planned.get(c) {
            self.plan.planned.set(c, done);
        }
        self.plan.planned.get(c) - done
    }

    /// The single entry point report paths use for cumulative figures.
    pub fn cumulative_view(&mut self) -> CumulativeView {
        let rows = Category::PLANNED
            .into_iter()
            .map(|c| {
                let remaining = self.remaining(c);
                CumulativeRow {
                    category: c,
                    plan: self.plan.planned.get(c),
                    done: self.effective_done(c),
                    remaining,
                }
            })
            .collect();
        CumulativeView { rows }
    }

    /// Back to factory state. The vessel name is cleared too.
    pub fn master_reset(&mut self) {
        *self = LedgerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hourly::{commit_hour, compute_4h_auto, stage_hour};
    use crate::model::Position;

    fn load_hour(counts: [u32; 4]) -> HourSnapshot {
        let mut g = MoveGrid::default();
        for (p, v) in Position::ALL.into_iter().zip(counts) {
            g.set(Category::Load, p, v);
        }
        stage_hour(&g)
    }

    #[test]
    fn update_plan_is_partial_and_clamps() {
        let mut s = LedgerState::default();
        s.update_plan(PlanUpdate {
            vessel_name: Some(" MSC Aurora ".into()),
            planned_load: Some(687),
            planned_discharge: Some(-3),
            ..Default::default()
        });
        let plan = s.update_plan(PlanUpdate {
            opening_load: Some(12),
            ..Default::default()
        });
        assert_eq!(plan.vessel_name, "MSC Aurora");
        assert_eq!(plan.planned.load, 687);
        assert_eq!(plan.planned.discharge, 0);
        assert_eq!(plan.opening.load, 12);
    }

    #[test]
    fn plan_update_ignores_unknown_json_fields() {
        let u: PlanUpdate =
            serde_json::from_str(r#"{"planned_load": 5, "crane_count": 4}"#).unwrap();
        let mut s = LedgerState::default();
        assert_eq!(s.update_plan(u).planned.load, 5);
    }

    #[test]
    fn opening_balance_is_applied_at_read_time_only() {
        let mut s = LedgerState::default();
        s.plan.planned.discharge = 100;
        s.plan.opening.discharge = 30;
        let mut snap = HourSnapshot::default();
        snap.totals.discharge = 5;
        s.record_hour(&snap);

        assert_eq!(s.done.discharge, 5);
        assert_eq!(s.effective_done(Category::Discharge), 35);
        assert_eq!(s.remaining(Category::Discharge), 65);
    }

    #[test]
    fn ratchet_never_lowers_plan_and_remaining_stays_non_negative() {
        let mut s = LedgerState::default();
        s.plan.planned.restow_load = 4;
        s.plan.opening.restow_load = 3;
        let mut snap = HourSnapshot::default();
        snap.totals.restow_load = 5;
        s.record_hour(&snap);

        let view = s.cumulative_view();
        let row = view.row(Category::RestowLoad);
        assert_eq!(row.plan, 8);
        assert_eq!(row.done, 8);
        assert_eq!(row.remaining, 0);

        s.plan.opening.restow_load = 0;
        assert_eq!(s.remaining(Category::RestowLoad), 3);
        assert_eq!(s.plan.planned.restow_load, 8);

        for c in Category::PLANNED {
            s.remaining(c);
            assert!(s.plan.planned.get(c) >= s.effective_done(c));
        }
    }

    #[test]
    fn end_to_end_load_plan_scenario() {
        let mut s = LedgerState::default();
        s.plan.planned.load = 687;

        commit_hour(&mut s, &load_hour([10, 5, 0, 0]));
        commit_hour(&mut s, &load_hour([8, 0, 2, 1]));
        assert_eq!(s.done.load, 26);
        assert_eq!(s.effective_done(Category::Load), 26);
        assert_eq!(s.remaining(Category::Load), 661);

        commit_hour(&mut s, &load_hour([700, 0, 0, 0]));
        assert_eq!(s.remaining(Category::Load), 0);
        assert_eq!(s.plan.planned.load, 726);
        // 4-hour figures come from the window, cumulative figures from done.
        assert_eq!(compute_4h_auto(&s.window).totals.load, 726);
        assert_eq!(s.cumulative_view().row(Category::Load).plan, 726);
    }

    #[test]
    fn master_reset_clears_everything() {
        let mut s = LedgerState::default();
        s.plan.vessel_name = "MAERSK KOWLOON".into();
        s.plan.planned.load = 10;
        commit_hour(&mut s, &load_hour([1, 1, 1, 1]));
        s.idle_log
            .add_entry(Position::Fwd, "10h00", "10h15", "rain")
            .unwrap();

        s.master_reset();
        assert_eq!(s, LedgerState::default());
        assert!(s.plan.vessel_name.is_empty());
    }
}
