//! Plain-text hourly and 4-hourly reports laid out for pasting into a chat.
//!
//! Numeric cells are 5 characters wide and right-justified; downstream parsers rely on it.

use std::fmt::Write as _;

use crate::hourly::{FourHourTotals, HourSnapshot};
use crate::idle::IdleLog;
use crate::ledger::{CumulativeView, VesselPlan};
use crate::model::{Category, MoveGrid, Position};

const RULE: &str = "_________________________";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportHeader {
    pub vessel_name: String,
    pub berthed_date: String,
    pub first_lift: String,
    pub last_lift: String,
    /// Passed in by the caller; the formatter never reads a clock.
    pub report_date: String,
}

impl ReportHeader {
    pub fn new(plan: &VesselPlan, report_date: impl Into<String>) -> Self {
        ReportHeader {
            vessel_name: plan.vessel_name.clone(),
            berthed_date: plan.berthed_date.clone(),
            first_lift: plan.first_lift.clone(),
            last_lift: plan.last_lift.clone(),
            report_date: report_date.into(),
        }
    }
}

pub fn render_hourly(
    header: &ReportHeader,
    cumulative: &CumulativeView,
    snapshot: &HourSnapshot,
    hour_label: &str,
    idle: &IdleLog,
) -> String {
    render(header, cumulative, &snapshot.grid, "Hourly Moves", hour_label, idle)
}

pub fn render_4h(
    header: &ReportHeader,
    cumulative: &CumulativeView,
    totals: &FourHourTotals,
    block_label: &str,
    idle: &IdleLog,
) -> String {
    render(header, cumulative, &totals.grid, "4-Hourly Moves", block_label, idle)
}

fn render(
    header: &ReportHeader,
    cumulative: &CumulativeView,
    grid: &MoveGrid,
    period_title: &str,
    period_label: &str,
    idle: &IdleLog,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "*MV {}*", header.vessel_name.trim());
    let _ = writeln!(out, "Berthed {}\n", header.berthed_date);
    let _ = writeln!(out, "First Lift @ {}", header.first_lift);
    let _ = writeln!(out, "Last Lift @ {}\n", header.last_lift);
    let _ = writeln!(out, "{}", header.report_date);
    let _ = writeln!(out, "{period_title}\n{period_label}");

    section(&mut out, "Crane Moves");
    pair_header(&mut out, "Load", "Disch");
    for p in Position::ALL {
        pair_row(
            &mut out,
            p.label(),
            grid.get(Category::Load, p).into(),
            grid.get(Category::Discharge, p).into(),
        );
    }

    section(&mut out, "Restows");
    pair_header(&mut out, "Load", "Disch");
    for p in Position::ALL {
        pair_row(
            &mut out,
            p.label(),
            grid.get(Category::RestowLoad, p).into(),
            grid.get(Category::RestowDisch, p).into(),
        );
    }

    section(&mut out, "Cumulative");
    cumulative_table(&mut out, cumulative, Category::Load, Category::Discharge);

    section(&mut out, "Restows Cumulative");
    cumulative_table(
        &mut out,
        cumulative,
        Category::RestowLoad,
        Category::RestowDisch,
    );

    section(&mut out, "Hatch Moves");
    pair_header(&mut out, "Open", "Close");
    for &p in Category::HatchOpen.positions() {
        pair_row(
            &mut out,
            p.label(),
            grid.get(Category::HatchOpen, p).into(),
            grid.get(Category::HatchClose, p).into(),
        );
    }

    section(&mut out, "Idle / Delays");
    let listed = idle.list_entries();
    if listed.is_empty() {
        let _ = writeln!(out, "Nil");
    } else {
        // Newest first, numbered in display order.
        for (i, e) in listed.iter().map(|l| &l.entry).enumerate() {
            let _ = writeln!(
                out,
                "{}. {} {} - {} ({} min) {}",
                i + 1,
                e.crane.label(),
                e.start_time,
                e.end_time,
                e.duration_minutes,
                e.reason
            );
        }
    }

    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "{RULE}\n*{title}*");
}

fn pair_header(out: &mut String, a: &str, b: &str) {
    let _ = writeln!(out, "{:<7}{:>5} {:>5}", "", a, b);
}

fn pair_row(out: &mut String, label: &str, a: u64, b: u64) {
    let _ = writeln!(out, "{label:<7}{a:>5} {b:>5}");
}

fn cumulative_table(out: &mut String, view: &CumulativeView, a: Category, b: Category) {
    let (ra, rb) = (view.row(a), view.row(b));
    pair_header(out, "Load", "Disch");
    pair_row(out, "Plan", ra.plan, rb.plan);
    pair_row(out, "Done", ra.done, rb.done);
    pair_row(out, "Remain", ra.remaining, rb.remaining);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hourly::{compute_4h_manual, stage_hour};
    use crate::ledger::LedgerState;

    fn sample_state() -> LedgerState {
        let mut s = LedgerState::default();
        s.plan.vessel_name = "MSC AURORA".into();
        s.plan.berthed_date = "12/03/2026 @ 04h30".into();
        s.plan.first_lift = "05h10".into();
        s.plan.last_lift = "-".into();
        s.plan.planned.load = 687;
        s.plan.planned.discharge = 540;
        s.done.load = 26;
        s
    }

    #[test]
    fn hourly_report_layout() {
        let mut s = sample_state();
        s.idle_log
            .add_entry(Position::Mid, "11h05", "11h15", "Gearbox check")
            .unwrap();
        s.idle_log
            .add_entry(Position::Fwd, "12h30", "12h40", "Crane breakdown")
            .unwrap();

        let mut g = MoveGrid::default();
        g.set(Category::Load, Position::Fwd, 10);
        g.set(Category::Discharge, Position::Poop, 123);
        g.set(Category::HatchClose, Position::Aft, 2);
        let snap = stage_hour(&g);

        let view = s.cumulative_view();
        let header = ReportHeader::new(&s.plan, "13/03/2026");
        let text = render_hourly(&header, &view, &snap, "12h00 - 13h00", &s.idle_log);

        assert!(text.starts_with("*MV MSC AURORA*\nBerthed 12/03/2026 @ 04h30\n"));
        assert!(text.contains("Hourly Moves\n12h00 - 13h00\n"));
        assert!(text.contains("\nFWD       10     0\n"));
        assert!(text.contains("\nPOOP       0   123\n"));
        assert!(text.contains("\nPlan     687   540\n"));
        assert!(text.contains("\nDone      26     0\n"));
        assert!(text.contains("\nRemain   661   540\n"));
        assert!(text.contains("*Hatch Moves*\n        Open Close\nFWD        0     0\nMID        0     0\nAFT        0     2\n"));
        assert!(text.ends_with(
            "1. FWD 12:30 - 12:40 (10 min) Crane breakdown\n2. MID 11:05 - 11:15 (10 min) Gearbox check\n"
        ));
    }

    #[test]
    fn four_hour_report_uses_totals_and_nil_idle() {
        let mut s = sample_state();
        let mut g = MoveGrid::default();
        g.set(Category::RestowLoad, Position::Mid, 4);
        let totals = compute_4h_manual(g);

        let view = s.cumulative_view();
        let header = ReportHeader::new(&s.plan, "13/03/2026");
        let text = render_4h(&header, &view, &totals, "10h00-14h00", &IdleLog::default());

        assert!(text.contains("4-Hourly Moves\n10h00-14h00\n"));
        assert!(text.contains("*Restows*\n        Load Disch\nFWD        0     0\nMID        4     0\n"));
        assert!(text.ends_with("*Idle / Delays*\nNil\n"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut s = sample_state();
        let view = s.cumulative_view();
        let header = ReportHeader::new(&s.plan, "13/03/2026");
        let snap = stage_hour(&MoveGrid::default());
        let a = render_hourly(&header, &view, &snap, "06h00 - 07h00", &IdleLog::default());
        let b = render_hourly(&header, &view, &snap, "06h00 - 07h00", &IdleLog::default());
        assert_eq!(a, b);
    }
}
