use crate::error::Result;
use crate::idle::IdleEntry;
use crate::ledger::LedgerState;
use crate::model::MoveGrid;
use crate::store::{FourHourRecord, HourlyRecord};

/// Full ledger as pretty JSON, for backup.
pub fn backup_json(state: &LedgerState) -> Result<String> {
    Ok(serde_json::to_string_pretty(state)?)
}

pub fn restore_json(raw: &str) -> Result<LedgerState> {
    Ok(serde_json::from_str(raw)?)
}

pub fn idle_logs_csv(entries: &[IdleEntry]) -> String {
    let mut out = String::new();
    out.push_str("index,crane,start_time,end_time,duration_minutes,reason\n");
    for (i, e) in entries.iter().enumerate() {
        let row = [
            i.to_string(),
            e.crane.label().to_string(),
            csv_escape(&e.start_time),
            csv_escape(&e.end_time),
            e.duration_minutes.to_string(),
            csv_escape(&e.reason),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

pub fn hourly_records_csv(records: &[HourlyRecord]) -> String {
    let mut out = String::new();
    out.push_str("id,recorded_at,report_date,hour,");
    out.push_str(&grid_header());
    out.push('\n');
    for r in records {
        let mut row = vec![
            r.id.to_string(),
            csv_escape(&r.recorded_at),
            csv_escape(&r.report_date),
            csv_escape(&r.hour),
        ];
        row.extend(grid_cells(&r.grid));
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

pub fn four_hour_reports_csv(records: &[FourHourRecord]) -> String {
    let mut out = String::new();
    out.push_str("id,recorded_at,report_date,block,manual,");
    out.push_str(&grid_header());
    out.push('\n');
    for r in records {
        let mut row = vec![
            r.id.to_string(),
            csv_escape(&r.recorded_at),
            csv_escape(&r.report_date),
            csv_escape(&r.block),
            if r.manual { "1" } else { "0" }.to_string(),
        ];
        row.extend(grid_cells(&r.grid));
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn grid_header() -> String {
    MoveGrid::cells()
        .map(|(c, p)| format!("{}_{}", c.key(), p.label().to_lowercase()))
        .collect::<Vec<_>>()
        .join(",")
}

fn grid_cells(grid: &MoveGrid) -> impl Iterator<Item = String> + '_ {
    MoveGrid::cells().map(move |(c, p)| grid.get(c, p).to_string())
}

fn csv_escape(s: &str) -> String {
    let needs_quote = s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r');
    if !needs_quote {
        return s.to_string();
    }
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TallyError;
    use crate::hourly::{commit_hour, compute_4h_auto, stage_hour, WINDOW_HOURS};
    use crate::model::{Category, Position};

    #[test]
    fn backup_restores_identical_state() {
        let mut s = LedgerState::default();
        s.plan.vessel_name = "ONE HAMBURG".into();
        s.plan.planned.discharge = 300;
        let mut g = MoveGrid::default();
        g.set(Category::Discharge, Position::Mid, 12);
        commit_hour(&mut s, &stage_hour(&g));
        s.idle_log
            .add_entry(Position::Mid, "0915", "0930", "Gantry wind stop")
            .unwrap();

        let json = backup_json(&s).unwrap();
        assert!(json.contains("\"hour\": \"07h00 - 08h00\""));
        assert_eq!(restore_json(&json).unwrap(), s);
    }

    #[test]
    fn restore_rejects_garbage_and_fills_missing_fields() {
        assert!(restore_json("{not json").is_err());
        let s = restore_json(r#"{"plan": {"vessel_name": "X"}, "hour": "bogus"}"#).unwrap();
        assert_eq!(s.plan.vessel_name, "X");
        assert_eq!(s.hour.label(), "06h00 - 07h00");
    }

    #[test]
    fn restored_window_keeps_only_the_newest_hours() {
        let mut s = LedgerState::default();
        for _ in 0..4 {
            let mut g = MoveGrid::default();
            g.set(Category::Load, Position::Fwd, 1);
            commit_hour(&mut s, &stage_hour(&g));
        }
        let mut value: serde_json::Value = serde_json::from_str(&backup_json(&s).unwrap()).unwrap();
        let one = value["window"][0].clone();
        let mut last = one.clone();
        last["load"]["FWD"] = serde_json::json!(5);
        let mut window = vec![one; 8];
        window.push(last);
        value["window"] = serde_json::Value::Array(window);

        let restored = restore_json(&value.to_string()).unwrap();
        assert_eq!(restored.window.len(), WINDOW_HOURS);
        let auto = compute_4h_auto(&restored.window);
        assert_eq!(auto.totals.load, 3 + 5);
    }

    #[test]
    fn restored_idle_entries_are_normalized() {
        let raw = r#"{"idle_log": [
            {"crane": "FWD", "start_time": "23h50", "end_time": "0010", "reason": " Rain ", "duration_minutes": 999}
        ]}"#;
        let s = restore_json(raw).unwrap();
        let e = &s.idle_log.entries()[0];
        assert_eq!((e.start_time.as_str(), e.end_time.as_str()), ("23:50", "00:10"));
        assert_eq!(e.duration_minutes, 20);
        assert_eq!(e.reason, "Rain");

        let bad = r#"{"idle_log": [{"crane": "FWD", "start_time": "25h00", "end_time": "0010"}]}"#;
        assert!(matches!(restore_json(bad), Err(TallyError::Backup(_))));
    }

    #[test]
    fn idle_csv_quotes_reasons() {
        let entries = vec![IdleEntry {
            crane: Position::Poop,
            start_time: "10:00".into(),
            end_time: "10:05".into(),
            reason: "Reefer plug, \"urgent\"".into(),
            duration_minutes: 5,
        }];
        assert_eq!(
            idle_logs_csv(&entries),
            "index,crane,start_time,end_time,duration_minutes,reason\n0,POOP,10:00,10:05,5,\"Reefer plug, \"\"urgent\"\"\"\n"
        );
    }

    #[test]
    fn hourly_csv_has_one_column_per_cell() {
        let mut g = MoveGrid::default();
        g.set(Category::Load, Position::Fwd, 7);
        g.set(Category::HatchClose, Position::Aft, 1);
        let rec = HourlyRecord {
            id: 3,
            recorded_at: "2026-03-01T06:00:00Z".into(),
            report_date: "01/03/2026".into(),
            hour: "06h00 - 07h00".into(),
            grid: g,
        };
        let csv = hourly_records_csv(&[rec]);
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        let row = lines.next().unwrap();
        assert!(header.starts_with("id,recorded_at,report_date,hour,load_fwd,load_mid"));
        assert!(header.ends_with("hatch_close_aft"));
        assert_eq!(header.split(',').count(), 4 + 22);
        assert!(row.starts_with("3,2026-03-01T06:00:00Z,01/03/2026,06h00 - 07h00,7,0"));
        assert!(row.ends_with(",1"));
    }
}
