use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params_from_iter, types::Value, Connection};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::warn;

use crate::error::Result;
use crate::hourly::{FourHourBlock, FourHourTotals, HourPointer, RollingWindow};
use crate::idle::{IdleEntry, IdleLog};
use crate::ledger::LedgerState;
use crate::model::{clamp_count, Category, MoveGrid, Position};

/// SQLite-backed home of the single ledger record plus the per-report history.
pub struct SqliteStore {
    conn: Connection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HourlyRecord {
    pub id: i64,
    pub recorded_at: String,
    pub report_date: String,
    pub hour: String,
    pub grid: MoveGrid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FourHourRecord {
    pub id: i64,
    pub recorded_at: String,
    pub report_date: String,
    pub block: String,
    pub manual: bool,
    pub grid: MoveGrid,
}

impl SqliteStore {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn from_connection(conn: Connection) -> rusqlite::Result<Self> {
        init_db(&conn)?;
        ensure_ledger_columns(&conn)?;
        Ok(SqliteStore { conn })
    }

    /// The persisted ledger, or the factory default when nothing was saved yet.
    pub fn load(&mut self) -> rusqlite::Result<LedgerState> {
        let Some(mut state) = load_ledger_row(&self.conn)? else {
            return Ok(LedgerState::default());
        };
        state.idle_log = load_idle_log(&self.conn)?;
        Ok(state)
    }

    /// Writes the ledger row and the idle log in one transaction.
    pub fn save(&mut self, state: &LedgerState) -> Result<()> {
        let window_json = serde_json::to_string(&state.window)?;
        let draft_json = serde_json::to_string(&state.draft)?;
        let updated_at = now_rfc3339();

        let plan = &state.plan;
        let mut values = vec![
            Value::Text(plan.vessel_name.clone()),
            Value::Text(plan.berthed_date.clone()),
            Value::Text(plan.first_lift.clone()),
            Value::Text(plan.last_lift.clone()),
        ];
        values.extend(Category::PLANNED.map(|c| sql_count(plan.planned.get(c))));
        values.extend(Category::PLANNED.map(|c| sql_count(plan.opening.get(c))));
        values.extend(Category::ALL.map(|c| sql_count(state.done.get(c))));
        values.push(Value::Text(state.hour.label()));
        values.push(Value::Text(state.block.label()));
        values.push(Value::Text(window_json));
        values.push(Value::Text(draft_json));
        values.push(Value::Text(updated_at));

        let cols = ledger_column_names();
        let placeholders = (1..=cols.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = cols
            .iter()
            .map(|c| format!("{c}=excluded.{c}"))
            .collect::<Vec<_>>()
            .join(",\n  ");
        let sql = format!(
            "INSERT INTO ledger (id, {}) VALUES (1, {placeholders})\nON CONFLICT(id) DO UPDATE SET\n  {updates}",
            cols.join(", ")
        );

        let tx = self.conn.transaction()?;
        tx.execute(&sql, params_from_iter(values.iter()))?;
        tx.execute("DELETE FROM idle_logs", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO idle_logs (seq, crane, start_time, end_time, reason, duration_minutes) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (seq, e) in state.idle_log.entries().iter().enumerate() {
                stmt.execute((
                    seq as i64,
                    e.crane.label(),
                    &e.start_time,
                    &e.end_time,
                    &e.reason,
                    i64::from(e.duration_minutes),
                ))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn append_hourly_record(
        &mut self,
        report_date: &str,
        hour: HourPointer,
        grid: &MoveGrid,
    ) -> Result<()> {
        let mut values = vec![
            Value::Text(now_rfc3339()),
            Value::Text(report_date.to_string()),
            Value::Text(hour.label()),
        ];
        values.extend(grid_values(grid));
        insert_history_row(
            &self.conn,
            "hourly_records",
            &["recorded_at", "report_date", "hour_label"],
            &values,
        )?;
        Ok(())
    }

    pub fn append_four_hour_report(
        &mut self,
        report_date: &str,
        block: FourHourBlock,
        totals: &FourHourTotals,
    ) -> Result<()> {
        let mut values = vec![
            Value::Text(now_rfc3339()),
            Value::Text(report_date.to_string()),
            Value::Text(block.label()),
            Value::Integer(totals.is_manual() as i64),
        ];
        values.extend(grid_values(&totals.grid));
        insert_history_row(
            &self.conn,
            "four_hour_reports",
            &["recorded_at", "report_date", "block_label", "manual"],
            &values,
        )?;
        Ok(())
    }

    pub fn list_hourly_records(&mut self) -> rusqlite::Result<Vec<HourlyRecord>> {
        let sql = format!(
            "SELECT id, recorded_at, report_date, hour_label, {} FROM hourly_records ORDER BY id",
            grid_column_names().join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(HourlyRecord {
                id: row.get(0)?,
                recorded_at: row.get(1)?,
                report_date: row.get(2)?,
                hour: row.get(3)?,
                grid: grid_from_row(row, 4)?,
            })
        })?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn list_four_hour_reports(&mut self) -> rusqlite::Result<Vec<FourHourRecord>> {
        let sql = format!(
            "SELECT id, recorded_at, report_date, block_label, manual, {} FROM four_hour_reports ORDER BY id",
            grid_column_names().join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let manual: i64 = row.get(4)?;
            Ok(FourHourRecord {
                id: row.get(0)?,
                recorded_at: row.get(1)?,
                report_date: row.get(2)?,
                block: row.get(3)?,
                manual: manual != 0,
                grid: grid_from_row(row, 5)?,
            })
        })?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Drop the per-report history. The ledger row is left alone.
    pub fn wipe_history(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let hourly = tx.execute("DELETE FROM hourly_records", [])?;
        let four_hour = tx.execute("DELETE FROM four_hour_reports", [])?;
        tx.commit()?;
        Ok(hourly + four_hour)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

fn sql_count(v: u64) -> Value {
    Value::Integer(v.min(i64::MAX as u64) as i64)
}

/// `load_fwd`, `load_mid`, ..., `hatch_close_aft`: one column per existing grid cell.
fn grid_column_names() -> Vec<String> {
    MoveGrid::cells()
        .map(|(c, p)| format!("{}_{}", c.key(), p.label().to_lowercase()))
        .collect()
}

fn grid_values(grid: &MoveGrid) -> impl Iterator<Item = Value> + '_ {
    MoveGrid::cells().map(move |(c, p)| Value::Integer(grid.get(c, p).into()))
}

fn grid_from_row(row: &rusqlite::Row<'_>, first: usize) -> rusqlite::Result<MoveGrid> {
    let mut grid = MoveGrid::default();
    for (i, (c, p)) in MoveGrid::cells().enumerate() {
        let v: i64 = row.get(first + i)?;
        grid.set(c, p, clamp_count(v).min(u64::from(u32::MAX)) as u32);
    }
    Ok(grid)
}

fn insert_history_row(
    conn: &Connection,
    table: &str,
    leading: &[&str],
    values: &[Value],
) -> rusqlite::Result<usize> {
    let mut cols: Vec<String> = leading.iter().map(|s| s.to_string()).collect();
    cols.extend(grid_column_names());
    let placeholders = (1..=cols.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(
        &format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            cols.join(", ")
        ),
        params_from_iter(values.iter()),
    )
}

/// (column, declaration) for every ledger column except the id.
fn ledger_column_defs() -> Vec<(String, &'static str)> {
    const TEXT: &str = "TEXT NOT NULL DEFAULT ''";
    const COUNT: &str = "INTEGER NOT NULL DEFAULT 0";

    let mut defs: Vec<(String, &'static str)> = ["vessel_name", "berthed_date", "first_lift", "last_lift"]
        .into_iter()
        .map(|c| (c.to_string(), TEXT))
        .collect();
    defs.extend(Category::PLANNED.map(|c| (format!("planned_{}", c.key()), COUNT)));
    defs.extend(Category::PLANNED.map(|c| (format!("opening_{}", c.key()), COUNT)));
    defs.extend(Category::ALL.map(|c| (format!("done_{}", c.key()), COUNT)));
    defs.push(("last_hour".to_string(), TEXT));
    defs.push(("four_hour_block".to_string(), TEXT));
    defs.push(("rolling_window_json".to_string(), "TEXT NOT NULL DEFAULT '[]'"));
    defs.push(("draft_json".to_string(), "TEXT NOT NULL DEFAULT '{}'"));
    defs.push(("updated_at".to_string(), TEXT));
    defs
}

fn ledger_column_names() -> Vec<String> {
    ledger_column_defs().into_iter().map(|(c, _)| c).collect()
}

fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    let ledger_cols = ledger_column_defs()
        .iter()
        .map(|(c, decl)| format!("  {c} {decl}"))
        .collect::<Vec<_>>()
        .join(",\n");
    let grid_cols = grid_column_names()
        .iter()
        .map(|c| format!("  {c} INTEGER NOT NULL DEFAULT 0"))
        .collect::<Vec<_>>()
        .join(",\n");

    conn.execute_batch(&format!(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS ledger (
  id INTEGER PRIMARY KEY CHECK (id = 1),
{ledger_cols}
);

CREATE TABLE IF NOT EXISTS idle_logs (
  seq INTEGER PRIMARY KEY,
  crane TEXT NOT NULL,
  start_time TEXT NOT NULL,
  end_time TEXT NOT NULL,
  reason TEXT NOT NULL,
  duration_minutes INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS hourly_records (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  recorded_at TEXT NOT NULL,
  report_date TEXT NOT NULL,
  hour_label TEXT NOT NULL,
{grid_cols}
);

CREATE TABLE IF NOT EXISTS four_hour_reports (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  recorded_at TEXT NOT NULL,
  report_date TEXT NOT NULL,
  block_label TEXT NOT NULL,
  manual INTEGER NOT NULL DEFAULT 0,
{grid_cols}
);
"#
    ))
}

// Databases written before the draft inputs were persisted lack `draft_json`.
fn ensure_ledger_columns(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(ledger)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut cols: HashSet<String> = HashSet::new();
    for r in rows {
        cols.insert(r?);
    }

    for (name, decl) in ledger_column_defs() {
        if !cols.contains(&name) {
            conn.execute(&format!("ALTER TABLE ledger ADD COLUMN {name} {decl}"), [])?;
        }
    }
    Ok(())
}

fn load_ledger_row(conn: &Connection) -> rusqlite::Result<Option<LedgerState>> {
    let sql = format!(
        "SELECT {} FROM ledger WHERE id = 1",
        ledger_column_names().join(", ")
    );
    let result = conn.query_row(&sql, [], |row| {
        let mut state = LedgerState::default();
        state.plan.vessel_name = row.get(0)?;
        state.plan.berthed_date = row.get(1)?;
        state.plan.first_lift = row.get(2)?;
        state.plan.last_lift = row.get(3)?;

        let mut i = 4;
        for c in Category::PLANNED {
            state.plan.planned.set(c, clamp_count(row.get(i)?));
            i += 1;
        }
        for c in Category::PLANNED {
            state.plan.opening.set(c, clamp_count(row.get(i)?));
            i += 1;
        }
        for c in Category::ALL {
            *state.done.get_mut(c) = clamp_count(row.get(i)?);
            i += 1;
        }

        let last_hour: String = row.get(i)?;
        let block: String = row.get(i + 1)?;
        let window_json: String = row.get(i + 2)?;
        let draft_json: String = row.get(i + 3)?;
        state.hour = HourPointer::select(&last_hour);
        state.block = FourHourBlock::select(&block);
        state.window = serde_json::from_str(&window_json).unwrap_or_else(|err| {
            warn!("stored rolling window unreadable, starting empty: {err}");
            RollingWindow::default()
        });
        state.draft = serde_json::from_str(&draft_json).unwrap_or_else(|err| {
            warn!("stored draft unreadable, starting empty: {err}");
            MoveGrid::default()
        });
        Ok(state)
    });

    match result {
        Ok(state) => Ok(Some(state)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(err) => Err(err),
    }
}

fn load_idle_log(conn: &Connection) -> rusqlite::Result<IdleLog> {
    let mut stmt = conn.prepare(
        "SELECT crane, start_time, end_time, reason FROM idle_logs ORDER BY seq",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut entries = Vec::new();
    for r in rows {
        let (crane, start_time, end_time, reason) = r?;
        let Some(crane) = Position::parse(&crane) else {
            warn!("skipping idle entry with unknown crane {crane:?}");
            continue;
        };
        match IdleEntry::new(crane, &start_time, &end_time, &reason) {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!("skipping unreadable idle entry: {err}"),
        }
    }
    Ok(IdleLog::from_entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hourly::{commit_hour, compute_4h_auto, compute_4h_manual, stage_hour};

    fn busy_state() -> LedgerState {
        let mut s = LedgerState::default();
        s.plan.vessel_name = "CMA CGM TAGE".into();
        s.plan.berthed_date = "01/02/2026 @ 22h15".into();
        s.plan.planned.load = 687;
        s.plan.opening.discharge = 14;

        let mut g = MoveGrid::default();
        g.set(Category::Load, Position::Fwd, 10);
        g.set(Category::HatchOpen, Position::Mid, 3);
        commit_hour(&mut s, &stage_hour(&g));
        s.draft.set(Category::Discharge, Position::Aft, 4);
        s.block = FourHourBlock::select("18h00-22h00");
        s.idle_log
            .add_entry(Position::Aft, "23h50", "00h10", "Waiting, vessel ops")
            .unwrap();
        s.idle_log
            .add_entry(Position::Fwd, "01:00", "01:45", "Lashing")
            .unwrap();
        s
    }

    #[test]
    fn empty_database_loads_factory_state() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.load().unwrap(), LedgerState::default());
    }

    #[test]
    fn save_then_load_returns_same_state() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let state = busy_state();
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);

        // Second save replaces the idle rows rather than appending.
        let mut state = state;
        state.idle_log.delete_entries(&[0]);
        store.save(&state).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.idle_log.len(), 1);
        assert_eq!(loaded, state);
    }

    #[test]
    fn unknown_stored_labels_fall_back_to_first() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.save(&busy_state()).unwrap();
        store
            .conn
            .execute(
                "UPDATE ledger SET last_hour = '99h00', four_hour_block = '', rolling_window_json = 'not json'",
                [],
            )
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.hour, HourPointer::default());
        assert_eq!(loaded.block, FourHourBlock::default());
        assert!(loaded.window.is_empty());
        assert_eq!(loaded.done.load, 10);
    }

    #[test]
    fn oversized_stored_window_loads_capped() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let state = busy_state();
        store.save(&state).unwrap();
        let g = state.window.iter().next().copied().unwrap();
        let nine = serde_json::to_string(&vec![g; 9]).unwrap();
        store
            .conn
            .execute("UPDATE ledger SET rolling_window_json = ?1", [&nine])
            .unwrap();
        store
            .conn
            .execute(
                "INSERT INTO idle_logs (seq, crane, start_time, end_time, reason, duration_minutes) VALUES (9, 'MID', '7pm', '20:00', 'x', 60)",
                [],
            )
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.window.len(), crate::hourly::WINDOW_HOURS);
        assert_eq!(compute_4h_auto(&loaded.window).totals.load, 40);
        assert_eq!(loaded.idle_log, state.idle_log);
    }

    #[test]
    fn history_tables_append_in_order() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let s = busy_state();
        let g = s.window.iter().next().copied().unwrap();
        store
            .append_hourly_record("01/02/2026", HourPointer::default(), &g)
            .unwrap();
        store
            .append_hourly_record("01/02/2026", HourPointer::default().next(), &MoveGrid::default())
            .unwrap();
        store
            .append_four_hour_report("01/02/2026", s.block, &compute_4h_auto(&s.window))
            .unwrap();
        store
            .append_four_hour_report("01/02/2026", s.block, &compute_4h_manual(g))
            .unwrap();

        let hourly = store.list_hourly_records().unwrap();
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly[0].hour, "06h00 - 07h00");
        assert_eq!(hourly[0].grid, g);
        assert_eq!(hourly[1].hour, "07h00 - 08h00");

        let four = store.list_four_hour_reports().unwrap();
        assert_eq!(four.len(), 2);
        assert!(!four[0].manual);
        assert!(four[1].manual);
        assert_eq!(four[1].block, "18h00-22h00");
        assert_eq!(four[0].grid.get(Category::HatchOpen, Position::Mid), 3);

        assert_eq!(store.wipe_history().unwrap(), 4);
        assert!(store.list_hourly_records().unwrap().is_empty());
    }

    #[test]
    fn reopen_from_disk_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.db");
        let state = busy_state();
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.save(&state).unwrap();
        }
        let mut store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn old_ledger_table_gains_missing_columns() {
        let conn = Connection::open_in_memory().unwrap();
        let cols = ledger_column_defs()
            .into_iter()
            .filter(|(c, _)| c != "draft_json")
            .map(|(c, decl)| format!("{c} {decl}"))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute_batch(&format!(
            "CREATE TABLE ledger (id INTEGER PRIMARY KEY CHECK (id = 1), {cols});
             INSERT INTO ledger (id, vessel_name, done_load, last_hour) VALUES (1, 'OLD', 42, '10h00 - 11h00');"
        ))
        .unwrap();

        let mut store = SqliteStore::from_connection(conn).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.plan.vessel_name, "OLD");
        assert_eq!(loaded.done.load, 42);
        assert_eq!(loaded.hour.label(), "10h00 - 11h00");
        assert!(loaded.draft.is_empty());
    }
}
