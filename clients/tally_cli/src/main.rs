use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

const MOVE_POSITIONS: [&str; 4] = ["FWD", "MID", "AFT", "POOP"];
const HATCH_POSITIONS: [&str; 3] = ["FWD", "MID", "AFT"];

#[derive(Parser, Debug)]
#[command(name = "tally_cli", version)]
struct Args {
    /// Core base URL, e.g. http://127.0.0.1:17700
    #[arg(long, default_value = "http://127.0.0.1:17700")]
    core_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show vessel, current hour and cumulative plan/done/remaining.
    Status,

    /// Edit vessel details, plan targets or opening balances.
    Plan(PlanArgs),

    /// Commit one hour of moves and print the hourly report.
    ///
    /// Counts are comma-separated per position: FWD,MID,AFT,POOP (hatch: FWD,MID,AFT).
    /// Omitted categories count as zero. With no counts at all, the stored draft is committed.
    Commit {
        #[command(flatten)]
        moves: MoveArgs,
        /// Report date, defaults to today on the core.
        #[arg(long)]
        date: Option<String>,
    },

    /// Nothing happened this hour: move to the next hour label without adding totals.
    Skip,

    /// Select the hour label the next commit is recorded under, e.g. "14h00 - 15h00".
    SelectHour { label: String },

    /// Print the 4-hour report for a block, e.g. "10h00-14h00".
    FourHour {
        #[arg(long)]
        block: Option<String>,
        #[arg(long)]
        date: Option<String>,
        /// Use these counts instead of the last committed hours.
        #[command(flatten)]
        manual: MoveArgs,
    },

    /// Clear the rolling 4-hour window. Cumulative totals are kept.
    ResetFourHour,

    #[command(subcommand)]
    Idle(IdleCommand),

    /// Build a WhatsApp link for a report file (or stdin when no file is given).
    Share {
        file: Option<PathBuf>,
        /// Phone number, country code first.
        #[arg(long)]
        number: Option<String>,
        /// Pre-shared group invite link.
        #[arg(long, conflicts_with = "number")]
        group_url: Option<String>,
    },

    /// Download the full ledger as JSON.
    Backup {
        /// Defaults to crane-tally-<timestamp>.json in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Replace the ledger with a JSON backup.
    Restore { file: PathBuf },

    /// Wipe counters, plan, idle log and the 4-hour window.
    Reset {
        /// Required; the reset cannot be undone.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(clap::Args, Debug, Default)]
struct MoveArgs {
    #[arg(long)]
    load: Option<String>,
    #[arg(long)]
    discharge: Option<String>,
    #[arg(long)]
    restow_load: Option<String>,
    #[arg(long)]
    restow_disch: Option<String>,
    #[arg(long)]
    hatch_open: Option<String>,
    #[arg(long)]
    hatch_close: Option<String>,
}

#[derive(clap::Args, Debug, Serialize)]
struct PlanArgs {
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    vessel_name: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    berthed_date: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    first_lift: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    last_lift: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    planned_load: Option<i64>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    planned_discharge: Option<i64>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    planned_restow_load: Option<i64>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    planned_restow_disch: Option<i64>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    opening_load: Option<i64>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    opening_discharge: Option<i64>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    opening_restow_load: Option<i64>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    opening_restow_disch: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum IdleCommand {
    /// Log a delay. Times accept 12h30, 12:30 or 1230.
    Add {
        #[arg(long)]
        crane: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Newest first, with the index used by `idle delete`.
    List,
    Delete { indices: Vec<usize> },
}

#[derive(Deserialize)]
struct OkResponse<T> {
    ok: bool,
    data: Option<T>,
    #[serde(default)]
    warning: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct Core {
    client: Client,
    base: String,
}

impl Core {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let res = self.client.get(self.url(path)).send().await?;
        unwrap_envelope(res).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> anyhow::Result<T> {
        let res = self.client.post(self.url(path)).json(body).send().await?;
        unwrap_envelope(res).await
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(res: reqwest::Response) -> anyhow::Result<T> {
    let status = res.status();
    let body: OkResponse<T> = res
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("http_{}: {e}", status.as_u16()))?;
    if !body.ok {
        anyhow::bail!(body.error.unwrap_or_else(|| "not_ok".to_string()));
    }
    if let Some(w) = body.warning {
        warn!("core: {w} (changes kept in memory; retry with POST /save)");
    }
    body.data.ok_or_else(|| anyhow::anyhow!("missing_data"))
}

/// `"10,5,0,0"` -> `[10, 5, 0, 0]`. Fewer values than positions are padded with zero.
fn parse_counts(raw: &str, positions: usize) -> anyhow::Result<Vec<i64>> {
    let mut out = raw
        .split(',')
        .map(|s| s.trim())
        .map(|s| if s.is_empty() { Ok(0) } else { s.parse::<i64>() })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("bad count list '{raw}': {e}"))?;
    if out.len() > positions {
        anyhow::bail!("'{raw}' has {} values, expected at most {positions}", out.len());
    }
    out.resize(positions, 0);
    Ok(out)
}

impl MoveArgs {
    fn is_empty(&self) -> bool {
        self.categories().iter().all(|(_, v, _)| v.is_none())
    }

    fn categories(&self) -> [(&'static str, &Option<String>, &'static [&'static str]); 6] {
        [
            ("load", &self.load, &MOVE_POSITIONS),
            ("discharge", &self.discharge, &MOVE_POSITIONS),
            ("restow_load", &self.restow_load, &MOVE_POSITIONS),
            ("restow_disch", &self.restow_disch, &MOVE_POSITIONS),
            ("hatch_open", &self.hatch_open, &HATCH_POSITIONS),
            ("hatch_close", &self.hatch_close, &HATCH_POSITIONS),
        ]
    }

    /// Grid in the core's wire shape: `{"load": {"FWD": 10, ...}, ...}`.
    fn to_grid(&self) -> anyhow::Result<Value> {
        let mut grid = Map::new();
        for (key, raw, positions) in self.categories() {
            let Some(raw) = raw else { continue };
            let counts = parse_counts(raw, positions.len())?;
            let cells: Map<String, Value> = positions
                .iter()
                .zip(counts)
                .map(|(p, v)| (p.to_string(), json!(v)))
                .collect();
            grid.insert(key.to_string(), Value::Object(cells));
        }
        Ok(Value::Object(grid))
    }
}

#[derive(Deserialize)]
struct CumulativeRow {
    category: String,
    plan: u64,
    done: u64,
    remaining: u64,
}

#[derive(Deserialize)]
struct Cumulative {
    rows: Vec<CumulativeRow>,
}

#[derive(Deserialize)]
struct Plan {
    vessel_name: String,
}

#[derive(Deserialize)]
struct LedgerSnapshot {
    plan: Plan,
    cumulative: Cumulative,
    hour: String,
    block: String,
    window_hours: usize,
    idle_count: usize,
    idle_minutes: u32,
}

#[derive(Deserialize)]
struct ReportResult {
    report: String,
}

#[derive(Deserialize)]
struct IdleEntry {
    crane: String,
    start_time: String,
    end_time: String,
    duration_minutes: u32,
    reason: String,
}

#[derive(Deserialize)]
struct ListedIdle {
    index: usize,
    #[serde(flatten)]
    entry: IdleEntry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let core = Core {
        client: Client::new(),
        base: args.core_url.trim_end_matches('/').to_string(),
    };

    match args.command {
        Command::Status => {
            let s: LedgerSnapshot = core.get("/ledger").await?;
            println!("MV {}", s.plan.vessel_name);
            println!("next hour: {}   block: {}   window: {}h", s.hour, s.block, s.window_hours);
            println!("idle: {} entries, {} min", s.idle_count, s.idle_minutes);
            println!("{:<14}{:>7}{:>7}{:>7}", "", "plan", "done", "remain");
            for r in s.cumulative.rows {
                println!("{:<14}{:>7}{:>7}{:>7}", r.category, r.plan, r.done, r.remaining);
            }
        }
        Command::Plan(plan) => {
            let body = serde_json::to_value(&plan)?;
            let _: Value = core.post("/plan", &body).await?;
            info!("plan updated");
        }
        Command::Commit { moves, date } => {
            let mut body = json!({ "date": date });
            if !moves.is_empty() {
                body["grid"] = moves.to_grid()?;
            }
            let r: ReportResult = core.post("/hour/commit", &body).await?;
            println!("{}", r.report);
        }
        Command::Skip => {
            let hour: String = core.post("/hour/reset", &json!({})).await?;
            info!("next hour: {hour}");
        }
        Command::SelectHour { label } => {
            let hour: String = core.post("/hour/select", &json!({ "label": label })).await?;
            info!("next hour: {hour}");
        }
        Command::FourHour {
            block,
            date,
            manual,
        } => {
            let mut body = json!({ "block": block, "date": date });
            if !manual.is_empty() {
                body["manual"] = manual.to_grid()?;
            }
            let r: ReportResult = core.post("/four_hour/report", &body).await?;
            println!("{}", r.report);
        }
        Command::ResetFourHour => {
            let _: Value = core.post("/four_hour/reset", &json!({})).await?;
            info!("4-hour window cleared");
        }
        Command::Idle(IdleCommand::Add {
            crane,
            start,
            end,
            reason,
        }) => {
            let body = json!({ "crane": crane, "start": start, "end": end, "reason": reason });
            let e: IdleEntry = core.post("/idle", &body).await?;
            info!("logged {} {}-{} ({} min)", e.crane, e.start_time, e.end_time, e.duration_minutes);
        }
        Command::Idle(IdleCommand::List) => {
            let entries: Vec<ListedIdle> = core.get("/idle").await?;
            for ListedIdle { index, entry: e } in entries {
                println!(
                    "[{index}] {} {} - {} ({} min) {}",
                    e.crane, e.start_time, e.end_time, e.duration_minutes, e.reason
                );
            }
        }
        Command::Idle(IdleCommand::Delete { indices }) => {
            let r: Value = core.post("/idle/delete", &json!({ "indices": indices })).await?;
            info!("deleted {}", r["deleted"]);
        }
        Command::Share {
            file,
            number,
            group_url,
        } => {
            let text = match file {
                Some(path) => std::fs::read_to_string(path)?,
                None => std::io::read_to_string(std::io::stdin())?,
            };
            let destination = match (number, group_url) {
                (Some(n), _) => json!({ "kind": "number", "value": n }),
                (None, Some(g)) => json!({ "kind": "group", "value": g }),
                (None, None) => Value::Null,
            };
            let r: Value = core
                .post("/share", &json!({ "text": text, "destination": destination }))
                .await?;
            println!("{}", r["url"].as_str().unwrap_or_default());
        }
        Command::Backup { out } => {
            let res = core.client.get(core.url("/export/json")).send().await?;
            if !res.status().is_success() {
                anyhow::bail!("http_{}", res.status().as_u16());
            }
            let body = res.text().await?;
            let out = out.unwrap_or_else(|| {
                PathBuf::from(format!(
                    "crane-tally-{}.json",
                    chrono::Local::now().format("%Y%m%d-%H%M")
                ))
            });
            std::fs::write(&out, body)?;
            info!("backup written to {}", out.display());
        }
        Command::Restore { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let res = core
                .client
                .post(core.url("/import/json"))
                .header("content-type", "application/json")
                .body(raw)
                .send()
                .await?;
            let _: Value = unwrap_envelope(res).await?;
            info!("ledger restored from {}", file.display());
        }
        Command::Reset { yes } => {
            if !yes {
                anyhow::bail!("refusing to reset without --yes");
            }
            let _: Value = core.post("/reset", &json!({})).await?;
            info!("ledger reset");
        }
    }
    Ok(())
}
