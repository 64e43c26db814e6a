use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::error::TallyError;
use crate::export;
use crate::hourly::{
    commit_hour, compute_4h_auto, compute_4h_manual, reset_4h_window, reset_hour_inputs,
    select_block, select_hour, stage_hour, FourHourBlock, FourHourTotals, HourPointer,
};
use crate::idle::{IdleEntry, ListedIdleEntry};
use crate::ledger::{CumulativeView, LedgerState, PlanUpdate, VesselPlan};
use crate::model::{Category, CategoryTotals, MoveGrid, Position};
use crate::report::{render_4h, render_hourly, ReportHeader};
use crate::share::{share_link, Destination};
use crate::store::SqliteStore;

const PERSISTENCE_WARNING: &str = "persistence_write_failure";

#[derive(Clone)]
pub struct AppState {
    // Lock order: ledger, then store.
    ledger: Arc<Mutex<LedgerState>>,
    store: Arc<Mutex<SqliteStore>>,
    share: Arc<ShareDefaults>,
}

/// Destinations used when a share request names none.
#[derive(Clone, Debug, Default)]
pub struct ShareDefaults {
    pub whatsapp_number: Option<String>,
    pub group_url: Option<String>,
}

impl AppState {
    pub fn new(ledger: LedgerState, store: SqliteStore, share: ShareDefaults) -> Self {
        AppState {
            ledger: Arc::new(Mutex::new(ledger)),
            store: Arc::new(Mutex::new(store)),
            share: Arc::new(share),
        }
    }
}

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<&'static str>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

fn ok_json<T: Serialize>(data: T, warning: Option<&'static str>) -> Response {
    Json(OkResponse {
        ok: true,
        data: Some(data),
        warning,
    })
    .into_response()
}

fn err_json(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrResponse { ok: false, error })).into_response()
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/ledger", get(get_ledger))
        .route("/plan", post(post_plan).options(options_ok))
        .route("/hour/draft", post(post_hour_draft).options(options_ok))
        .route("/hour/select", post(post_hour_select).options(options_ok))
        .route("/hour/commit", post(post_hour_commit).options(options_ok))
        .route("/hour/reset", post(post_hour_reset).options(options_ok))
        .route("/four_hour", get(get_four_hour))
        .route("/four_hour/select", post(post_block_select).options(options_ok))
        .route("/four_hour/report", post(post_four_hour_report).options(options_ok))
        .route("/four_hour/reset", post(post_four_hour_reset).options(options_ok))
        .route("/idle", get(get_idle).post(post_idle).options(options_ok))
        .route("/idle/delete", post(post_idle_delete).options(options_ok))
        .route("/share", post(post_share).options(options_ok))
        .route("/reset", post(post_master_reset).options(options_ok))
        .route("/save", post(post_save).options(options_ok))
        .route("/history/wipe", post(post_history_wipe).options(options_ok))
        .route("/export/json", get(get_export_json))
        .route("/import/json", post(post_import_json).options(options_ok))
        .route("/export/idle.csv", get(get_export_idle_csv))
        .route("/export/hourly.csv", get(get_export_hourly_csv))
        .route("/export/four_hour.csv", get(get_export_four_hour_csv))
        .with_state(state)
        .layer(cors)
}

/// Persist the in-memory ledger. Failure keeps memory as is and yields a warning for the client.
async fn persist(state: &AppState, ledger: &LedgerState) -> Option<&'static str> {
    let mut store = state.store.lock().await;
    match store.save(ledger) {
        Ok(()) => None,
        Err(err) => {
            error!("save ledger failed: {err}");
            Some(PERSISTENCE_WARNING)
        }
    }
}

fn default_report_date() -> String {
    chrono::Local::now().format("%d/%m/%Y").to_string()
}

async fn options_ok() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "tally_core",
            version: env!("CARGO_PKG_VERSION"),
        }),
        warning: None,
    })
}

#[derive(Serialize)]
struct LedgerSnapshot {
    plan: VesselPlan,
    done: CategoryTotals,
    effective_done: CategoryTotals,
    cumulative: CumulativeView,
    hour: HourPointer,
    hour_labels: Vec<String>,
    block: FourHourBlock,
    block_labels: Vec<String>,
    window_hours: usize,
    draft: MoveGrid,
    idle_count: usize,
    idle_minutes: u32,
}

async fn get_ledger(State(state): State<AppState>) -> Response {
    let mut ledger = state.ledger.lock().await;
    let plan_before = ledger.plan.clone();
    let cumulative = ledger.cumulative_view();

    let mut effective_done = CategoryTotals::default();
    for c in Category::ALL {
        *effective_done.get_mut(c) = ledger.effective_done(c);
    }
    let snapshot = LedgerSnapshot {
        plan: ledger.get_plan(),
        done: ledger.done,
        effective_done,
        cumulative,
        hour: ledger.hour,
        hour_labels: HourPointer::labels(),
        block: ledger.block,
        block_labels: FourHourBlock::labels(),
        window_hours: ledger.window.len(),
        draft: ledger.draft,
        idle_count: ledger.idle_log.len(),
        idle_minutes: ledger.idle_log.total_minutes(),
    };

    // Reading remaining figures may have raised the plan.
    let warning = if ledger.plan != plan_before {
        persist(&state, &ledger).await
    } else {
        None
    };
    ok_json(snapshot, warning)
}

async fn post_plan(State(state): State<AppState>, Json(req): Json<PlanUpdate>) -> Response {
    let mut ledger = state.ledger.lock().await;
    let plan = ledger.update_plan(req);
    let warning = persist(&state, &ledger).await;
    ok_json(plan, warning)
}

async fn post_hour_draft(State(state): State<AppState>, Json(grid): Json<MoveGrid>) -> Response {
    let mut ledger = state.ledger.lock().await;
    ledger.draft = grid;
    let warning = persist(&state, &ledger).await;
    ok_json(stage_hour(&grid), warning)
}

#[derive(Deserialize)]
struct SelectRequest {
    label: String,
}

async fn post_hour_select(State(state): State<AppState>, Json(req): Json<SelectRequest>) -> Response {
    let mut ledger = state.ledger.lock().await;
    let hour = select_hour(&mut ledger, &req.label);
    let warning = persist(&state, &ledger).await;
    ok_json(hour, warning)
}

#[derive(Deserialize)]
struct HourCommitRequest {
    /// Falls back to the stored draft.
    #[serde(default)]
    grid: Option<MoveGrid>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Serialize)]
struct HourCommitResult {
    done: CategoryTotals,
    committed_hour: HourPointer,
    next_hour: HourPointer,
    report: String,
}

async fn post_hour_commit(
    State(state): State<AppState>,
    Json(req): Json<HourCommitRequest>,
) -> Response {
    let report_date = req.date.unwrap_or_else(default_report_date);

    let mut ledger = state.ledger.lock().await;
    let grid = req.grid.unwrap_or(ledger.draft);
    if grid.is_empty() {
        info!("committing {} with no moves", ledger.hour.label());
    }
    let snapshot = stage_hour(&grid);
    let commit = commit_hour(&mut ledger, &snapshot);
    let cumulative = ledger.cumulative_view();
    let header = ReportHeader::new(&ledger.plan, report_date.clone());
    let report = render_hourly(
        &header,
        &cumulative,
        &snapshot,
        &commit.committed.label(),
        &ledger.idle_log,
    );
    info!(
        "committed {} (load {}, discharge {})",
        commit.committed.label(),
        snapshot.totals.load,
        snapshot.totals.discharge
    );

    // History only records hours the stored ledger row has counted.
    let mut warning = persist(&state, &ledger).await;
    if warning.is_none() {
        let mut store = state.store.lock().await;
        if let Err(err) = store.append_hourly_record(&report_date, commit.committed, &grid) {
            error!("append_hourly_record failed: {err}");
            warning = Some(PERSISTENCE_WARNING);
        }
    } else {
        warn!("hourly record for {} not appended", commit.committed.label());
    }

    ok_json(
        HourCommitResult {
            done: commit.done,
            committed_hour: commit.committed,
            next_hour: commit.next,
            report,
        },
        warning,
    )
}

async fn post_hour_reset(State(state): State<AppState>) -> Response {
    let mut ledger = state.ledger.lock().await;
    let hour = reset_hour_inputs(&mut ledger);
    let warning = persist(&state, &ledger).await;
    ok_json(hour, warning)
}

#[derive(Serialize)]
struct FourHourStatus {
    block: FourHourBlock,
    totals: FourHourTotals,
}

async fn get_four_hour(State(state): State<AppState>) -> Response {
    let ledger = state.ledger.lock().await;
    ok_json(
        FourHourStatus {
            block: ledger.block,
            totals: compute_4h_auto(&ledger.window),
        },
        None,
    )
}

async fn post_block_select(State(state): State<AppState>, Json(req): Json<SelectRequest>) -> Response {
    let mut ledger = state.ledger.lock().await;
    let block = select_block(&mut ledger, &req.label);
    let warning = persist(&state, &ledger).await;
    ok_json(block, warning)
}

#[derive(Deserialize)]
struct FourHourReportRequest {
    /// Replaces the automatic window sums. Informational only; the ledger is not touched.
    #[serde(default)]
    manual: Option<MoveGrid>,
    #[serde(default)]
    block: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Serialize)]
struct FourHourReportResult {
    block: FourHourBlock,
    totals: FourHourTotals,
    report: String,
}

async fn post_four_hour_report(
    State(state): State<AppState>,
    Json(req): Json<FourHourReportRequest>,
) -> Response {
    let report_date = req.date.unwrap_or_else(default_report_date);

    let mut ledger = state.ledger.lock().await;
    if let Some(label) = req.block.as_deref() {
        select_block(&mut ledger, label);
    }
    let totals = match req.manual {
        Some(grid) => compute_4h_manual(grid),
        None => {
            if ledger.window.is_empty() {
                info!("4-hour report for {} with no committed hours", ledger.block.label());
            }
            compute_4h_auto(&ledger.window)
        }
    };
    let cumulative = ledger.cumulative_view();
    let header = ReportHeader::new(&ledger.plan, report_date.clone());
    let report = render_4h(
        &header,
        &cumulative,
        &totals,
        &ledger.block.label(),
        &ledger.idle_log,
    );

    let mut warning = persist(&state, &ledger).await;
    if warning.is_none() {
        let mut store = state.store.lock().await;
        if let Err(err) = store.append_four_hour_report(&report_date, ledger.block, &totals) {
            error!("append_four_hour_report failed: {err}");
            warning = Some(PERSISTENCE_WARNING);
        }
    } else {
        warn!("4-hour report for {} not appended", ledger.block.label());
    }

    ok_json(
        FourHourReportResult {
            block: ledger.block,
            totals,
            report,
        },
        warning,
    )
}

async fn post_four_hour_reset(State(state): State<AppState>) -> Response {
    let mut ledger = state.ledger.lock().await;
    reset_4h_window(&mut ledger);
    let warning = persist(&state, &ledger).await;
    ok_json(compute_4h_auto(&ledger.window), warning)
}

async fn get_idle(State(state): State<AppState>) -> Response {
    let ledger = state.ledger.lock().await;
    let entries: Vec<ListedIdleEntry> = ledger.idle_log.list_entries();
    ok_json(entries, None)
}

#[derive(Deserialize)]
struct IdleAddRequest {
    crane: String,
    start: String,
    end: String,
    #[serde(default)]
    reason: String,
}

async fn post_idle(State(state): State<AppState>, Json(req): Json<IdleAddRequest>) -> Response {
    let Some(crane) = Position::parse(&req.crane) else {
        return err_json(StatusCode::BAD_REQUEST, "invalid_crane");
    };

    let mut ledger = state.ledger.lock().await;
    let entry: IdleEntry = match ledger
        .idle_log
        .add_entry(crane, &req.start, &req.end, &req.reason)
    {
        Ok(e) => e,
        Err(err) => return err_json(StatusCode::BAD_REQUEST, err.code()),
    };
    let warning = persist(&state, &ledger).await;
    ok_json(entry, warning)
}

#[derive(Deserialize)]
struct IdleDeleteRequest {
    indices: Vec<usize>,
}

#[derive(Serialize)]
struct IdleDeleteResult {
    deleted: usize,
    remaining: usize,
}

async fn post_idle_delete(
    State(state): State<AppState>,
    Json(req): Json<IdleDeleteRequest>,
) -> Response {
    let mut ledger = state.ledger.lock().await;
    let deleted = ledger.idle_log.delete_entries(&req.indices);
    let warning = if deleted > 0 {
        persist(&state, &ledger).await
    } else {
        None
    };
    ok_json(
        IdleDeleteResult {
            deleted,
            remaining: ledger.idle_log.len(),
        },
        warning,
    )
}

#[derive(Deserialize)]
struct ShareRequest {
    text: String,
    #[serde(default)]
    destination: Option<Destination>,
}

#[derive(Serialize)]
struct ShareResult {
    url: String,
}

async fn post_share(State(state): State<AppState>, Json(req): Json<ShareRequest>) -> Response {
    let dest = req.destination.or_else(|| {
        state
            .share
            .whatsapp_number
            .clone()
            .map(Destination::Number)
            .or_else(|| state.share.group_url.clone().map(Destination::Group))
    });
    let Some(dest) = dest else {
        return err_json(StatusCode::BAD_REQUEST, "missing_destination");
    };
    ok_json(
        ShareResult {
            url: share_link(&req.text, &dest),
        },
        None,
    )
}

async fn post_master_reset(State(state): State<AppState>) -> Response {
    let mut ledger = state.ledger.lock().await;
    ledger.master_reset();
    info!("master reset");
    let warning = persist(&state, &ledger).await;
    ok_json(ledger.get_plan(), warning)
}

async fn post_save(State(state): State<AppState>) -> Response {
    let ledger = state.ledger.lock().await;
    let mut store = state.store.lock().await;
    match store.save(&ledger) {
        Ok(()) => ok_json(true, None),
        Err(err) => {
            error!("save ledger failed: {err}");
            err_json(StatusCode::INTERNAL_SERVER_ERROR, err.code())
        }
    }
}

async fn post_history_wipe(State(state): State<AppState>) -> Response {
    let mut store = state.store.lock().await;
    match store.wipe_history() {
        Ok(n) => ok_json(n, None),
        Err(err) => {
            error!("wipe_history failed: {err}");
            err_json(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
    }
}

async fn get_export_json(State(state): State<AppState>) -> Response {
    let ledger = state.ledger.lock().await;
    match export::backup_json(&ledger) {
        Ok(json) => (
            StatusCode::OK,
            [("content-type", "application/json; charset=utf-8")],
            json,
        )
            .into_response(),
        Err(err) => {
            error!("backup_json failed: {err}");
            err_json(StatusCode::INTERNAL_SERVER_ERROR, err.code())
        }
    }
}

async fn post_import_json(State(state): State<AppState>, body: String) -> Response {
    let restored = match export::restore_json(&body) {
        Ok(s) => s,
        Err(err @ TallyError::Backup(_)) => {
            return err_json(StatusCode::BAD_REQUEST, err.code());
        }
        Err(err) => {
            error!("restore_json failed: {err}");
            return err_json(StatusCode::INTERNAL_SERVER_ERROR, err.code());
        }
    };

    let mut ledger = state.ledger.lock().await;
    *ledger = restored;
    info!("ledger restored from backup ({})", ledger.plan.vessel_name);
    let warning = persist(&state, &ledger).await;
    ok_json(ledger.get_plan(), warning)
}

async fn get_export_idle_csv(State(state): State<AppState>) -> Response {
    let ledger = state.ledger.lock().await;
    csv_response(export::idle_logs_csv(ledger.idle_log.entries()))
}

async fn get_export_hourly_csv(State(state): State<AppState>) -> Response {
    let mut store = state.store.lock().await;
    match store.list_hourly_records() {
        Ok(records) => csv_response(export::hourly_records_csv(&records)),
        Err(err) => {
            error!("list_hourly_records failed: {err}");
            err_json(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
    }
}

async fn get_export_four_hour_csv(State(state): State<AppState>) -> Response {
    let mut store = state.store.lock().await;
    match store.list_four_hour_reports() {
        Ok(records) => csv_response(export::four_hour_reports_csv(&records)),
        Err(err) => {
            error!("list_four_hour_reports failed: {err}");
            err_json(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
    }
}

fn csv_response(csv: String) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/csv; charset=utf-8")],
        csv,
    )
        .into_response()
}
