use clap::Parser;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};
use tracing::info;

mod error;
mod export;
mod hourly;
mod http;
mod idle;
mod ledger;
mod model;
mod report;
mod share;
mod store;

use http::{AppState, ShareDefaults};
use store::SqliteStore;

const DEFAULT_PORT: u16 = 17700;

#[derive(Parser, Debug)]
#[command(name = "tally_core", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:17700
    /// - ip (implies port 17700), e.g. 127.0.0.1
    /// - localhost or localhost:port
    #[arg(long, default_value = "127.0.0.1:17700")]
    listen: String,

    /// SQLite database path.
    #[arg(long, default_value = "./data/crane-tally.db")]
    db: PathBuf,

    /// Default WhatsApp number for share links (digits, country code first).
    #[arg(long)]
    whatsapp_number: Option<String>,

    /// Pre-shared WhatsApp group invite link, used when no number is configured.
    #[arg(long)]
    group_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_core=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    if let Some(parent) = args.db.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut store = SqliteStore::open(&args.db)?;
    let ledger = store.load()?;
    info!(
        "ledger loaded: vessel {:?}, next hour {}",
        ledger.plan.vessel_name,
        ledger.hour.label()
    );

    let state = AppState::new(
        ledger,
        store,
        ShareDefaults {
            whatsapp_number: args.whatsapp_number,
            group_url: args.group_url,
        },
    );
    let app = http::router(state);

    let addr = parse_listen(&args.listen)?;
    info!("Core listening on http://{addr}");
    info!("DB: {}", args.db.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    if let Some((host, port_str)) = input.rsplit_once(':') {
        let ip = if host == "localhost" {
            Some(IpAddr::from([127, 0, 0, 1]))
        } else {
            // Bare IP host, best effort (e.g. an IPv6 address without brackets).
            host.parse::<IpAddr>().ok()
        };
        if let Some(ip) = ip {
            let port: u16 = port_str.parse().map_err(|_| {
                anyhow::anyhow!(
                    "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                    input,
                    DEFAULT_PORT
                )
            })?;
            return Ok(SocketAddr::new(ip, port));
        }
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
