//! Operator tool for the aggregation core.
//! Usage:
//!   moviemate entity <movie|tv> <tmdb_id>
//!   moviemate watchlist
//!   moviemate toggle <tmdb_id>
//!   moviemate chat <message...>
//! Reads configuration from the environment (.env supported).

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use moviemate::backend::BackendClient;
use moviemate::chat::ChatGateway;
use moviemate::tmdb::TmdbClient;
use moviemate::view::DetailView;
use moviemate::watchlist::MembershipReconciler;
use moviemate::{Config, EntityRef, Executor, MediaAggregator, MediaKind};
use serde_json::json;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn report_env_file(env_file: &Result<PathBuf, dotenvy::Error>) {
    match env_file {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }
}

fn usage() -> anyhow::Error {
    anyhow!(
        "Usage: moviemate entity <movie|tv> <id> | watchlist | toggle <id> | chat <message...>"
    )
}

fn parse_id(raw: Option<&String>) -> Result<i64> {
    let raw = raw.ok_or_else(usage)?;
    raw.trim()
        .parse()
        .with_context(|| format!("'{}' is not a TMDB id", raw))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancels `token` on Ctrl+C so in-flight calls settle as cancelled.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling outstanding requests");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before the subscriber reads RUST_LOG, report it after.
    let env_file = dotenv();
    init_tracing();
    report_env_file(&env_file);

    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().ok_or_else(usage)?;
    let config = Config::from_env()?;
    let executor = Executor::reqwest()?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match command.as_str() {
        "entity" => {
            let kind: MediaKind = args.get(1).ok_or_else(usage)?.parse()?;
            let id = parse_id(args.get(2))?;
            let mut view = DetailView::from_config(&config, executor);
            let teardown = view.cancel_handle();
            let interrupted = cancel.clone();
            tokio::spawn(async move {
                interrupted.cancelled().await;
                teardown.cancel();
            });
            let record = view.load(EntityRef { id, kind }).await?;
            if let Some(image) = view.rotation().subscribe().borrow().as_deref() {
                info!("Background rotation starts at {}", image);
            }
            print_json(&*record)
        }
        "watchlist" => {
            let backend = Arc::new(BackendClient::from_config(&config, executor.clone())?);
            let reconciler = MembershipReconciler::new(backend, config.session_token.clone());
            let ids = reconciler.refresh(&cancel).await?;
            let aggregator =
                MediaAggregator::new(Arc::new(TmdbClient::from_config(&config, executor)));
            let items = aggregator.hydrate_watchlist(&ids, &cancel).await;
            print_json(&json!({ "count": items.len(), "items": items }))
        }
        "toggle" => {
            let id = parse_id(args.get(1))?;
            let backend = Arc::new(BackendClient::from_config(&config, executor)?);
            let reconciler = MembershipReconciler::new(backend, config.session_token.clone());
            if let Err(e) = reconciler.refresh(&cancel).await {
                warn!("Could not read current watchlist, assuming absent: {}", e);
            }
            let entity = EntityRef::movie(id);
            let status = reconciler.toggle(entity, &cancel).await?;
            print_json(&json!({ "id": id, "status": status }))
        }
        "chat" => {
            let text = args[1..].join(" ");
            let mut gateway = ChatGateway::from_config(&config, executor)?;
            let status = gateway.probe(&cancel).await?;
            if !status.is_online() {
                warn!("Chat backend looks offline, sending anyway");
            }
            // Failures are already in the transcript as user-facing text.
            if let Err(e) = gateway.send(&text, &cancel).await {
                warn!("Chat turn failed: {}", e);
            }
            print_json(&gateway.transcript())
        }
        _ => Err(usage()),
    }
}
