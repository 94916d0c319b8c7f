mod config;
mod domain;
mod monitor;
mod registry;
mod status;
mod storage;

use std::env;
use std::sync::Arc;

use config::Config;
use domain::AssetBalance;
use monitor::{LifecycleEvent, Monitor, MonitorConfig, MonitorEvent};
use status::{HttpStatusClient, HttpStatusClientConfig};
use storage::{KeyValueStore, MemoryStore, SqliteStore, SqliteStoreConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = parse_config_path();
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return;
        }
    };

    init_tracing(config.app.log_level.as_deref());

    let store: Arc<dyn KeyValueStore> = if env::args().any(|arg| arg == "--memory") {
        info!("Using in-memory store, nothing will be persisted");
        Arc::new(MemoryStore::new())
    } else {
        match SqliteStore::new(SqliteStoreConfig::from(&config.storage)).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(error = %e, path = %config.storage.path, "Failed to open store");
                return;
            }
        }
    };

    let client = match HttpStatusClient::new(HttpStatusClientConfig::from(&config.poll)) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to create status client");
            return;
        }
    };

    let monitor = Monitor::new(MonitorConfig::from(&config), client, store);
    info!(app = %config.app.name, env = %config.app.env, config = %config_path, "Monitor initialized");

    let (lifecycle_tx, lifecycle_rx) = mpsc::channel(8);

    tokio::spawn(log_events(monitor.clone()));
    tokio::spawn(console(monitor.clone(), lifecycle_tx.clone()));

    let ctrl_c_tx = lifecycle_tx;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(LifecycleEvent::Stop).await;
        }
    });

    if let Err(e) = monitor.run(lifecycle_rx).await {
        error!(error = %e, "Monitor error");
    }
}

/// Logs change notifications; stands in for a UI re-render.
async fn log_events(monitor: Monitor) {
    let mut events = monitor.subscribe();
    loop {
        match events.recv().await {
            Ok(MonitorEvent::StatsUpdated(id)) => debug!(bot = %id, "Stats refreshed"),
            Ok(event) => debug!(event = ?event, "Monitor event"),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Event listener lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Line-oriented console: add, delete, list, pause, resume, stats, quit.
async fn console(monitor: Monitor, lifecycle: mpsc::Sender<LifecycleEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("add") => match (parts.next(), parts.next()) {
                (Some(name), Some(url)) => match monitor.add_bot(name, url).await {
                    Ok(id) => println!("added {} ({})", name, id),
                    Err(e) => println!("error: {}", e),
                },
                _ => println!("usage: add <name> <url>"),
            },
            Some("delete") => {
                let index = parts.next().and_then(|n| n.parse::<usize>().ok());
                let id = match index {
                    Some(n) if n > 0 => monitor.bot_id_at(n - 1).await,
                    _ => None,
                };
                match id {
                    Some(id) => match monitor.delete_bot(id).await {
                        Ok(bot) => println!("deleted {}", bot.name),
                        Err(e) => println!("error: {}", e),
                    },
                    None => println!("usage: delete <n> (see list)"),
                }
            }
            Some("list") => print_bots(&monitor).await,
            Some("pause") => send(&lifecycle, LifecycleEvent::Pause).await,
            Some("resume") => send(&lifecycle, LifecycleEvent::Resume).await,
            Some("stats") => {
                let state = monitor.state().await;
                let stats = monitor.stats().await;
                println!("{} {:?} outstanding={}", state, stats, stats.polls_outstanding());
            }
            Some("quit") | Some("exit") => {
                send(&lifecycle, LifecycleEvent::Stop).await;
                break;
            }
            Some(other) => println!("unknown command: {}", other),
            None => {}
        }
    }
}

async fn send(lifecycle: &mpsc::Sender<LifecycleEvent>, event: LifecycleEvent) {
    if lifecycle.send(event).await.is_err() {
        warn!(event = ?event, "Monitor is no longer running");
    }
}

async fn print_bots(monitor: &Monitor) {
    let bots = monitor.list_bots().await;
    if bots.is_empty() {
        println!("no bots");
        return;
    }

    for (i, bot) in bots.iter().enumerate() {
        let summary = match &bot.stats {
            Some(stats) => format!(
                "spread {:.2}% | {} profit {:.8} | {} profit {:.2}",
                stats.spread_percent.unwrap_or_default() * 100.0,
                stats.asset,
                profit(stats.asset_balance()),
                stats.currency,
                profit(stats.currency_balance()),
            ),
            None => "no stats".to_string(),
        };
        let updated = bot
            .updated
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        let pending = if bot.pending_request { " (polling)" } else { "" };

        println!("{}. {} {} | {} | updated {}{}", i + 1, bot.name, bot.url, summary, updated, pending);
    }
}

fn profit(balance: Option<&AssetBalance>) -> f64 {
    balance.and_then(|b| b.profit).unwrap_or_default()
}
