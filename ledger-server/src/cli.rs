use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ledger_core::db::SqliteKvStore;
use ledger_core::store::KeyValueStore;
use ledger_kv::rest::RestKvClient;
use tracing::{info, warn};

#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-server", version, about = "Days since last incident, over HTTP")]
pub struct Args {
    /// Address to listen on.
    #[arg(long, env = "LEDGER_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// SQLite file used as the durable store.
    #[arg(long, env = "LEDGER_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// REST key-value service base URL. Takes precedence over --db-path.
    #[arg(long, env = "KV_REST_API_URL")]
    pub kv_url: Option<String>,

    #[arg(long, env = "KV_REST_API_TOKEN", hide_env_values = true)]
    pub kv_token: Option<String>,

    #[arg(long, default_value_t = 2000)]
    pub kv_timeout_ms: u64,
}

/// Build the configured durable store. Any construction failure means "not configured":
/// the ledger then runs on its in-memory fallback.
pub fn durable_store(args: &Args) -> Option<Box<dyn KeyValueStore>> {
    if let Some(url) = args.kv_url.as_deref() {
        let token = args.kv_token.as_deref().unwrap_or_default();
        return match RestKvClient::new(url, token) {
            Ok(client) => {
                info!(base_url = client.base_url(), "using KV REST durable store");
                let store: Box<dyn KeyValueStore> =
                    Box::new(client.with_timeout(Duration::from_millis(args.kv_timeout_ms)));
                Some(store)
            }
            Err(e) => {
                warn!(error = %e, details = ?e.details, "KV store unavailable; running on in-memory fallback");
                None
            }
        };
    }

    if let Some(path) = args.db_path.as_deref() {
        return match SqliteKvStore::open(path) {
            Ok(store) => {
                info!(path = %path.display(), "using SQLite durable store");
                let store: Box<dyn KeyValueStore> = Box::new(store);
                Some(store)
            }
            Err(e) => {
                warn!(error = %e, details = ?e.details, "SQLite store unavailable; running on in-memory fallback");
                None
            }
        };
    }

    warn!("no durable store configured; incidents will not survive a restart");
    None
}
