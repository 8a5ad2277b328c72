use std::sync::Arc;

use clap::Parser;
use ledger_core::ledger::Ledger;
use ledger_server_lib::cli::{durable_store, Args};
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let ledger = Arc::new(Ledger::new(durable_store(&args)));
    ledger_server_lib::serve(args.bind, ledger, shutdown_signal()).await
}
