pub mod cli;
pub mod http;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use ledger_core::ledger::Ledger;
use tracing::info;

/// Serve the ledger until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    ledger: Arc<Ledger>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let make_svc = make_service_fn(move |_| {
        let ledger = ledger.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| http::handle(req, ledger.clone())))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(make_svc);
    info!(%addr, "ledger server listening");

    server.with_graceful_shutdown(shutdown).await?;
    info!("ledger server stopped");
    Ok(())
}
