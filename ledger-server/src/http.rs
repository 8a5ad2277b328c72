//! Request routing for the incident endpoints.

use std::convert::Infallible;
use std::sync::Arc;

use hyper::body::{Bytes, HttpBody};
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use ledger_core::domain::{category_options, IncidentForm};
use ledger_core::ledger::Ledger;
use serde::Serialize;
use tracing::{error, info};

/// Largest accepted incident body.
pub const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Debug)]
enum BodyError {
    TooLarge,
    Read(hyper::Error),
}

/// Collect the body, giving up as soon as it exceeds `limit` bytes.
async fn read_limited(req: Request<Body>, limit: usize) -> Result<Bytes, BodyError> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(BodyError::TooLarge);
    }

    let mut body = req.into_body();
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    ok: bool,
    durable: &'static str,
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    let (status, bytes) = match serde_json::to_vec(value) {
        Ok(b) => (status, b),
        Err(e) => {
            error!(error = %e, "failed to encode response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"Internal error"}"#.to_vec(),
            )
        }
    };
    let mut resp = Response::new(Body::from(bytes));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

fn error_json(status: StatusCode, message: &str) -> Response<Body> {
    json(status, &ErrorBody { error: message })
}

async fn get_incident(ledger: Arc<Ledger>) -> Response<Body> {
    match tokio::task::spawn_blocking(move || ledger.status()).await {
        Ok(status) => json(StatusCode::OK, &status),
        Err(e) => {
            error!(error = %e, "status task failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

async fn post_incident(req: Request<Body>, ledger: Arc<Ledger>) -> Response<Body> {
    let body = match read_limited(req, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(BodyError::TooLarge) => {
            info!(limit = MAX_BODY_BYTES, "rejected oversized incident body");
            return error_json(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
        Err(BodyError::Read(e)) => {
            info!(error = %e, "failed to read request body");
            return error_json(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    // An empty body is a form with nothing in it; validation reports the missing details.
    let form: IncidentForm = if body.iter().all(u8::is_ascii_whitespace) {
        IncidentForm::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(f) => f,
            Err(e) => {
                info!(error = %e, "rejected malformed incident body");
                return error_json(StatusCode::BAD_REQUEST, "Invalid JSON body");
            }
        }
    };

    match tokio::task::spawn_blocking(move || ledger.record_incident(&form)).await {
        Ok(Ok(recorded)) => json(StatusCode::OK, &recorded),
        Ok(Err(e)) if e.is_validation() => error_json(StatusCode::BAD_REQUEST, &e.message),
        Ok(Err(e)) => {
            error!(error = %e, details = ?e.details, "record incident failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
        Err(e) => {
            error!(error = %e, "record task failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

pub async fn handle(req: Request<Body>, ledger: Arc<Ledger>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = match (&method, path.as_str()) {
        (&Method::GET, "/incident") => get_incident(ledger).await,
        (&Method::POST, "/incident") => post_incident(req, ledger).await,
        (&Method::GET, "/health") => json(
            StatusCode::OK,
            &HealthBody {
                ok: true,
                durable: ledger.durable_backend(),
            },
        ),
        (&Method::GET, "/categories") => json(StatusCode::OK, &category_options()),
        (_, "/incident" | "/health" | "/categories") => {
            error_json(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }
        _ => error_json(StatusCode::NOT_FOUND, "Not found"),
    };

    info!(%method, path = %path, status = resp.status().as_u16(), "handled request");
    Ok(resp)
}
