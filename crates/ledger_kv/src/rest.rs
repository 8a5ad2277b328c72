use std::time::Duration;

use ledger_core::error::AppError;
use ledger_core::store::KeyValueStore;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Client for an Upstash-style REST key-value service (the wire format Vercel KV exposes).
///
/// `GET {base}/get/{key}` and `POST {base}/set/{key}` with a bearer token; replies are
/// `{"result": ...}` on success and `{"error": "..."}` on failure.
#[derive(Debug, Clone)]
pub struct RestKvClient {
    base_url: String,
    token: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct KvReply {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

impl RestKvClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        let host = base_url
            .strip_prefix("https://")
            .or_else(|| base_url.strip_prefix("http://"));
        match host {
            Some(h) if !h.is_empty() && !h.contains(['?', '#']) => {}
            _ => {
                return Err(AppError::new(
                    "CONFIG_KV_URL_INVALID",
                    "KV REST URL must be an http(s) URL without query or fragment",
                )
                .with_details(format!("base_url={base_url}")))
            }
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::new(
                "CONFIG_KV_TOKEN_MISSING",
                "KV REST token is required",
            ));
        }

        Ok(Self {
            base_url,
            token: token.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, command: &str, key: &str) -> Result<String, AppError> {
        // Keys go into the path unescaped, so keep them to a safe alphabet.
        let ok = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
        if !ok {
            return Err(AppError::new("KV_INVALID_KEY", "Key contains unsupported characters")
                .with_details(format!("key={key}")));
        }
        Ok(format!("{}/{command}/{key}", self.base_url))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn decode(command: &str, resp: Result<ureq::Response, ureq::Error>) -> Result<KvReply, AppError> {
        match resp {
            Ok(r) => {
                let reply: KvReply = r.into_json().map_err(|e| {
                    AppError::new("KV_DECODE_FAILED", "Failed to decode KV response")
                        .with_details(format!("command={command}; err={e}"))
                })?;
                if let Some(err) = reply.error {
                    return Err(AppError::new("KV_REQUEST_FAILED", "KV service returned an error")
                        .with_details(format!("command={command}; error={err}")));
                }
                Ok(reply)
            }
            Err(ureq::Error::Status(status, r)) => {
                let body = r.into_string().unwrap_or_default();
                Err(AppError::new("KV_REQUEST_FAILED", "KV request was rejected")
                    .with_details(format!("command={command}; status={status}; body={body}"))
                    .with_retryable(status >= 500))
            }
            Err(e) => Err(AppError::new("KV_UNREACHABLE", "Failed to reach KV service")
                .with_details(e.to_string())
                .with_retryable(true)),
        }
    }
}

impl KeyValueStore for RestKvClient {
    fn backend(&self) -> &'static str {
        "kv"
    }

    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let url = self.url("get", key)?;
        debug!(key, "kv get");
        let resp = ureq::get(&url)
            .set("Authorization", &self.bearer())
            .timeout(self.timeout)
            .call();

        match Self::decode("get", resp)?.result {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) => Ok(Some(s)),
            other => Ok(Some(other.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let url = self.url("set", key)?;
        debug!(key, bytes = value.len(), "kv set");
        let resp = ureq::post(&url)
            .set("Authorization", &self.bearer())
            .timeout(self.timeout)
            .send_string(value);

        let reply = Self::decode("set", resp)?;
        match reply.result.as_str() {
            Some("OK") => Ok(()),
            _ => Err(AppError::new("KV_WRITE_FAILED", "KV set was not acknowledged")
                .with_details(format!("key={key}; result={}", reply.result))),
        }
    }
}
