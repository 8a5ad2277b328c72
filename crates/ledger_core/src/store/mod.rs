use std::sync::Mutex;

use crate::domain::{IncidentEntry, LedgerState};
use crate::error::AppError;

pub const LAST_RESET_KEY: &str = "lastResetTimestamp";
pub const LOG_KEY: &str = "incidentLog";
/// Reset time written by earlier deployments, read when `LAST_RESET_KEY` has no value.
pub const LEGACY_LAST_RESET_KEY: &str = "lastWipeout";

/// Durable key-value store contract. Values are opaque strings.
///
/// Implementations report every failure (unreachable, misconfigured, write rejected) as an
/// `AppError`; the ledger decides what to do with it.
pub trait KeyValueStore: Send + Sync {
    /// Short backend name for diagnostics (`sqlite`, `kv`, ...).
    fn backend(&self) -> &'static str;
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
}

/// Persisted ledger state, independent of where it lives.
pub trait LedgerRepository: Send + Sync {
    /// `Ok(None)` means "no value stored".
    fn last_reset(&self) -> Result<Option<String>, AppError>;
    /// `Ok(None)` means "no value stored"; an empty log that was written is `Ok(Some(vec![]))`.
    fn log(&self) -> Result<Option<Vec<IncidentEntry>>, AppError>;
    /// Store the full log and the new reset time. Not atomic across the two fields.
    fn write(&self, log: &[IncidentEntry], last_reset: &str) -> Result<(), AppError>;
}

/// Ledger state kept in a `KeyValueStore` under two keys.
pub struct KvRepository {
    store: Box<dyn KeyValueStore>,
}

impl KvRepository {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }
}

impl LedgerRepository for KvRepository {
    fn last_reset(&self) -> Result<Option<String>, AppError> {
        for key in [LAST_RESET_KEY, LEGACY_LAST_RESET_KEY] {
            if let Some(v) = self.store.get(key)?.and_then(|raw| unquote(&raw)) {
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    fn log(&self) -> Result<Option<Vec<IncidentEntry>>, AppError> {
        let Some(raw) = self.store.get(LOG_KEY)? else {
            return Ok(None);
        };
        let entries: Vec<IncidentEntry> = serde_json::from_str(&raw).map_err(|e| {
            AppError::new("STORE_DECODE_FAILED", "Failed to decode stored incident log")
                .with_details(e.to_string())
        })?;
        Ok(Some(entries))
    }

    fn write(&self, log: &[IncidentEntry], last_reset: &str) -> Result<(), AppError> {
        let encoded = serde_json::to_string(log).map_err(|e| {
            AppError::new("STORE_ENCODE_FAILED", "Failed to encode incident log")
                .with_details(e.to_string())
        })?;
        // Two separate operations. The timestamp goes first so a half-applied write still resets
        // the counter; the log can lag one entry behind it.
        self.store.set(LAST_RESET_KEY, last_reset)?;
        self.store.set(LOG_KEY, &encoded)
    }
}

/// Trim a stored timestamp and strip JSON string quoting (JSON-serializing KV clients store
/// `"2026-01-01T00:00:00Z"` with the quotes). Blank values count as no value.
fn unquote(raw: &str) -> Option<String> {
    let v = raw.trim();
    let v = if v.starts_with('"') {
        serde_json::from_str::<String>(v).ok()?
    } else {
        v.to_string()
    };
    let v = v.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

/// Process-local fallback. Survives store failures, not restarts.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<LedgerState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LedgerState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LedgerRepository for MemoryRepository {
    fn last_reset(&self) -> Result<Option<String>, AppError> {
        Ok(self.snapshot().last_reset_timestamp)
    }

    fn log(&self) -> Result<Option<Vec<IncidentEntry>>, AppError> {
        let state = self.snapshot();
        if state.log.is_empty() && state.last_reset_timestamp.is_none() {
            return Ok(None);
        }
        Ok(Some(state.log))
    }

    fn write(&self, log: &[IncidentEntry], last_reset: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.log = log.to_vec();
        state.last_reset_timestamp = Some(last_reset.to_string());
        Ok(())
    }
}
