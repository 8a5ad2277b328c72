//! The incident ledger: last reset time plus the incident log, with a process-local fallback
//! whenever the durable store is absent or failing.
//!
//! Reads prefer the durable store and fall back per field when it errors or has no value. When
//! both hold a value (the durable store rejected some writes but not others), the later reset
//! time wins and the two logs are merged newest first, so a recorded incident is always visible.
//! Each call writes the durable store if that write succeeds, otherwise the fallback.
//! Read-modify-write of the log is not transactional; concurrent writers can lose each other's
//! prepends (last write wins).

use std::collections::HashSet;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::clock::{days_elapsed, format_timestamp, parse_timestamp, Clock, SystemClock};
use crate::domain::{IncidentEntry, IncidentForm, LedgerState, LedgerStatus, RecordedIncident};
use crate::error::AppError;
use crate::store::{KeyValueStore, KvRepository, LedgerRepository, MemoryRepository};
use crate::validate::validate_form;

pub struct Ledger {
    durable: Option<KvRepository>,
    fallback: MemoryRepository,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    /// `None` runs the ledger on the fallback alone (durable store not configured).
    pub fn new(durable: Option<Box<dyn KeyValueStore>>) -> Self {
        Self {
            durable: durable.map(KvRepository::new),
            fallback: MemoryRepository::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn memory_only() -> Self {
        Self::new(None)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configured durable backend, or `memory` when there is none.
    pub fn durable_backend(&self) -> &'static str {
        self.durable
            .as_ref()
            .map(KvRepository::backend)
            .unwrap_or("memory")
    }

    /// Current contents of the in-memory fallback.
    pub fn fallback_state(&self) -> LedgerState {
        self.fallback.snapshot()
    }

    fn read_durable<T>(
        &self,
        what: &'static str,
        read: impl FnOnce(&KvRepository) -> Result<Option<T>, AppError>,
    ) -> Option<T> {
        let repo = self.durable.as_ref()?;
        match read(repo) {
            Ok(v) => v,
            Err(e) => {
                debug!(backend = repo.backend(), what, error = %e, details = ?e.details, "durable read failed; using fallback");
                None
            }
        }
    }

    /// Elapsed whole days since the last reset, plus the full log. Never fails.
    pub fn status(&self) -> LedgerStatus {
        let last_reset = latest_reset(
            self.read_durable("last_reset", |r| r.last_reset()),
            self.fallback.last_reset().ok().flatten(),
        );

        let Some(last_reset) = last_reset else {
            return LedgerStatus::empty();
        };

        let log = merge_logs(
            self.read_durable("log", |r| r.log()),
            self.fallback.log().ok().flatten(),
        );

        let days = match parse_timestamp(&last_reset) {
            Ok(reset) => days_elapsed(reset, self.clock.now()),
            Err(e) => {
                warn!(error = %e, details = ?e.details, "stored reset timestamp is unreadable; reporting 0 days");
                0
            }
        };

        LedgerStatus {
            days_elapsed: days,
            latest_entry: log.first().cloned(),
            last_reset_timestamp: Some(last_reset),
            log,
        }
    }

    /// Validate, stamp, and prepend a new entry; resets the counter.
    ///
    /// Only validation failures are returned. Durable-store failures divert the write to the
    /// fallback and the call still succeeds.
    pub fn record_incident(&self, form: &IncidentForm) -> Result<RecordedIncident, AppError> {
        let valid = validate_form(form)?;
        let timestamp = format_timestamp(self.clock.now())?;

        let entry = IncidentEntry {
            id: Ulid::new().to_string(),
            timestamp: timestamp.clone(),
            location: valid.location,
            sub_location: valid.sub_location,
            category: valid.category,
            details: valid.details,
        };

        let stored_in = match self.write_durable(&entry) {
            Some(backend) => backend,
            None => {
                let mut log = self.fallback.log().ok().flatten().unwrap_or_default();
                log.insert(0, entry.clone());
                self.fallback.write(&log, &timestamp)?;
                "memory"
            }
        };

        info!(id = %entry.id, store = stored_in, "incident recorded");

        Ok(RecordedIncident {
            days_elapsed: 0,
            last_reset_timestamp: timestamp,
            latest_entry: entry,
        })
    }

    /// Returns the backend name on success, `None` when the caller must use the fallback.
    fn write_durable(&self, entry: &IncidentEntry) -> Option<&'static str> {
        let repo = self.durable.as_ref()?;

        let mut log = match repo.log() {
            Ok(existing) => existing.unwrap_or_default(),
            Err(e) => {
                debug!(backend = repo.backend(), error = %e, "durable log read failed; treating as empty");
                Vec::new()
            }
        };
        log.insert(0, entry.clone());

        match repo.write(&log, &entry.timestamp) {
            Ok(()) => Some(repo.backend()),
            Err(e) => {
                warn!(backend = repo.backend(), error = %e, details = ?e.details, "durable write failed; using in-memory fallback");
                None
            }
        }
    }
}

fn sort_key(raw: &str) -> Option<OffsetDateTime> {
    parse_timestamp(raw).ok()
}

/// Pick the later of two reset times. The durable value wins ties and unparseable comparisons.
fn latest_reset(durable: Option<String>, fallback: Option<String>) -> Option<String> {
    match (durable, fallback) {
        (Some(d), Some(f)) => match (sort_key(&d), sort_key(&f)) {
            (Some(dt), Some(ft)) if ft > dt => Some(f),
            _ => Some(d),
        },
        (d, f) => d.or(f),
    }
}

/// Fallback entries first, then durable entries not already present, ordered newest first.
fn merge_logs(
    durable: Option<Vec<IncidentEntry>>,
    fallback: Option<Vec<IncidentEntry>>,
) -> Vec<IncidentEntry> {
    let (durable, mut merged) = match (durable, fallback) {
        (Some(d), Some(f)) if !f.is_empty() => (d, f),
        (d, f) => return d.or(f).unwrap_or_default(),
    };
    let seen: HashSet<String> = merged.iter().map(|e| e.id.clone()).collect();
    merged.extend(durable.into_iter().filter(|e| !seen.contains(&e.id)));
    // Stable: equal timestamps keep fallback entries ahead.
    merged.sort_by(|a, b| sort_key(&b.timestamp).cmp(&sort_key(&a.timestamp)));
    merged
}
