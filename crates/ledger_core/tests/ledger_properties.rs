use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::tempdir;
use time::Duration;

use ledger_core::clock::{format_timestamp, parse_timestamp, ManualClock};
use ledger_core::db::SqliteKvStore;
use ledger_core::domain::{Category, IncidentForm, LedgerState, LedgerStatus};
use ledger_core::error::AppError;
use ledger_core::ledger::Ledger;
use ledger_core::store::{KeyValueStore, LAST_RESET_KEY, LOG_KEY};

/// Durable store that is configured but never reachable.
struct UnreachableStore;

impl KeyValueStore for UnreachableStore {
    fn backend(&self) -> &'static str {
        "unreachable"
    }

    fn get(&self, _key: &str) -> Result<Option<String>, AppError> {
        Err(AppError::new("KV_UNREACHABLE", "connection refused").with_retryable(true))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), AppError> {
        Err(AppError::new("KV_UNREACHABLE", "connection refused").with_retryable(true))
    }
}

/// Reads work, writes are rejected.
struct ReadOnlyStore(SqliteKvStore);

impl KeyValueStore for ReadOnlyStore {
    fn backend(&self) -> &'static str {
        "read-only"
    }

    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.0.get(key)
    }

    fn set(&self, key: &str, _value: &str) -> Result<(), AppError> {
        Err(AppError::new("KV_WRITE_REJECTED", "store is read-only").with_details(key.to_string()))
    }
}

/// Rejects writes to one key once `armed` is set; everything else goes through.
struct KeyRejectingStore {
    inner: SqliteKvStore,
    key: &'static str,
    armed: Arc<AtomicBool>,
}

impl KeyValueStore for KeyRejectingStore {
    fn backend(&self) -> &'static str {
        "key-rejecting"
    }

    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        if key == self.key && self.armed.load(Ordering::SeqCst) {
            return Err(AppError::new("KV_WRITE_REJECTED", "write rejected").with_details(key.to_string()));
        }
        self.inner.set(key, value)
    }
}

/// Every read fails, writes land in a shared SQLite store the test can inspect.
struct WriteOnlyStore(Arc<SqliteKvStore>);

impl KeyValueStore for WriteOnlyStore {
    fn backend(&self) -> &'static str {
        "write-only"
    }

    fn get(&self, _key: &str) -> Result<Option<String>, AppError> {
        Err(AppError::new("KV_UNREACHABLE", "read timed out").with_retryable(true))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.0.set(key, value)
    }
}

fn start() -> time::OffsetDateTime {
    parse_timestamp("2026-01-10T12:00:00Z").unwrap()
}

fn sqlite_ledger(clock: &Arc<ManualClock>) -> Ledger {
    let store = SqliteKvStore::open_in_memory().expect("open");
    Ledger::new(Some(Box::new(store))).with_clock(clock.clone())
}

fn failing_ledger(clock: &Arc<ManualClock>) -> Ledger {
    Ledger::new(Some(Box::new(UnreachableStore))).with_clock(clock.clone())
}

fn form(details: &str) -> IncidentForm {
    IncidentForm::with_details(details)
}

#[test]
fn empty_ledger_reports_nothing() {
    let clock = Arc::new(ManualClock::new(start()));
    for ledger in [
        Ledger::memory_only(),
        sqlite_ledger(&clock),
        failing_ledger(&clock),
    ] {
        assert_eq!(ledger.status(), LedgerStatus::empty());
    }
}

#[test]
fn record_then_status_shows_zero_days_and_trimmed_details() {
    let clock = Arc::new(ManualClock::new(start()));
    let ledger = sqlite_ledger(&clock);

    let rec = ledger.record_incident(&form("  Caught an edge \n")).expect("record");
    assert_eq!(rec.days_elapsed, 0);

    let status = ledger.status();
    assert_eq!(status.days_elapsed, 0);
    let latest = status.latest_entry.expect("latest");
    assert_eq!(latest.details, "Caught an edge");
    assert_eq!(latest, rec.latest_entry);
    assert_eq!(status.last_reset_timestamp.as_deref(), Some(latest.timestamp.as_str()));
}

#[test]
fn blank_details_are_rejected_without_mutation() {
    let clock = Arc::new(ManualClock::new(start()));
    let ledger = sqlite_ledger(&clock);
    ledger.record_incident(&form("first")).expect("record");
    let before = ledger.status();

    for details in ["", "   ", "\t"] {
        let err = ledger.record_incident(&form(details)).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.message, "Details are required");
    }
    let err = ledger.record_incident(&IncidentForm::default()).unwrap_err();
    assert_eq!(err.code, "VALIDATION_DETAILS_REQUIRED");

    assert_eq!(ledger.status(), before);
}

#[test]
fn unknown_category_is_rejected_without_mutation() {
    let ledger = Ledger::memory_only();
    let bad = IncidentForm {
        category: Some("purple".to_string()),
        ..form("fell")
    };
    let err = ledger.record_incident(&bad).unwrap_err();
    assert_eq!(err.code, "VALIDATION_CATEGORY_UNKNOWN");
    assert_eq!(ledger.status(), LedgerStatus::empty());
}

#[test]
fn reads_are_idempotent() {
    let clock = Arc::new(ManualClock::new(start()));
    let ledger = sqlite_ledger(&clock);
    ledger.record_incident(&form("one")).unwrap();
    clock.advance(Duration::days(2));
    assert_eq!(ledger.status(), ledger.status());
}

#[test]
fn log_is_newest_first() {
    let clock = Arc::new(ManualClock::new(start()));
    let ledger = sqlite_ledger(&clock);
    let n = 5;
    for i in 0..n {
        ledger.record_incident(&form(&format!("incident {i}"))).unwrap();
        clock.advance(Duration::minutes(10));
    }

    let status = ledger.status();
    assert_eq!(status.log.len(), n);
    assert_eq!(status.log[0].details, format!("incident {}", n - 1));
    assert_eq!(status.log[n - 1].details, "incident 0");
    assert_eq!(status.latest_entry.as_ref(), status.log.first());
    assert_eq!(status.last_reset_timestamp.as_deref(), Some(status.log[0].timestamp.as_str()));

    let mut ids: Vec<&str> = status.log.iter().map(|e| e.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), n);
}

#[test]
fn failing_durable_store_is_observably_equivalent() {
    let clock_ok = Arc::new(ManualClock::new(start()));
    let clock_bad = Arc::new(ManualClock::new(start()));
    let working = sqlite_ledger(&clock_ok);
    let failing = failing_ledger(&clock_bad);

    let inputs = [
        IncidentForm {
            location: Some("Peak Ridge".to_string()),
            category: Some("blue".to_string()),
            ..form("Caught an edge")
        },
        form("Tangled in the rope tow"),
        IncidentForm {
            sub_location: Some("Upper Bowl".to_string()),
            ..form("Yard sale")
        },
    ];

    for input in &inputs {
        let a = working.record_incident(input).expect("working");
        let b = failing.record_incident(input).expect("failing");
        assert_eq!(a.days_elapsed, b.days_elapsed);
        assert_eq!(a.last_reset_timestamp, b.last_reset_timestamp);
        assert_eq!(a.latest_entry.details, b.latest_entry.details);

        clock_ok.advance(Duration::hours(30));
        clock_bad.advance(Duration::hours(30));

        let sa = working.status();
        let sb = failing.status();
        assert_eq!(sa.days_elapsed, sb.days_elapsed);
        assert_eq!(sa.last_reset_timestamp, sb.last_reset_timestamp);
        let strip = |s: &LedgerStatus| {
            s.log
                .iter()
                .map(|e| (e.timestamp.clone(), e.details.clone(), e.location.clone(), e.sub_location.clone(), e.category))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&sa), strip(&sb));
    }

    assert_eq!(failing.fallback_state().log.len(), inputs.len());
}

#[test]
fn durable_no_value_falls_back_to_memory() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = ReadOnlyStore(SqliteKvStore::open_in_memory().unwrap());
    let ledger = Ledger::new(Some(Box::new(store))).with_clock(clock.clone());

    ledger.record_incident(&form("first")).unwrap();
    clock.advance(Duration::days(1));
    ledger.record_incident(&form("second")).unwrap();

    let status = ledger.status();
    assert_eq!(status.log.len(), 2);
    assert_eq!(status.log[0].details, "second");
    assert_eq!(status.days_elapsed, 0);
}

#[test]
fn day_count_floors() {
    let now = start();
    let clock = Arc::new(ManualClock::new(now));
    let store = SqliteKvStore::open_in_memory().unwrap();
    let reset = now - Duration::days(3) - Duration::hours(2);
    store
        .set(LAST_RESET_KEY, &format_timestamp(reset).unwrap())
        .unwrap();

    let ledger = Ledger::new(Some(Box::new(store))).with_clock(clock);
    let status = ledger.status();
    assert_eq!(status.days_elapsed, 3);
    assert_eq!(status.latest_entry, None);
    assert!(status.log.is_empty());
}

#[test]
fn unreadable_stored_timestamp_reports_zero_days() {
    let store = SqliteKvStore::open_in_memory().unwrap();
    store.set(LAST_RESET_KEY, "yesterday-ish").unwrap();
    let ledger = Ledger::new(Some(Box::new(store)));
    let status = ledger.status();
    assert_eq!(status.days_elapsed, 0);
    assert_eq!(status.last_reset_timestamp.as_deref(), Some("yesterday-ish"));
}

#[test]
fn whitespace_optional_fields_are_dropped() {
    let ledger = Ledger::memory_only();
    let rec = ledger
        .record_incident(&IncidentForm {
            location: Some("  ".to_string()),
            ..form("fell")
        })
        .unwrap();
    assert_eq!(rec.latest_entry.location, None);

    let v = serde_json::to_value(&rec.latest_entry).unwrap();
    assert!(v.get("location").is_none());
}

#[test]
fn scenario_caught_an_edge() {
    let clock = Arc::new(ManualClock::new(start()));
    let ledger = sqlite_ledger(&clock);
    let rec = ledger
        .record_incident(&IncidentForm {
            location: Some("Peak Ridge".to_string()),
            category: Some("blue".to_string()),
            ..form("Caught an edge")
        })
        .unwrap();

    let e = &rec.latest_entry;
    assert!(!e.id.is_empty());
    assert_eq!(e.timestamp, "2026-01-10T12:00:00Z");
    assert_eq!(e.details, "Caught an edge");
    assert_eq!(e.location.as_deref(), Some("Peak Ridge"));
    assert_eq!(e.category, Some(Category::Blue));

    let v = serde_json::to_value(e).unwrap();
    let obj = v.as_object().unwrap();
    assert!(!obj.contains_key("subLocation"));
    assert!(!obj.contains_key("run"));
    assert_eq!(obj["category"], "blue");
}

#[test]
fn sqlite_ledger_survives_restart_but_fallback_does_not() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("ledger.sqlite");

    {
        let store = SqliteKvStore::open(&path).expect("open");
        let ledger = Ledger::new(Some(Box::new(store)));
        ledger.record_incident(&form("persisted")).unwrap();
    }
    let store = SqliteKvStore::open(&path).expect("reopen");
    let ledger = Ledger::new(Some(Box::new(store)));
    assert_eq!(ledger.status().log[0].details, "persisted");

    {
        let ledger = Ledger::new(Some(Box::new(UnreachableStore)));
        ledger.record_incident(&form("lost")).unwrap();
        assert_eq!(ledger.status().log.len(), 1);
    }
    let ledger = Ledger::new(Some(Box::new(UnreachableStore)));
    assert_eq!(ledger.status(), LedgerStatus::empty());
}

fn partially_failing_ledger(key: &'static str) -> (Ledger, Arc<ManualClock>, Arc<AtomicBool>) {
    let clock = Arc::new(ManualClock::new(start()));
    let armed = Arc::new(AtomicBool::new(false));
    let store = KeyRejectingStore {
        inner: SqliteKvStore::open_in_memory().unwrap(),
        key,
        armed: armed.clone(),
    };
    let ledger = Ledger::new(Some(Box::new(store))).with_clock(clock.clone());
    (ledger, clock, armed)
}

fn assert_reset_by(ledger: &Ledger, details: &str) {
    let status = ledger.status();
    assert_eq!(status.days_elapsed, 0);
    let latest = status.latest_entry.expect("latest");
    assert_eq!(latest.details, details);
    assert_eq!(status.last_reset_timestamp.as_deref(), Some(latest.timestamp.as_str()));
}

#[test]
fn rejected_timestamp_write_still_resets_the_counter() {
    let (ledger, clock, armed) = partially_failing_ledger(LAST_RESET_KEY);
    ledger.record_incident(&form("first")).unwrap();
    clock.advance(Duration::days(5));
    armed.store(true, Ordering::SeqCst);

    let rec = ledger.record_incident(&form("second")).unwrap();
    assert_eq!(rec.days_elapsed, 0);
    assert_reset_by(&ledger, "second");

    let status = ledger.status();
    let details: Vec<&str> = status.log.iter().map(|e| e.details.as_str()).collect();
    assert_eq!(details, ["second", "first"]);
    assert_eq!(ledger.fallback_state().log.len(), 1);
}

#[test]
fn rejected_log_write_still_shows_the_new_entry() {
    let (ledger, clock, armed) = partially_failing_ledger(LOG_KEY);
    ledger.record_incident(&form("first")).unwrap();
    clock.advance(Duration::days(5));
    armed.store(true, Ordering::SeqCst);

    ledger.record_incident(&form("second")).unwrap();
    assert_reset_by(&ledger, "second");

    let status = ledger.status();
    let details: Vec<&str> = status.log.iter().map(|e| e.details.as_str()).collect();
    assert_eq!(details, ["second", "first"]);
}

#[test]
fn unreadable_durable_log_is_overwritten_with_the_new_entry() {
    let inner = Arc::new(SqliteKvStore::open_in_memory().unwrap());
    inner
        .set(LOG_KEY, r#"[{"id":"old","timestamp":"2025-12-01T00:00:00Z","details":"old"}]"#)
        .unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let ledger = Ledger::new(Some(Box::new(WriteOnlyStore(inner.clone())))).with_clock(clock);

    let rec = ledger.record_incident(&form("new")).unwrap();

    let stored: Vec<serde_json::Value> =
        serde_json::from_str(&inner.get(LOG_KEY).unwrap().expect("log")).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["id"], rec.latest_entry.id.as_str());
    assert_eq!(stored[0]["details"], "new");
    assert_eq!(
        inner.get(LAST_RESET_KEY).unwrap().as_deref(),
        Some(rec.last_reset_timestamp.as_str())
    );
    assert_eq!(ledger.fallback_state(), LedgerState::default());
}
