//! End-to-end refresh scenarios over a filesystem store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use quotevault_core::blob::memory::BlobOp;
use quotevault_core::blob::MemoryBlobBackend;
use quotevault_core::calendar::{FixedCalendar, NyseCalendar, Session, TradingCalendar};
use quotevault_core::freshness::{Freshness, FreshnessOracle};
use quotevault_core::store::{ArtifactStore, MemoryRecordRepository, DEFAULT_VERSION};
use quotevault_runner::{
    decode_bars, CsvSource, FetchError, Origin, RefreshError, RefreshWorkflow, SeriesKey,
    StaticSource,
};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────

/// A calendar with no sessions near the present: the market is always closed
/// and no boundary is ever crossed.
fn quiet_calendar() -> Arc<dyn TradingCalendar> {
    let open = Utc.with_ymd_and_hms(2000, 1, 3, 14, 30, 0).unwrap();
    Arc::new(FixedCalendar::new("quiet", vec![Session::new(open, open + Duration::hours(6))]).unwrap())
}

fn fs_workflow(dir: &std::path::Path, calendar: Arc<dyn TradingCalendar>) -> RefreshWorkflow {
    RefreshWorkflow::new(
        ArtifactStore::open(dir).unwrap(),
        FreshnessOracle::new(calendar),
    )
}

fn commit_time(wf: &RefreshWorkflow, name: &str) -> DateTime<Utc> {
    let artifact = wf.store().get(name).unwrap();
    wf.store()
        .last_commit_timestamp(&artifact, None)
        .unwrap()
        .unwrap()
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn first_fetch_stores_payload_and_clears_staging() {
    let dir = tempfile::tempdir().unwrap();
    let wf = fs_workflow(dir.path(), quiet_calendar());
    let source = StaticSource::new(vec![42u8; 100]);

    let bytes = wf.fetch_current("AAA_daily", &source, false).unwrap();

    assert_eq!(bytes.len(), 100);
    let artifact = wf.store().get("AAA_daily").unwrap();
    assert!(artifact.committed(DEFAULT_VERSION).is_some());
    assert!(!artifact.has_pending_staging());
    assert_eq!(source.pulls(), 1);
}

#[test]
fn quiet_period_serves_cache_without_pulling() {
    let dir = tempfile::tempdir().unwrap();
    let wf = fs_workflow(dir.path(), quiet_calendar());
    let source = StaticSource::new(b"original".to_vec());
    wf.fetch_current("AAA_daily", &source, false).unwrap();

    let t = commit_time(&wf, "AAA_daily");
    source.set_response(b"newer".to_vec());
    let out = wf
        .fetch_current_at("AAA_daily", &source, false, t + Duration::hours(2))
        .unwrap();

    assert_eq!(out.origin, Origin::Cache);
    assert_eq!(out.freshness, Freshness::Fresh);
    assert_eq!(out.payload, b"original");
    assert_eq!(source.pulls(), 1);
}

#[test]
fn crossing_a_close_triggers_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let seed = StaticSource::new(b"before close".to_vec());
    let bootstrap = RefreshWorkflow::new(store.clone(), FreshnessOracle::new(quiet_calendar()));
    bootstrap.fetch_current("AAA_daily", &seed, false).unwrap();

    // A session that closes one hour after the commit.
    let t = commit_time(&bootstrap, "AAA_daily");
    let calendar: Arc<dyn TradingCalendar> = Arc::new(
        FixedCalendar::new(
            "around-commit",
            vec![Session::new(t - Duration::hours(5), t + Duration::hours(1))],
        )
        .unwrap(),
    );
    let wf = RefreshWorkflow::new(store, FreshnessOracle::new(calendar));
    let source = StaticSource::new(b"after close".to_vec());

    let out = wf
        .fetch_current_at("AAA_daily", &source, false, t + Duration::hours(3))
        .unwrap();
    assert_eq!(out.origin, Origin::Source);
    assert_eq!(
        out.freshness,
        Freshness::BoundaryCrossed { at: t + Duration::hours(1) }
    );
    assert_eq!(out.payload, b"after close");
}

#[test]
fn open_market_always_refreshes() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let bootstrap = RefreshWorkflow::new(store.clone(), FreshnessOracle::new(quiet_calendar()));
    bootstrap
        .fetch_current("AAA_daily", &StaticSource::new(b"v1".to_vec()), false)
        .unwrap();

    let t = commit_time(&bootstrap, "AAA_daily");
    let calendar: Arc<dyn TradingCalendar> = Arc::new(
        FixedCalendar::new(
            "open-now",
            vec![Session::new(t - Duration::hours(1), t + Duration::hours(5))],
        )
        .unwrap(),
    );
    let wf = RefreshWorkflow::new(store, FreshnessOracle::new(calendar));
    let source = StaticSource::new(b"v2".to_vec());
    let out = wf
        .fetch_current_at("AAA_daily", &source, false, t + Duration::minutes(1))
        .unwrap();
    assert_eq!(out.freshness, Freshness::MarketOpen);
    assert_eq!(out.payload, b"v2");
}

#[test]
fn fetch_failure_keeps_previous_version() {
    let dir = tempfile::tempdir().unwrap();
    let wf = fs_workflow(dir.path(), quiet_calendar());
    wf.fetch_current("AAA_daily", &StaticSource::new(b"good".to_vec()), false)
        .unwrap();

    let failing = StaticSource::failing("vendor offline");
    let err = wf.fetch_current("AAA_daily", &failing, true).unwrap_err();
    match &err {
        RefreshError::Fetch {
            name,
            cached_available,
            source,
            ..
        } => {
            assert_eq!(name, "AAA_daily");
            assert!(*cached_available);
            assert!(matches!(source, FetchError::Unavailable(_)));
        }
        other => panic!("expected fetch error, got {other:?}"),
    }

    let mut artifact = wf.store().get("AAA_daily").unwrap();
    assert_eq!(
        wf.store().read_data(&mut artifact, None).unwrap().unwrap(),
        b"good"
    );
    assert!(!artifact.has_pending_staging());
}

#[test]
fn failed_write_keeps_previous_version() {
    let blobs = Arc::new(MemoryBlobBackend::new());
    let store = ArtifactStore::new(blobs.clone(), Arc::new(MemoryRecordRepository::new()));
    let wf = RefreshWorkflow::new(store, FreshnessOracle::new(quiet_calendar()));
    wf.fetch_current("AAA_daily", &StaticSource::new(b"good".to_vec()), false)
        .unwrap();

    blobs.fail_next(BlobOp::Create);
    let err = wf
        .fetch_current("AAA_daily", &StaticSource::new(b"bad".to_vec()), true)
        .unwrap_err();
    assert!(matches!(err, RefreshError::Store(_)));

    let mut artifact = wf.store().get("AAA_daily").unwrap();
    assert_eq!(
        wf.store().read_data(&mut artifact, None).unwrap().unwrap(),
        b"good"
    );
}

#[test]
fn write_none_clears_all_versions() {
    let dir = tempfile::tempdir().unwrap();
    let wf = fs_workflow(dir.path(), quiet_calendar());
    wf.fetch_current("AAA_daily", &StaticSource::new(b"data".to_vec()), false)
        .unwrap();

    let store = wf.store();
    let mut artifact = store.get("AAA_daily").unwrap();
    store.write_data(&mut artifact, Some(b"alt"), Some("alt")).unwrap();
    store.write_data(&mut artifact, None, None).unwrap();

    assert!(artifact.all_versions().is_empty());
    assert_eq!(store.read_data(&mut artifact, None).unwrap(), None);
    assert_eq!(store.last_commit_timestamp(&artifact, None).unwrap(), None);
}

#[test]
fn csv_series_refresh_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let csv_dir = dir.path().join("csv");
    std::fs::create_dir_all(&csv_dir).unwrap();
    std::fs::write(
        csv_dir.join("AAA.csv"),
        "date,open,high,low,close,volume\n2024-01-02,10,11,9,10.5,100\n2024-01-03,10.5,12,10,11.5,200\n",
    )
    .unwrap();

    let wf = fs_workflow(&dir.path().join("store"), Arc::new(NyseCalendar::new()));
    let out = wf
        .fetch_series(&SeriesKey::daily("aaa"), &CsvSource::directory(&csv_dir), false)
        .unwrap();

    let bars = decode_bars(&out.payload).unwrap();
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[1].close, 11.5);
    let artifact = wf.store().get("AAA_daily").unwrap();
    assert_eq!(artifact.parameters()["symbol"], "AAA");
}
