//! Refresh workflow: "give me current data for artifact X".
//!
//! CHECK → (cached) DONE, or CHECK → FETCH → WRITE → DONE. A failed fetch is
//! a hard stop: nothing is written and the previous committed version stays
//! readable.

use crate::locks::ArtifactLocks;
use crate::series::SeriesKey;
use crate::source::{DataSource, FetchError};
use chrono::{DateTime, Utc};
use quotevault_core::calendar::CalendarError;
use quotevault_core::freshness::{Freshness, FreshnessOracle};
use quotevault_core::store::{ArtifactStore, StoreError};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("fetching '{name}' from {source_name} failed ({}): {source}", availability(.cached_available))]
    Fetch {
        name: String,
        source_name: String,
        cached_available: bool,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("'{0}' has no committed data right after a successful write")]
    MissingAfterWrite(String),
}

fn availability(cached_available: &bool) -> &'static str {
    if *cached_available {
        "previous version still cached"
    } else {
        "nothing cached"
    }
}

/// Where the returned payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Source,
}

/// Outcome of a refresh.
#[derive(Debug, Clone)]
pub struct Refreshed {
    pub name: String,
    pub payload: Vec<u8>,
    pub origin: Origin,
    /// The oracle's verdict on the cached copy at check time.
    pub freshness: Freshness,
    pub committed_at: Option<DateTime<Utc>>,
}

/// Read-only view of an artifact's cache state.
#[derive(Debug, Clone)]
pub struct ArtifactStatus {
    pub name: String,
    pub versions: Vec<String>,
    pub default_version: String,
    pub last_commit: Option<DateTime<Utc>>,
    pub freshness: Freshness,
    pub pending_staging: Vec<String>,
}

#[derive(Clone)]
pub struct RefreshWorkflow {
    store: ArtifactStore,
    oracle: FreshnessOracle,
    locks: Option<Arc<ArtifactLocks>>,
}

impl RefreshWorkflow {
    pub fn new(store: ArtifactStore, oracle: FreshnessOracle) -> Self {
        Self {
            store,
            oracle,
            locks: None,
        }
    }

    /// Serialize refreshes of the same name through `locks`.
    pub fn with_locks(mut self, locks: Arc<ArtifactLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn has_locks(&self) -> bool {
        self.locks.is_some()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn oracle(&self) -> &FreshnessOracle {
        &self.oracle
    }

    /// Current committed bytes for `name`, refreshing from `source` if needed.
    pub fn fetch_current(
        &self,
        name: &str,
        source: &dyn DataSource,
        force_refresh: bool,
    ) -> Result<Vec<u8>, RefreshError> {
        Ok(self
            .fetch_current_at(name, source, force_refresh, Utc::now())?
            .payload)
    }

    /// [`fetch_current`](Self::fetch_current) evaluated as of `now`.
    pub fn fetch_current_at(
        &self,
        name: &str,
        source: &dyn DataSource,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> Result<Refreshed, RefreshError> {
        self.locked(name, || self.refresh(name, None, source, force_refresh, now))
    }

    /// Refresh a series, recording its symbol and interval as parameters.
    pub fn fetch_series_at(
        &self,
        key: &SeriesKey,
        source: &dyn DataSource,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> Result<Refreshed, RefreshError> {
        let name = key.artifact_name();
        self.locked(&name, || {
            self.refresh(&name, Some(key), source, force_refresh, now)
        })
    }

    pub fn fetch_series(
        &self,
        key: &SeriesKey,
        source: &dyn DataSource,
        force_refresh: bool,
    ) -> Result<Refreshed, RefreshError> {
        self.fetch_series_at(key, source, force_refresh, Utc::now())
    }

    /// Cache state of an existing artifact as of `now`.
    pub fn status_at(&self, name: &str, now: DateTime<Utc>) -> Result<ArtifactStatus, RefreshError> {
        let artifact = self.store.get(name)?;
        let last_commit = self.store.last_commit_timestamp(&artifact, None)?;
        let freshness = self.oracle.classify(last_commit, now)?;
        Ok(ArtifactStatus {
            name: artifact.name().to_string(),
            versions: artifact.all_versions().into_iter().map(String::from).collect(),
            default_version: artifact.default_version().to_string(),
            last_commit,
            freshness,
            pending_staging: artifact.staged_versions().into_iter().map(String::from).collect(),
        })
    }

    fn locked<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        match &self.locks {
            Some(locks) => locks.with_lock(name, f),
            None => f(),
        }
    }

    fn refresh(
        &self,
        name: &str,
        series: Option<&SeriesKey>,
        source: &dyn DataSource,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> Result<Refreshed, RefreshError> {
        // CHECK
        let mut artifact = self.store.get_or_create(name)?;
        // Series parameters reach the source now but are only saved with the write.
        let missing: Vec<(String, Value)> = series
            .map(|key| {
                key.parameters()
                    .into_iter()
                    .filter(|(k, v)| artifact.parameters().get(k) != Some(v))
                    .collect()
            })
            .unwrap_or_default();

        let last = self.store.last_commit_timestamp(&artifact, None)?;
        let freshness = self.oracle.classify(last, now)?;

        if !force_refresh && freshness.is_fresh() {
            if let Some(payload) = self.store.read_data(&mut artifact, None)? {
                info!(artifact = name, bytes = payload.len(), "serving cached copy");
                return Ok(Refreshed {
                    name: name.to_string(),
                    payload,
                    origin: Origin::Cache,
                    freshness,
                    committed_at: last,
                });
            }
        }
        info!(artifact = name, reason = %freshness, force = force_refresh, "refreshing from {}", source.name());

        // FETCH
        let fetch_failed = |source_err: FetchError| RefreshError::Fetch {
            name: name.to_string(),
            source_name: source.name().to_string(),
            cached_available: last.is_some(),
            source: source_err,
        };
        let mut params = artifact.parameters().clone();
        params.extend(missing.iter().cloned());
        let bytes = source.pull(&params).map_err(&fetch_failed)?;
        if bytes.is_empty() {
            return Err(fetch_failed(FetchError::Empty));
        }
        debug!(artifact = name, bytes = bytes.len(), "pulled payload");

        // WRITE
        if !missing.is_empty() {
            self.store.add_params(&mut artifact, missing)?;
        }
        self.store.write_data(&mut artifact, Some(&bytes), None)?;

        // DONE
        let payload = self
            .store
            .read_data(&mut artifact, None)?
            .ok_or_else(|| RefreshError::MissingAfterWrite(name.to_string()))?;
        let committed_at = self.store.last_commit_timestamp(&artifact, None)?;
        Ok(Refreshed {
            name: name.to_string(),
            payload,
            origin: Origin::Source,
            freshness,
            committed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use chrono::{Duration, TimeZone};
    use quotevault_core::calendar::{FixedCalendar, Session};

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn workflow() -> RefreshWorkflow {
        let sessions = [2, 3, 4, 5]
            .into_iter()
            .map(|d| Session::new(at(d, 14), at(d, 21)))
            .collect();
        let calendar = FixedCalendar::new("test", sessions).unwrap();
        RefreshWorkflow::new(
            ArtifactStore::in_memory(),
            FreshnessOracle::new(Arc::new(calendar)),
        )
    }

    #[test]
    fn never_refreshed_pulls_and_commits() {
        let wf = workflow();
        let source = StaticSource::new(vec![9u8; 100]);
        let out = wf.fetch_current_at("AAA_daily", &source, false, at(6, 12)).unwrap();

        assert_eq!(out.origin, Origin::Source);
        assert_eq!(out.freshness, Freshness::NeverRefreshed);
        assert_eq!(out.payload.len(), 100);
        assert!(out.committed_at.is_some());
        assert_eq!(source.pulls(), 1);
    }

    #[test]
    fn force_refresh_bypasses_fresh_cache() {
        let wf = workflow();
        let source = StaticSource::new(b"v1".to_vec());
        wf.fetch_current_at("AAA_daily", &source, false, Utc::now()).unwrap();

        source.set_response(b"v2".to_vec());
        let out = wf
            .fetch_current_at("AAA_daily", &source, true, Utc::now() + Duration::seconds(1))
            .unwrap();
        assert_eq!(out.origin, Origin::Source);
        assert_eq!(out.payload, b"v2");
    }

    #[test]
    fn empty_pull_is_a_fetch_failure() {
        let wf = workflow();
        let source = StaticSource::new(Vec::new());
        let err = wf.fetch_current_at("AAA_daily", &source, false, at(6, 12)).unwrap_err();
        assert!(matches!(
            err,
            RefreshError::Fetch { source: FetchError::Empty, cached_available: false, .. }
        ));
        assert!(err.to_string().contains("nothing cached"));
    }

    #[test]
    fn series_refresh_records_parameters() {
        let wf = workflow();
        let source = StaticSource::new(b"bars".to_vec());
        let key = SeriesKey::daily("aaa");
        wf.fetch_series_at(&key, &source, false, at(6, 12)).unwrap();

        let artifact = wf.store().get("AAA_daily").unwrap();
        assert_eq!(artifact.parameters()["symbol"], "AAA");
        assert_eq!(artifact.parameters()["interval"], "daily");
    }

    #[test]
    fn failed_series_fetch_leaves_record_unchanged() {
        let wf = workflow();
        let before = wf.store().get_or_create("AAA_daily").unwrap();

        let source = StaticSource::failing("offline");
        let err = wf
            .fetch_series_at(&SeriesKey::daily("aaa"), &source, false, at(6, 12))
            .unwrap_err();
        assert!(matches!(err, RefreshError::Fetch { cached_available: false, .. }));

        let after = wf.store().get("AAA_daily").unwrap();
        assert_eq!(after, before);
        assert!(after.parameters().is_empty());
    }

    #[test]
    fn status_reports_versions_and_freshness() {
        let wf = workflow();
        assert!(matches!(
            wf.status_at("AAA_daily", at(6, 12)),
            Err(RefreshError::Store(StoreError::NoSuchArtifact(_)))
        ));

        let source = StaticSource::new(b"bars".to_vec());
        wf.fetch_current_at("AAA_daily", &source, false, at(6, 12)).unwrap();
        let status = wf.status_at("AAA_daily", at(6, 12)).unwrap();
        assert_eq!(status.versions, vec!["default".to_string()]);
        assert!(status.last_commit.is_some());
        assert!(status.pending_staging.is_empty());
    }
}
