//! Batch refresh — refreshes many series in parallel with a summary.

use crate::locks::ArtifactLocks;
use crate::refresh::{Origin, RefreshError, RefreshWorkflow};
use crate::series::SeriesKey;
use crate::source::DataSource;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub force_refresh: bool,
    /// Worker threads; 0 uses rayon's global pool.
    pub max_threads: usize,
}

/// Per-series progress callback.
pub trait BatchProgress: Sync {
    fn on_complete(&self, key: &SeriesKey, result: &Result<Origin, RefreshError>);
}

/// Discards progress.
pub struct NoProgress;

impl BatchProgress for NoProgress {
    fn on_complete(&self, _key: &SeriesKey, _result: &Result<Origin, RefreshError>) {}
}

/// Summary of a batch refresh.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Of `succeeded`, how many were served from cache.
    pub from_cache: usize,
    pub failed: usize,
    pub errors: Vec<(String, RefreshError)>,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Refresh every distinct key, each under its per-name lock.
///
/// `source_for` picks the data source per key. Failures are collected, not
/// propagated; one bad series never stops the others.
pub fn refresh_many<F>(
    workflow: &RefreshWorkflow,
    keys: &[SeriesKey],
    source_for: F,
    options: BatchOptions,
    progress: &dyn BatchProgress,
) -> BatchSummary
where
    F: Fn(&SeriesKey) -> Arc<dyn DataSource> + Sync,
{
    refresh_many_at(workflow, keys, source_for, options, progress, Utc::now())
}

/// [`refresh_many`] evaluated as of `now`.
pub fn refresh_many_at<F>(
    workflow: &RefreshWorkflow,
    keys: &[SeriesKey],
    source_for: F,
    options: BatchOptions,
    progress: &dyn BatchProgress,
    now: DateTime<Utc>,
) -> BatchSummary
where
    F: Fn(&SeriesKey) -> Arc<dyn DataSource> + Sync,
{
    let unique: Vec<SeriesKey> = keys.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
    let workflow = if workflow.has_locks() {
        workflow.clone()
    } else {
        workflow.clone().with_locks(Arc::new(ArtifactLocks::new()))
    };

    let run_one = |key: &SeriesKey| {
        let source = source_for(key);
        let result = workflow
            .fetch_series_at(key, source.as_ref(), options.force_refresh, now)
            .map(|r| r.origin);
        progress.on_complete(key, &result);
        (key.artifact_name(), result)
    };

    let pool = if options.max_threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(options.max_threads)
            .build()
            .map_err(|e| warn!(error = %e, "falling back to the global thread pool"))
            .ok()
    } else {
        None
    };
    let results: Vec<(String, Result<Origin, RefreshError>)> = match &pool {
        Some(pool) => pool.install(|| unique.par_iter().map(run_one).collect()),
        None => unique.par_iter().map(run_one).collect(),
    };

    let mut summary = BatchSummary {
        total: results.len(),
        ..BatchSummary::default()
    };
    for (name, result) in results {
        match result {
            Ok(origin) => {
                summary.succeeded += 1;
                if origin == Origin::Cache {
                    summary.from_cache += 1;
                }
            }
            Err(e) => {
                summary.failed += 1;
                summary.errors.push((name, e));
            }
        }
    }
    summary
}
