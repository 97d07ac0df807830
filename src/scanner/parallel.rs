use crate::classifier::sanitize_keywords;
use crate::config::SignatureConfig;
use crate::error::{RecoveryError, Result};
use crate::pool::{CancelToken, TaskOutcome, WorkerPool};
use crate::scanner::worker::ScanWorker;
use crate::types::{EventSink, RecoveryEvent, ScanResult, ScanUnit};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Aggregated result of a whole scan, available only after every unit has returned
#[derive(Debug, Default)]
pub struct ScanRun {
    pub result: ScanResult,
    pub units_total: usize,
    pub units_completed: usize,
    pub units_failed: usize,
    pub interrupted: bool,
    pub duration_secs: f64,
}

/// Partitions the scan root into units and fans them out over a worker pool
pub struct ParallelScanner {
    signatures: SignatureConfig,
    events: EventSink,
    cancel: CancelToken,
    excluded: Vec<PathBuf>,
}

impl ParallelScanner {
    pub fn new(signatures: SignatureConfig) -> Self {
        Self {
            signatures,
            events: EventSink::disabled(),
            cancel: CancelToken::new(),
            excluded: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Skip `dir` wherever it appears in the tree. Used for an output root
    /// nested inside the scan root, so recovered copies are never rescanned.
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    /// One unit per immediate subdirectory of `scan_root`, sorted by path.
    ///
    /// Loose files next to those subdirectories get their own depth-1 unit.
    /// A root without subdirectories is scanned as a single unit.
    pub fn plan_units(&self, scan_root: &Path, output_root: &Path, keywords: &[String]) -> Result<Vec<ScanUnit>> {
        let listing = fs::read_dir(scan_root).map_err(|e| RecoveryError::from_io(scan_root, "list", e))?;

        let mut subdirs = Vec::new();
        let mut has_loose_files = false;
        for entry in listing {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %scan_root.display(), error = %e, "unreadable entry in scan root, skipping");
                    continue;
                }
            };
            let path = entry.path();
            if self.excluded.contains(&path) {
                debug!(path = %path.display(), "excluded directory, no scan unit");
                continue;
            }
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => subdirs.push(path),
                Ok(ft) if ft.is_file() || (ft.is_symlink() && path.is_file()) => has_loose_files = true,
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not stat entry in scan root, skipping");
                }
            }
        }
        subdirs.sort();

        let unit = |root: PathBuf| {
            ScanUnit::new(
                root,
                scan_root.to_path_buf(),
                output_root.to_path_buf(),
                keywords.to_vec(),
            )
        };

        if subdirs.is_empty() {
            return Ok(vec![unit(scan_root.to_path_buf())]);
        }

        let mut units = Vec::with_capacity(subdirs.len() + 1);
        if has_loose_files {
            units.push(unit(scan_root.to_path_buf()).with_max_depth(1));
        }
        units.extend(subdirs.into_iter().map(unit));
        Ok(units)
    }

    /// Scan `scan_root` on `pool` and merge the per-unit results in dispatch order.
    pub fn scan(&self, pool: &WorkerPool, scan_root: &Path, output_root: &Path, keywords: &[String]) -> Result<ScanRun> {
        let keywords = sanitize_keywords(keywords);
        let units = self.plan_units(scan_root, output_root, &keywords)?;

        let worker = ScanWorker::new(self.signatures.clone(), self.events.clone(), self.cancel.clone())
            .with_excluded(self.excluded.clone());
        Ok(self.scan_units(pool, units, |unit| worker.scan(unit)))
    }

    /// Run `scan_one` over every unit, then merge after the barrier.
    ///
    /// A unit that panics is counted in `units_failed` and contributes nothing.
    pub fn scan_units<F>(&self, pool: &WorkerPool, units: Vec<ScanUnit>, scan_one: F) -> ScanRun
    where
        F: Fn(&ScanUnit) -> ScanResult + Sync + Send,
    {
        let start_time = Instant::now();
        let units_total = units.len();

        info!(
            units = units_total,
            workers = pool.workers(),
            "distributing scan across {} root directories",
            units_total
        );

        let roots: Vec<PathBuf> = units.iter().map(|u| u.root_path.clone()).collect();
        let events = &self.events;

        let outcomes = pool.run_all(units, &self.cancel, |unit| {
            let result = scan_one(&unit);
            events.emit(RecoveryEvent::UnitCompleted {
                root: unit.root_path,
                found: result.total(),
            });
            result
        });

        // Barrier passed: every unit has returned, failed or been skipped
        let mut run = ScanRun {
            units_total,
            ..Default::default()
        };
        for (root, outcome) in roots.into_iter().zip(outcomes) {
            match outcome {
                TaskOutcome::Done(result) => {
                    run.units_completed += 1;
                    run.result.merge(result);
                }
                TaskOutcome::Panicked(message) => {
                    run.units_failed += 1;
                    error!(unit = %root.display(), error = %message, "scan worker failed, unit contributes no results");
                    self.events.emit(RecoveryEvent::UnitFailed { root, message });
                }
                TaskOutcome::Cancelled => {}
            }
        }

        run.result.project_folders.sort();
        run.result.project_folders.dedup();
        run.interrupted = self.cancel.is_cancelled();
        run.duration_secs = start_time.elapsed().as_secs_f64();

        if run.interrupted {
            warn!(
                completed = run.units_completed,
                total = units_total,
                "scan interrupted, keeping partial results"
            );
        }
        info!(
            "Scan complete. Found {} ALS, {} ALP, {} keyword files (Total: {}).",
            run.result.als.len(),
            run.result.alp.len(),
            run.result.keyword.len(),
            run.result.total()
        );

        run
    }
}

/// Build a pool for `concurrency` workers and scan `scan_root` with default signatures.
pub fn orchestrate(scan_root: &Path, output_root: &Path, keywords: &[String], concurrency: usize) -> Result<ScanRun> {
    let pool = WorkerPool::new(concurrency)?;
    ParallelScanner::new(SignatureConfig::default()).scan(&pool, scan_root, output_root, keywords)
}
