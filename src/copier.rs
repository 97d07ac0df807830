//! Copy phase: mirror every candidate into the output tree.
//!
//! One file's failure never stops the batch. Every candidate yields exactly
//! one [`CopyOutcome`], including the ones skipped after cancellation.

use crate::error::{RecoveryError, Result};
use crate::pool::{CancelToken, TaskOutcome, WorkerPool};
use crate::types::{Candidate, CopyOutcome, CopyReport, EventSink, RecoveryEvent};
use filetime::FileTime;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

const INTERRUPTED_REASON: &str = "interrupted before copy";

pub struct CopyExecutor {
    events: EventSink,
    cancel: CancelToken,
}

impl Default for CopyExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CopyExecutor {
    pub fn new() -> Self {
        Self {
            events: EventSink::disabled(),
            cancel: CancelToken::new(),
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

    /// Copy every candidate and tally the outcomes.
    ///
    /// The pool is only used when there are more candidates than workers.
    pub fn copy_all(&self, pool: &WorkerPool, candidates: &[Candidate]) -> CopyReport {
        let sequential = pool.is_sequential() || candidates.len() <= pool.workers();
        if sequential {
            info!(files = candidates.len(), "copying files sequentially");
        } else {
            info!(files = candidates.len(), workers = pool.workers(), "copying files in parallel");
        }

        let tasks: Vec<&Candidate> = candidates.iter().collect();
        let outcomes = pool.run_all_with(tasks, &self.cancel, sequential, |candidate| self.copy_tracked(candidate));

        let outcomes: Vec<CopyOutcome> = candidates
            .iter()
            .zip(outcomes)
            .map(|(candidate, outcome)| match outcome {
                TaskOutcome::Done(outcome) => outcome,
                TaskOutcome::Panicked(message) => {
                    error!(src = %candidate.source_path.display(), error = %message, "copy worker panicked");
                    CopyOutcome::failed(candidate.clone(), format!("copy worker panicked: {message}"))
                }
                TaskOutcome::Cancelled => CopyOutcome::failed(candidate.clone(), INTERRUPTED_REASON),
            })
            .collect();

        let report = CopyReport::from_outcomes(outcomes, self.cancel.is_cancelled());
        info!(
            "File saving complete. Successfully saved: {}, Failed: {}.",
            report.succeeded, report.failed
        );
        report
    }

    fn copy_tracked(&self, candidate: &Candidate) -> CopyOutcome {
        match self.copy_one(candidate) {
            Ok(bytes) => {
                info!(dst = %candidate.destination_path.display(), bytes, "Saved");
                self.events
                    .emit(RecoveryEvent::FileCopied(candidate.destination_path.clone()));
                CopyOutcome::succeeded(candidate.clone(), bytes)
            }
            Err(e) => {
                error!(
                    src = %candidate.source_path.display(),
                    dst = %candidate.destination_path.display(),
                    error = %e,
                    "Failed to save"
                );
                let reason = e.to_string();
                self.events.emit(RecoveryEvent::CopyFailed {
                    path: candidate.source_path.clone(),
                    reason: reason.clone(),
                });
                CopyOutcome::failed(candidate.clone(), reason)
            }
        }
    }

    /// Copy one file, creating its parent directories and keeping its timestamps.
    ///
    /// Returns the number of bytes copied.
    pub fn copy_one(&self, candidate: &Candidate) -> Result<u64> {
        let src = &candidate.source_path;
        let dst = &candidate.destination_path;

        let metadata = fs::metadata(src).map_err(|e| RecoveryError::from_io(src, "stat", e))?;

        // fs::copy onto the source itself truncates it
        if let Ok(existing) = fs::metadata(dst) {
            if is_same_file(src, &metadata, dst, &existing) {
                return Err(RecoveryError::SameFile { path: src.clone() });
            }
        }

        if let Some(parent) = dst.parent() {
            // create_dir_all tolerates directories created concurrently by other workers
            fs::create_dir_all(parent).map_err(|e| RecoveryError::DestinationUnwritable {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let bytes = fs::copy(src, dst).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound if !src.exists() => RecoveryError::from_io(src, "copy", e),
            _ => RecoveryError::DestinationUnwritable {
                path: dst.clone(),
                source: e,
            },
        })?;

        let atime = FileTime::from_last_access_time(&metadata);
        let mtime = FileTime::from_last_modification_time(&metadata);
        if let Err(e) = filetime::set_file_times(dst, atime, mtime) {
            // content is intact, only the timestamp is lost
            warn!(dst = %dst.display(), error = %e, "could not preserve timestamps");
        }

        Ok(bytes)
    }
}

#[cfg(unix)]
fn is_same_file(_src: &Path, src_meta: &fs::Metadata, _dst: &Path, dst_meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    src_meta.dev() == dst_meta.dev() && src_meta.ino() == dst_meta.ino()
}

#[cfg(not(unix))]
fn is_same_file(src: &Path, _src_meta: &fs::Metadata, dst: &Path, _dst_meta: &fs::Metadata) -> bool {
    match (src.canonicalize(), dst.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
