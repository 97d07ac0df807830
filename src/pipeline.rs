//! Scan → copy driver.

use crate::config::RecoveryConfig;
use crate::copier::CopyExecutor;
use crate::error::{RecoveryError, Result};
use crate::pool::{CancelToken, WorkerPool};
use crate::report::{write_report, JsonReport, ReportMetadata};
use crate::scanner::{ParallelScanner, ScanRun};
use crate::types::{CopyReport, EventSink, RecoverySummary};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Everything a finished run produced
#[derive(Debug)]
pub struct PipelineRun {
    pub summary: RecoverySummary,
    pub scan: ScanRun,
    /// `None` when nothing was copied (dry run, no matches, or interrupted scan)
    pub copy: Option<CopyReport>,
}

/// Roots after [`RecoveryPipeline::prepare`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRoots {
    /// Canonical scan root
    pub scan_root: PathBuf,
    /// Canonical output root (resolved through its nearest existing ancestor on a dry run)
    pub output_root: PathBuf,
    /// The output root as it appears in the walk, when it is nested in the scan root
    pub excluded: Option<PathBuf>,
}

pub struct RecoveryPipeline {
    config: RecoveryConfig,
    events: EventSink,
    cancel: CancelToken,
}

impl RecoveryPipeline {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
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

    /// Check the scan root and create the output root if it is missing.
    ///
    /// Both roots are resolved before they are compared, so `src/A/..` is
    /// recognised as `src`. An output root equal to the scan root is refused.
    pub fn prepare(&self) -> Result<PreparedRoots> {
        let config = &self.config;
        config.validate()?;

        if !config.scan_root.is_dir() {
            return Err(RecoveryError::InvalidArgument(format!(
                "scan directory does not exist or is not a directory: {}",
                config.scan_root.display()
            )));
        }
        let scan_root = config
            .scan_root
            .canonicalize()
            .map_err(|e| RecoveryError::from_io(&config.scan_root, "resolve", e))?;

        if config.output_root.exists() && !config.output_root.is_dir() {
            return Err(RecoveryError::InvalidArgument(format!(
                "output path exists but is not a directory: {}",
                config.output_root.display()
            )));
        }
        let output_root = resolve_path(&config.output_root)
            .map_err(|e| RecoveryError::from_io(&config.output_root, "resolve", e))?;

        if output_root == scan_root {
            return Err(RecoveryError::InvalidArgument(format!(
                "output directory {} is the scan directory; recovered copies would overwrite their sources",
                config.output_root.display()
            )));
        }

        if !config.output_root.exists() && !config.dry_run {
            fs::create_dir_all(&config.output_root).map_err(|e| RecoveryError::DestinationUnwritable {
                path: config.output_root.clone(),
                source: e,
            })?;
            info!(path = %config.output_root.display(), "created output directory");
        }

        // Walked paths are built from the scan root as given, so the exclusion is too
        let excluded = output_root
            .strip_prefix(&scan_root)
            .ok()
            .map(|relative| config.scan_root.join(relative));
        if let Some(ref dir) = excluded {
            warn!(
                output = %dir.display(),
                "output directory lies inside the scan root; it is left out of the scan"
            );
        }

        Ok(PreparedRoots {
            scan_root,
            output_root,
            excluded,
        })
    }

    pub fn run(&self) -> Result<PipelineRun> {
        let roots = self.prepare()?;
        let config = &self.config;
        let workers = config.effective_concurrency();

        info!("Starting scan:");
        info!("  Source: {}", config.scan_root.display());
        info!("  Destination: {}", config.output_root.display());
        if config.keywords.is_empty() {
            info!("  Keywords: None");
        } else {
            info!("  Keywords: {:?}", config.keywords);
        }
        info!("  Workers: {}", workers);

        let pool = WorkerPool::new(workers).map_err(|e| {
            error!(error = %e, "cannot start worker pool, aborting run");
            e
        })?;

        let mut scanner = ParallelScanner::new(config.signatures.clone())
            .with_events(self.events.clone())
            .with_cancel(self.cancel.clone());
        if let Some(dir) = roots.excluded {
            scanner = scanner.exclude(dir);
        }
        let scan = scanner.scan(&pool, &config.scan_root, &config.output_root, &config.keywords)?;

        let mut summary = RecoverySummary {
            als_found: scan.result.als.len(),
            alp_found: scan.result.alp.len(),
            keyword_found: scan.result.keyword.len(),
            interrupted: scan.interrupted,
            ..Default::default()
        };

        let copy = if scan.interrupted {
            warn!("scan interrupted by user, skipping copy phase");
            None
        } else if scan.result.is_empty() {
            info!("No files matching the criteria were found.");
            None
        } else if config.dry_run {
            info!(files = scan.result.total(), "dry run, nothing copied");
            None
        } else {
            info!("Starting file copy process...");
            let candidates: Vec<_> = scan.result.candidates().cloned().collect();
            let report = CopyExecutor::new()
                .with_events(self.events.clone())
                .with_cancel(self.cancel.clone())
                .copy_all(&pool, &candidates);
            summary.copy_succeeded = report.succeeded;
            summary.copy_failed = report.failed;
            summary.interrupted |= report.interrupted;
            Some(report)
        };

        if let Some(ref path) = config.report_path {
            let metadata = ReportMetadata::new(
                &config.scan_root,
                &config.output_root,
                &config.keywords,
                config.dry_run,
            );
            let report = JsonReport::new(
                metadata,
                &summary,
                copy.as_ref(),
                scan.result.project_folders.clone(),
                scan.duration_secs,
            );
            // The copy already happened; a report failure must not hide the summary
            match write_report(path, &report) {
                Ok(()) => info!(path = %path.display(), "wrote run report"),
                Err(e) => error!(path = %path.display(), error = %e, "could not write run report"),
            }
        }

        Ok(PipelineRun { summary, scan, copy })
    }
}

/// Canonicalize `path`, which need not exist yet: the longest existing
/// ancestor is resolved and the missing tail appended to it.
fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(resolved) => return Ok(missing.iter().rev().fold(resolved, |acc, part| acc.join(part))),
            Err(e) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_scan_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecoveryConfig::new(dir.path().join("missing"), dir.path().join("out"));
        let err = RecoveryPipeline::new(config).run().unwrap_err();
        assert!(matches!(err, RecoveryError::InvalidArgument(_)));
    }

    #[test]
    fn test_output_root_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::write(&out, b"file").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();

        let config = RecoveryConfig::new(dir.path().join("src"), &out);
        assert!(RecoveryPipeline::new(config).prepare().is_err());
    }

    #[test]
    fn test_dry_run_copies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("A")).unwrap();
        fs::write(src.join("A/song.als"), b"x").unwrap();
        let out = dir.path().join("out");

        let config = RecoveryConfig::new(&src, &out).dry_run(true).sequential(true);
        let run = RecoveryPipeline::new(config).run().unwrap();
        assert_eq!(run.summary.als_found, 1);
        assert_eq!(run.summary.copy_succeeded, 0);
        assert!(run.copy.is_none());
        assert!(!out.exists());
    }

    #[test]
    fn test_no_matches_skips_copy_and_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("readme.txt"), b"x").unwrap();
        let report_path = dir.path().join("report.json");

        let config = RecoveryConfig::new(&src, dir.path().join("out")).with_report_path(&report_path);
        let run = RecoveryPipeline::new(config).run().unwrap();
        assert_eq!(run.summary, RecoverySummary::default());
        assert!(run.copy.is_none());
        assert!(Path::new(&report_path).exists());
    }

    #[test]
    fn test_output_equal_to_scan_root_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("A")).unwrap();
        fs::write(src.join("A/song.als"), b"<Ableton Live Set/>").unwrap();

        for output in [src.clone(), src.join("A/.."), src.join(".")] {
            let config = RecoveryConfig::new(&src, &output).sequential(true);
            let err = RecoveryPipeline::new(config).run().unwrap_err();
            assert!(matches!(err, RecoveryError::InvalidArgument(_)), "{}", output.display());
        }
        assert_eq!(fs::read(src.join("A/song.als")).unwrap(), b"<Ableton Live Set/>");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_output_to_scan_root_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        std::os::unix::fs::symlink(&src, dir.path().join("out")).unwrap();

        let config = RecoveryConfig::new(&src, dir.path().join("out"));
        assert!(matches!(
            RecoveryPipeline::new(config).prepare(),
            Err(RecoveryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_nested_output_is_not_rescanned() {
        for nested in ["recovered", "A/recovered"] {
            let dir = tempfile::tempdir().unwrap();
            let src = dir.path().join("src");
            fs::create_dir_all(src.join("A")).unwrap();
            fs::write(src.join("A/song.als"), b"set").unwrap();
            fs::write(src.join("loose.als"), b"set").unwrap();
            let out = src.join(nested);

            for _ in 0..2 {
                let config = RecoveryConfig::new(&src, &out).with_concurrency(2);
                let run = RecoveryPipeline::new(config).run().unwrap();
                assert_eq!(run.summary.als_found, 2, "{nested}");
                assert_eq!(run.summary.copy_succeeded, 2);
            }
            assert_eq!(fs::read(out.join("A/song.als")).unwrap(), b"set");
            assert!(!out.join(nested).exists());
        }
    }

    #[test]
    fn test_prepare_resolves_missing_output_on_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();

        let config = RecoveryConfig::new(&src, src.join("not/yet")).dry_run(true);
        let roots = RecoveryPipeline::new(config).prepare().unwrap();
        assert_eq!(roots.scan_root, src.canonicalize().unwrap());
        assert_eq!(roots.output_root, roots.scan_root.join("not/yet"));
        assert_eq!(roots.excluded, Some(src.join("not/yet")));
        assert!(!src.join("not").exists());
    }
}
