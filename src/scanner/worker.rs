use crate::classifier::Classifier;
use crate::config::SignatureConfig;
use crate::pool::CancelToken;
use crate::types::{Candidate, EventSink, RecoveryEvent, ScanResult, ScanUnit};
use crate::walker::{EntryKind, TreeWalker};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Subdirectory names that Ableton Live creates inside a project folder
const PROJECT_DIR_MARKERS: [&str; 2] = ["Samples", "Ableton Project Info"];

/// Walks a single scan unit and classifies every readable file.
///
/// Read-only: nothing is written, only events are emitted.
#[derive(Debug, Clone)]
pub struct ScanWorker {
    signatures: SignatureConfig,
    events: EventSink,
    cancel: CancelToken,
    excluded: Vec<PathBuf>,
}

impl ScanWorker {
    pub fn new(signatures: SignatureConfig, events: EventSink, cancel: CancelToken) -> Self {
        Self {
            signatures,
            events,
            cancel,
            excluded: Vec::new(),
        }
    }

    /// Directories the walk must not enter
    pub fn with_excluded(mut self, excluded: Vec<PathBuf>) -> Self {
        self.excluded = excluded;
        self
    }

    /// Scan `unit`. On cancellation the candidates gathered so far are returned.
    pub fn scan(&self, unit: &ScanUnit) -> ScanResult {
        let classifier = Classifier::new(self.signatures.clone(), &unit.keywords);
        let walker = TreeWalker::new(&unit.root_path)
            .max_depth(unit.max_depth)
            .include_dirs(true)
            .exclude_dirs(self.excluded.clone())
            .with_events(self.events.clone());

        let mut result = ScanResult::new();
        let mut hinted = HashSet::new();
        let mut walk = walker.walk();

        for entry in walk.by_ref() {
            if self.cancel.is_cancelled() {
                debug!(unit = %unit.root_path.display(), "scan cancelled, returning partial result");
                break;
            }

            if entry.kind == EntryKind::Dir {
                if let Some(project) = project_folder_of(&entry.path) {
                    if hinted.insert(project.to_path_buf()) {
                        info!(path = %project.display(), "likely Ableton project folder");
                        self.events.emit(RecoveryEvent::ProjectFolder(project.to_path_buf()));
                        result.project_folders.push(project.to_path_buf());
                    }
                }
                continue;
            }

            if !entry.readable {
                result.files_skipped += 1;
                continue;
            }
            result.files_scanned += 1;

            let Some(destination) = unit.destination_for(&entry.path) else {
                warn!(
                    path = %entry.path.display(),
                    base = %unit.base_scan_path.display(),
                    "file is outside the scan base, skipping"
                );
                result.files_skipped += 1;
                continue;
            };

            if let Some(category) = classifier.classify_path(&entry.path) {
                debug!(path = %entry.path.display(), category = %category, "found candidate");
                let candidate = Candidate::new(entry.path, destination, category);
                self.events.emit(RecoveryEvent::CandidateFound(candidate.clone()));
                result.push(candidate);
            }
        }

        result.dirs_skipped += walk.dirs_skipped();
        result
    }
}

/// The project folder a directory belongs to, when the directory is one of
/// the subfolders Ableton creates.
fn project_folder_of(dir: &Path) -> Option<&Path> {
    let name = dir.file_name()?.to_str()?;
    if PROJECT_DIR_MARKERS.contains(&name) {
        dir.parent()
    } else {
        None
    }
}
