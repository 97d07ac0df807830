use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

/// Recovery category of a file. Exactly one per candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Category {
    /// Ableton Live Set (`.als`)
    PrimaryFormat,
    /// Ableton Live Pack (`.alp`, ZIP container)
    ArchiveFormat,
    /// Filename matched a user keyword
    Keyword,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::PrimaryFormat => "ALS",
            Category::ArchiveFormat => "ALP",
            Category::Keyword => "keyword",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An independently walkable partition of the source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanUnit {
    pub root_path: PathBuf,
    pub base_scan_path: PathBuf,
    pub output_base_path: PathBuf,
    pub keywords: Vec<String>,
    /// `None` walks the whole subtree; `Some(1)` only the loose files of `root_path`
    pub max_depth: Option<usize>,
}

impl ScanUnit {
    pub fn new(root_path: PathBuf, base_scan_path: PathBuf, output_base_path: PathBuf, keywords: Vec<String>) -> Self {
        Self {
            root_path,
            base_scan_path,
            output_base_path,
            keywords,
            max_depth: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Re-root `source` under the output base, preserving its path relative to the scan base.
    ///
    /// Returns `None` when `source` does not live under `base_scan_path`.
    pub fn destination_for(&self, source: &Path) -> Option<PathBuf> {
        source
            .strip_prefix(&self.base_scan_path)
            .ok()
            .map(|relative| self.output_base_path.join(relative))
    }
}

/// A file identified for recovery, paired with where it will be copied
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Candidate {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub category: Category,
}

impl Candidate {
    pub fn new(source_path: PathBuf, destination_path: PathBuf, category: Category) -> Self {
        Self {
            source_path,
            destination_path,
            category,
        }
    }
}

/// Candidates bucketed by category, plus walk counters
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub als: Vec<Candidate>,
    pub alp: Vec<Candidate>,
    pub keyword: Vec<Candidate>,
    /// Directories that look like Ableton project folders
    pub project_folders: Vec<PathBuf>,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub dirs_skipped: usize,
}

impl ScanResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_mut(&mut self, category: Category) -> &mut Vec<Candidate> {
        match category {
            Category::PrimaryFormat => &mut self.als,
            Category::ArchiveFormat => &mut self.alp,
            Category::Keyword => &mut self.keyword,
        }
    }

    pub fn push(&mut self, candidate: Candidate) {
        self.bucket_mut(candidate.category).push(candidate);
    }

    /// Append another unit's result; same-category sequences are concatenated.
    pub fn merge(&mut self, other: ScanResult) {
        self.als.extend(other.als);
        self.alp.extend(other.alp);
        self.keyword.extend(other.keyword);
        self.project_folders.extend(other.project_folders);
        self.files_scanned += other.files_scanned;
        self.files_skipped += other.files_skipped;
        self.dirs_skipped += other.dirs_skipped;
    }

    pub fn total(&self) -> usize {
        self.als.len() + self.alp.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// All candidates in category order (ALS, ALP, keyword)
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.als.iter().chain(self.alp.iter()).chain(self.keyword.iter())
    }
}

/// Outcome of copying a single candidate
#[derive(Debug, Clone, Serialize)]
pub struct CopyOutcome {
    pub candidate: Candidate,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub bytes_copied: u64,
}

impl CopyOutcome {
    pub fn succeeded(candidate: Candidate, bytes_copied: u64) -> Self {
        Self {
            candidate,
            success: true,
            failure_reason: None,
            bytes_copied,
        }
    }

    pub fn failed(candidate: Candidate, reason: impl Into<String>) -> Self {
        Self {
            candidate,
            success: false,
            failure_reason: Some(reason.into()),
            bytes_copied: 0,
        }
    }
}

/// Tally of a copy run. `succeeded + failed == outcomes.len()` always holds.
#[derive(Debug, Clone, Default)]
pub struct CopyReport {
    pub outcomes: Vec<CopyOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_copied: u64,
    pub interrupted: bool,
}

impl CopyReport {
    pub fn from_outcomes(outcomes: Vec<CopyOutcome>, interrupted: bool) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;
        let bytes_copied = outcomes.iter().map(|o| o.bytes_copied).sum();
        Self {
            outcomes,
            succeeded,
            failed,
            bytes_copied,
            interrupted,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &CopyOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}

/// Final totals handed to the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub als_found: usize,
    pub alp_found: usize,
    pub keyword_found: usize,
    pub copy_succeeded: usize,
    pub copy_failed: usize,
    pub interrupted: bool,
}

impl RecoverySummary {
    pub fn total_found(&self) -> usize {
        self.als_found + self.alp_found + self.keyword_found
    }
}

/// Progress and diagnostic events streamed to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryEvent {
    /// A file was classified into a category
    CandidateFound(Candidate),
    /// A directory or file was skipped because it is not readable
    PermissionDenied { path: PathBuf, is_dir: bool },
    /// The directory iterator reported an error (non-fatal)
    WalkError { path: Option<PathBuf>, message: String },
    /// A directory that looks like an Ableton project
    ProjectFolder(PathBuf),
    /// A scan unit finished
    UnitCompleted { root: PathBuf, found: usize },
    /// A scan unit panicked; its result is empty
    UnitFailed { root: PathBuf, message: String },
    /// A candidate was copied
    FileCopied(PathBuf),
    /// A candidate could not be copied
    CopyFailed { path: PathBuf, reason: String },
}

/// Optional event channel. Sends to a closed receiver are ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<UnboundedSender<RecoveryEvent>>,
}

impl EventSink {
    pub fn new(sender: UnboundedSender<RecoveryEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: RecoveryEvent) {
        if let Some(ref s) = self.sender {
            if !s.is_closed() {
                let _ = s.send(event);
            }
        }
    }
}
