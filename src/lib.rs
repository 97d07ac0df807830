//! Ableton Live project recovery
//!
//! Scans a (possibly partly unreadable) directory tree for Ableton Live sets,
//! packs and keyword-matching files and copies them into an output tree that
//! mirrors the source layout:
//! - Content sniffing with name fallback and exclusive categories
//! - Walker that prunes unreadable subtrees instead of failing
//! - Per-subdirectory scan units fanned out over a bounded rayon pool
//! - Panic isolation with catch_unwind, cooperative cancellation
//! - Copy phase that tallies every file and never aborts on one failure
//! - Progress streaming via tokio::sync::mpsc

pub mod classifier;
pub mod cli;
pub mod config;
pub mod copier;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod report;
pub mod scanner;
pub mod types;
pub mod walker;

// Re-export commonly used types
pub use classifier::Classifier;
pub use config::{RecoveryConfig, SignatureConfig};
pub use copier::CopyExecutor;
pub use error::{RecoveryError, Result};
pub use pipeline::{PipelineRun, PreparedRoots, RecoveryPipeline};
pub use pool::{CancelToken, WorkerPool};
pub use scanner::{ParallelScanner, ScanRun, ScanWorker};
pub use types::{Candidate, Category, CopyOutcome, CopyReport, RecoveryEvent, RecoverySummary, ScanResult, ScanUnit};
pub use walker::{TreeWalker, WalkEntry};
