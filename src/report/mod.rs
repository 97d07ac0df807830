//! JSON run report.
//!
//! Records what was found, what could not be copied and why, and a checksum
//! over the summary so an edited report can be spotted.

use crate::error::{RecoveryError, Result};
use crate::types::{CopyReport, RecoverySummary};
use chrono::Local;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const REPORT_VERSION: &str = "1";

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report generation timestamp (RFC 3339, local time)
    pub timestamp: String,
    pub version: String,
    pub tool_name: String,
    pub scan_root: PathBuf,
    pub output_root: PathBuf,
    pub keywords: Vec<String>,
    pub dry_run: bool,
}

impl ReportMetadata {
    pub fn new(scan_root: &Path, output_root: &Path, keywords: &[String], dry_run: bool) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            version: REPORT_VERSION.to_string(),
            tool_name: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            scan_root: scan_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            keywords: keywords.to_vec(),
            dry_run,
        }
    }
}

/// A candidate that could not be copied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedCopy {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub metadata: ReportMetadata,
    pub summary: RecoverySummary,
    pub bytes_copied: u64,
    pub project_folders: Vec<PathBuf>,
    pub failed_copies: Vec<FailedCopy>,
    pub scan_time_sec: f64,
    pub report_checksum: String,
}

impl JsonReport {
    pub fn new(
        metadata: ReportMetadata,
        summary: &RecoverySummary,
        copy: Option<&CopyReport>,
        project_folders: Vec<PathBuf>,
        scan_time_sec: f64,
    ) -> Self {
        let failed_copies = copy
            .map(|c| {
                c.failures()
                    .map(|o| FailedCopy {
                        source: o.candidate.source_path.clone(),
                        destination: o.candidate.destination_path.clone(),
                        reason: o.failure_reason.clone().unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let summary = *summary;
        let report_checksum = calculate_checksum(&metadata, &summary);

        Self {
            metadata,
            summary,
            bytes_copied: copy.map_or(0, |c| c.bytes_copied),
            project_folders,
            failed_copies,
            scan_time_sec,
            report_checksum,
        }
    }

    pub fn verify_checksum(&self) -> bool {
        calculate_checksum(&self.metadata, &self.summary) == self.report_checksum
    }
}

fn calculate_checksum(metadata: &ReportMetadata, summary: &RecoverySummary) -> String {
    let mut hasher = Sha256::new();
    hasher.update(metadata.timestamp.as_bytes());
    hasher.update(metadata.scan_root.to_string_lossy().as_bytes());
    hasher.update(metadata.output_root.to_string_lossy().as_bytes());
    for n in [
        summary.als_found,
        summary.alp_found,
        summary.keyword_found,
        summary.copy_succeeded,
        summary.copy_failed,
    ] {
        hasher.update((n as u64).to_le_bytes());
    }
    hasher.update([summary.interrupted as u8]);
    format!("{:x}", hasher.finalize())
}

/// Write the report through a temporary file and rename it into place
pub fn write_report(path: &Path, report: &JsonReport) -> Result<()> {
    let serialized = serde_json::to_vec_pretty(report)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| RecoveryError::DestinationUnwritable {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&serialized)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

pub fn load_report(path: &Path) -> Result<JsonReport> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
