use crate::config::{default_concurrency, RecoveryConfig, SignatureConfig, DEFAULT_HEADER_LEN, MIN_HEADER_LEN};
use clap::Parser;
use std::path::PathBuf;

/// Recover Ableton Live sets (.als), packs (.alp) and keyword-matching files
/// from a directory tree, mirroring their layout under an output directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "als-recovery")]
#[command(version)]
#[command(about = "Recover Ableton Live (.als, .alp) and keyword-matching files", long_about = None)]
pub struct Args {
    /// Root directory to start scanning from
    #[arg(value_name = "SCAN_DIRECTORY")]
    pub scan_directory: PathBuf,

    /// Directory where recovered files are saved (structure is preserved)
    #[arg(value_name = "OUTPUT_DIRECTORY")]
    pub output_directory: PathBuf,

    /// Keywords to look for in filenames (case-insensitive)
    #[arg(short = 'k', long = "keywords", num_args = 0..)]
    pub keywords: Vec<String>,

    /// Number of parallel workers (default: available parallelism)
    #[arg(short = 'p', long = "processes")]
    pub processes: Option<usize>,

    /// Enable verbose debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Disable parallel processing (run sequentially)
    #[arg(long = "no-parallel")]
    pub no_parallel: bool,

    /// Scan and report matches without copying anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Write a JSON run report to this path
    #[arg(long = "report", value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Bytes read from the start of each file when sniffing its content
    #[arg(long = "header-len", default_value_t = DEFAULT_HEADER_LEN)]
    pub header_len: usize,
}

impl Args {
    /// Validate the arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.scan_directory.as_os_str().is_empty() {
            return Err("Scan directory cannot be empty".to_string());
        }

        if self.output_directory.as_os_str().is_empty() {
            return Err("Output directory cannot be empty".to_string());
        }

        if self.processes == Some(0) {
            return Err("processes must be greater than 0".to_string());
        }

        if self.header_len < MIN_HEADER_LEN {
            return Err(format!(
                "header-len ({}) must be at least {}",
                self.header_len, MIN_HEADER_LEN
            ));
        }

        Ok(())
    }

    pub fn concurrency(&self) -> usize {
        self.processes.unwrap_or_else(default_concurrency)
    }

    pub fn into_config(self) -> RecoveryConfig {
        let concurrency = self.concurrency();
        let mut config = RecoveryConfig::new(self.scan_directory, self.output_directory)
            .with_keywords(self.keywords)
            .with_concurrency(concurrency)
            .sequential(self.no_parallel)
            .dry_run(self.dry_run);
        if let Some(report) = self.report {
            config = config.with_report_path(report);
        }
        config.signatures = SignatureConfig::default().with_header_len(self.header_len);
        config
    }
}
