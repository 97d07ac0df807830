use crate::error::{RecoveryError, Result};
use std::path::PathBuf;

/// `<Ableton Live Set` appears near the top of an uncompressed set
pub const ALS_MARKER: &[u8] = b"<Ableton Live Set";
/// ZIP local-file-header magic that opens every `.alp` pack
pub const ALP_MAGIC: [u8; 8] = *b"PK\x03\x04\x14\x00\x00\x00";
pub const DEFAULT_HEADER_LEN: usize = 4096;
pub const MIN_HEADER_LEN: usize = 256;

/// Content and name signatures used by the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureConfig {
    pub primary_marker: Vec<u8>,
    /// Lower-case, without the dot
    pub primary_extension: String,
    pub archive_magic: [u8; 8],
    pub archive_extension: String,
    /// Bytes read from the start of each file when sniffing content
    pub header_len: usize,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            primary_marker: ALS_MARKER.to_vec(),
            primary_extension: "als".to_string(),
            archive_magic: ALP_MAGIC,
            archive_extension: "alp".to_string(),
            header_len: DEFAULT_HEADER_LEN,
        }
    }
}

impl SignatureConfig {
    pub fn with_header_len(mut self, header_len: usize) -> Self {
        self.header_len = header_len;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.header_len < MIN_HEADER_LEN {
            return Err(RecoveryError::Config(format!(
                "header length {} is below the minimum of {}",
                self.header_len, MIN_HEADER_LEN
            )));
        }
        if self.primary_marker.is_empty() {
            return Err(RecoveryError::Config("primary marker cannot be empty".to_string()));
        }
        if self.primary_marker.len() > self.header_len {
            return Err(RecoveryError::Config(format!(
                "primary marker ({} bytes) does not fit in the header window ({} bytes)",
                self.primary_marker.len(),
                self.header_len
            )));
        }
        Ok(())
    }
}

/// Everything a recovery run needs
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub scan_root: PathBuf,
    pub output_root: PathBuf,
    pub keywords: Vec<String>,
    /// Requested worker count (>= 1)
    pub concurrency: usize,
    /// Forces a concurrency of 1
    pub sequential: bool,
    /// Scan only, copy nothing
    pub dry_run: bool,
    /// Where to write the JSON run report, if anywhere
    pub report_path: Option<PathBuf>,
    pub signatures: SignatureConfig,
}

impl RecoveryConfig {
    pub fn new(scan_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            scan_root: scan_root.into(),
            output_root: output_root.into(),
            keywords: Vec::new(),
            concurrency: default_concurrency(),
            sequential: false,
            dry_run: false,
            report_path: None,
            signatures: SignatureConfig::default(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn effective_concurrency(&self) -> usize {
        if self.sequential {
            1
        } else {
            self.concurrency.max(1)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(RecoveryError::InvalidArgument(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if self.scan_root.as_os_str().is_empty() {
            return Err(RecoveryError::InvalidArgument("scan root cannot be empty".to_string()));
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(RecoveryError::InvalidArgument("output root cannot be empty".to_string()));
        }
        self.signatures.validate()
    }
}

/// Available parallelism, or 1 when it cannot be determined
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_signatures_are_valid() {
        let sig = SignatureConfig::default();
        assert!(sig.validate().is_ok());
        assert_eq!(&sig.archive_magic[..4], b"PK\x03\x04");
    }

    #[test]
    fn test_header_len_minimum() {
        let sig = SignatureConfig::default().with_header_len(64);
        assert!(matches!(sig.validate(), Err(RecoveryError::Config(_))));
    }

    #[test]
    fn test_sequential_forces_single_worker() {
        let config = RecoveryConfig::new("/src", "/out").with_concurrency(8);
        assert_eq!(config.effective_concurrency(), 8);
        assert_eq!(config.sequential(true).effective_concurrency(), 1);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = RecoveryConfig::new("/src", "/out").with_concurrency(0);
        assert!(config.validate().is_err());
    }
}
