//! Content and filename based classification of candidate files.
//!
//! A file is checked against three signals in precedence order:
//! Ableton Live Set (marker text in the header, or `.als`), Ableton Live Pack
//! (ZIP magic in the first 8 bytes, or `.alp`), then keyword match on the
//! filename. The first signal that matches decides the category.

use crate::config::SignatureConfig;
use crate::error::{RecoveryError, Result};
use crate::types::Category;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Classifies files by header bytes and name
#[derive(Debug, Clone)]
pub struct Classifier {
    signatures: SignatureConfig,
    /// Lower-cased, never empty
    keywords: Vec<String>,
}

impl Classifier {
    pub fn new(signatures: SignatureConfig, keywords: &[String]) -> Self {
        let keywords = keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| k.to_lowercase())
            .collect();
        Self { signatures, keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Decide the category of a file from its name and the bytes read from its start.
    ///
    /// `header` may be empty when the content could not be read; only the
    /// name based signals apply then.
    pub fn classify(&self, file_name: &str, header: &[u8]) -> Option<Category> {
        let lower_name = file_name.to_lowercase();
        let sig = &self.signatures;

        let window = &header[..header.len().min(sig.header_len)];
        if contains_marker(window, &sig.primary_marker)
            || has_extension(&lower_name, &sig.primary_extension)
        {
            return Some(Category::PrimaryFormat);
        }

        if window.starts_with(&sig.archive_magic) || has_extension(&lower_name, &sig.archive_extension) {
            return Some(Category::ArchiveFormat);
        }

        if self.keywords.iter().any(|k| lower_name.contains(k.as_str())) {
            return Some(Category::Keyword);
        }

        None
    }

    /// Read the header of `path` and classify it.
    ///
    /// A failed read is not an error here: the file is classified by name alone.
    pub fn classify_path(&self, path: &Path) -> Option<Category> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match self.read_header(path) {
            Ok(header) => self.classify(&file_name, &header),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "header unreadable, matching by name only");
                self.classify(&file_name, &[])
            }
        }
    }

    /// Read up to `header_len` bytes from the start of `path`
    pub fn read_header(&self, path: &Path) -> Result<Vec<u8>> {
        let file = File::open(path).map_err(|e| RecoveryError::from_io(path, "open", e))?;
        let mut header = Vec::with_capacity(self.signatures.header_len);
        file.take(self.signatures.header_len as u64)
            .read_to_end(&mut header)
            .map_err(|e| RecoveryError::from_io(path, "read header of", e))?;
        Ok(header)
    }
}

/// Drop blank keywords, warning once for each one removed.
///
/// A blank keyword would match every filename.
pub fn sanitize_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| {
            let blank = k.trim().is_empty();
            if blank {
                warn!(keyword = ?k, "ignoring blank keyword, it would match every file");
            }
            !blank
        })
        .cloned()
        .collect()
}

#[inline]
fn contains_marker(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// A bare `.als` name matches as well
#[inline]
fn has_extension(lower_name: &str, extension: &str) -> bool {
    lower_name
        .rsplit_once('.')
        .map_or(false, |(_, ext)| ext == extension)
}
