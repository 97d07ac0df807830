//! Lazy directory walker that prunes subtrees the process cannot enter.

use crate::types::{EventSink, RecoveryEvent};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// A walked path and whether the process may read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub readable: bool,
}

impl WalkEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Walker configuration. Each call to [`TreeWalker::walk`] starts a fresh traversal.
///
/// Symbolic links are never followed, so link cycles cannot trap the walk;
/// a link that points at a regular file is reported as a file.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
    max_depth: Option<usize>,
    include_dirs: bool,
    excluded: Vec<PathBuf>,
    events: EventSink,
}

impl TreeWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_depth: None,
            include_dirs: false,
            excluded: Vec::new(),
            events: EventSink::disabled(),
        }
    }

    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Also yield the directories that are entered (never the skipped ones)
    pub fn include_dirs(mut self, yes: bool) -> Self {
        self.include_dirs = yes;
        self
    }

    /// Directories that are never entered, e.g. an output tree nested in the scan root.
    /// Paths are compared as walked, so they must share the walker's root prefix.
    pub fn exclude_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.excluded = dirs;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn walk(&self) -> Walk {
        let mut builder = WalkDir::new(&self.root).follow_links(false);
        if let Some(depth) = self.max_depth {
            builder = builder.max_depth(depth);
        }
        Walk {
            inner: builder.into_iter(),
            max_depth: self.max_depth,
            include_dirs: self.include_dirs,
            excluded: self.excluded.clone(),
            events: self.events.clone(),
            dirs_skipped: 0,
            files_denied: 0,
            errors: 0,
        }
    }
}

/// In-progress traversal. Denied directories are pruned before they are opened.
pub struct Walk {
    inner: walkdir::IntoIter,
    max_depth: Option<usize>,
    include_dirs: bool,
    excluded: Vec<PathBuf>,
    events: EventSink,
    dirs_skipped: usize,
    files_denied: usize,
    errors: usize,
}

impl Walk {
    pub fn dirs_skipped(&self) -> usize {
        self.dirs_skipped
    }

    pub fn files_denied(&self) -> usize {
        self.files_denied
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    fn deny_dir(&mut self, path: &Path) {
        self.inner.skip_current_dir();
        self.dirs_skipped += 1;
        warn!(path = %path.display(), "permission denied scanning directory, skipping subtree");
        self.events.emit(RecoveryEvent::PermissionDenied {
            path: path.to_path_buf(),
            is_dir: true,
        });
    }

    fn deny_file(&mut self, path: &Path) {
        self.files_denied += 1;
        warn!(path = %path.display(), "permission denied reading file");
        self.events.emit(RecoveryEvent::PermissionDenied {
            path: path.to_path_buf(),
            is_dir: false,
        });
    }
}

impl Iterator for Walk {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.errors += 1;
                    let path = err.path().map(Path::to_path_buf);
                    let message = err.to_string();
                    warn!(
                        path = %path.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
                        error = %message,
                        "error while walking directory, continuing"
                    );
                    self.events.emit(RecoveryEvent::WalkError { path, message });
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if self.excluded.iter().any(|dir| dir.as_path() == entry.path()) {
                    debug!(path = %entry.path().display(), "excluded directory, not descending");
                    self.inner.skip_current_dir();
                    continue;
                }
                // Not descended into, so neither checked nor reported
                if self.max_depth.map_or(false, |max| entry.depth() >= max) {
                    continue;
                }
                if !is_traversable(entry.path()) {
                    self.deny_dir(entry.path());
                    continue;
                }
                if self.include_dirs {
                    return Some(WalkEntry {
                        path: entry.into_path(),
                        kind: EntryKind::Dir,
                        readable: true,
                    });
                }
                continue;
            }

            if !is_regular_file(&entry) {
                continue;
            }

            let readable = is_readable(entry.path());
            if !readable {
                self.deny_file(entry.path());
            }
            return Some(WalkEntry {
                path: entry.into_path(),
                kind: EntryKind::File,
                readable,
            });
        }
    }
}

fn is_regular_file(entry: &DirEntry) -> bool {
    let ft = entry.file_type();
    ft.is_file() || (ft.is_symlink() && entry.path().is_file())
}

/// Whether the directory can be listed and entered
pub fn is_traversable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        has_access(path, libc::R_OK | libc::X_OK)
    }
    #[cfg(not(unix))]
    {
        std::fs::read_dir(path).is_ok()
    }
}

/// Whether the file can be opened for reading
pub fn is_readable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        has_access(path, libc::R_OK)
    }
    #[cfg(not(unix))]
    {
        std::fs::File::open(path).is_ok()
    }
}

#[cfg(unix)]
fn has_access(path: &Path, mode: libc::c_int) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    match CString::new(path.as_os_str().as_bytes()) {
        // Safety: `c_path` is a valid NUL-terminated string that outlives the call.
        Ok(c_path) => unsafe { libc::access(c_path.as_ptr(), mode) == 0 },
        Err(_) => false,
    }
}
