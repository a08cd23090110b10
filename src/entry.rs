//! Uniform handle over the walk root's stat result and entries from directory listings.

use std::ffi::OsString;
use std::fs::{self, FileType, Metadata};
use std::io;
use std::path::Path;

/// One file-system node as seen by the walker.
///
/// The root of a walk arrives as an already-resolved stat result; every other
/// node arrives as a lazy [`fs::DirEntry`] from a directory listing. `WalkEntry`
/// papers over the difference so excluders and visit callbacks see one shape.
#[derive(Debug)]
pub struct WalkEntry {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Root { name: OsString, meta: Metadata },
    Listed(fs::DirEntry),
}

impl WalkEntry {
    /// Wrap the stat result of the walk root. Info is already resolved, so
    /// [`info`](WalkEntry::info) cannot fail for this entry.
    pub fn from_root(path: &Path, meta: Metadata) -> Self {
        let name = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| path.as_os_str().to_os_string());
        WalkEntry {
            inner: Inner::Root { name, meta },
        }
    }

    /// Wrap one entry from a directory listing. Info resolution is deferred and
    /// may fail independently of the listing that produced it.
    pub fn from_listing(entry: fs::DirEntry) -> Self {
        WalkEntry {
            inner: Inner::Listed(entry),
        }
    }

    /// Base name of the node (no parent components).
    pub fn name(&self) -> OsString {
        match &self.inner {
            Inner::Root { name, .. } => name.clone(),
            Inner::Listed(e) => e.file_name(),
        }
    }

    pub fn is_dir(&self) -> bool {
        match &self.inner {
            Inner::Root { meta, .. } => meta.is_dir(),
            Inner::Listed(e) => e.file_type().map(|t| t.is_dir()).unwrap_or(false),
        }
    }

    pub fn file_type(&self) -> io::Result<FileType> {
        match &self.inner {
            Inner::Root { meta, .. } => Ok(meta.file_type()),
            Inner::Listed(e) => e.file_type(),
        }
    }

    /// Full file information (size, mode, mtime). Resolved at most once per node
    /// by the walker; listed entries do not follow symlinks, matching the
    /// root's `symlink_metadata` stat.
    pub fn info(&self) -> io::Result<Metadata> {
        match &self.inner {
            Inner::Root { meta, .. } => Ok(meta.clone()),
            Inner::Listed(e) => e.metadata(),
        }
    }
}
