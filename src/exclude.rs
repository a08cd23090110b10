//! Exclusion predicates: decide whether a node (and its subtree, for directories) is skipped.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use crate::Result;
use crate::entry::WalkEntry;

/// Predicate deciding whether a node is excluded from the walk.
///
/// Returning `Ok(true)` excludes the node silently; for directories the entire
/// subtree is never discovered. Returning `Err` records a per-node walk error
/// and also excludes the node.
pub type MatchFn = dyn Fn(&Path, &WalkEntry) -> Result<bool> + Send + Sync;

/// Shared, swappable excluder. The walker's default is [`match_never`].
pub type Matcher = Arc<MatchFn>;

/// Excludes nothing.
pub fn match_never() -> Matcher {
    Arc::new(|_, _| Ok(false))
}

/// Excludes everything. Mostly useful in tests and as a middleware terminator.
pub fn match_always() -> Matcher {
    Arc::new(|_, _| Ok(true))
}

/// Directory excluder for well-known virtual filesystem roots that are never
/// worth walking (`/proc`, `/dev`, `/sys`).
pub fn virtual_filesystem_dirs() -> Matcher {
    Arc::new(|path, _| Ok(matches!(path.to_str(), Some("/proc" | "/dev" | "/sys"))))
}

/// File excluder for OS-generated metadata files (`.DS_Store`, `._*` resource
/// forks, `Thumbs.db`, and friends).
pub fn os_metadata_files() -> Matcher {
    Arc::new(|path, entry| Ok(!entry.is_dir() && is_os_metadata_file(path)))
}

/// Check if a path names an OS-generated metadata file.
pub fn is_os_metadata_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        match name {
            // macOS
            ".DS_Store" | ".AppleDouble" | ".LSOverride" => true,
            // Windows
            "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" => true,
            // Linux
            ".directory" => true,
            // macOS resource fork files
            _ => name.starts_with("._"),
        }
    } else {
        false
    }
}

/// Excluder matching nodes by exact base name. Handy for callers and tests that
/// want to prune a directory like `node_modules` or `.git`.
pub fn name_list<I, S>(names: I) -> Matcher
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let names: Vec<OsString> = names.into_iter().map(Into::into).collect();
    Arc::new(move |_, entry| Ok(names.iter().any(|n| *n == entry.name())))
}
