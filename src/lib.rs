//! Fanwalk: concurrent directory walker.
//!
//! Recursively enumerates a file-system hierarchy with one concurrent task per
//! discovered node. Task fan-out is unbounded; the expensive resource (open
//! directory handles) is throttled by a counting semaphore sized from the
//! process open-file limit. Discovered nodes and per-node errors flow over
//! channels into a single consumer loop, so the visit callback is never called
//! concurrently. Per-node errors never abort the walk; they are written to a
//! configurable sink and folded into one `had_errors` flag.
//!
//! Walk order is a race between sibling tasks. The only guarantee is causal: a
//! directory is visited before anything under it. Sort visited paths yourself
//! when you need determinism.

pub mod cancel;
pub mod entry;
pub mod exclude;
pub mod fd_limit;
pub mod reader;
pub mod walker;

pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use entry::WalkEntry;
pub use exclude::{Matcher, match_always, match_never};
pub use walker::{WalkHandle, Walker};

use std::fs::Metadata;
use std::path::Path;

/// Result alias used by the public fanwalk API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single-shot convenience: walk `root` with no exclusions, block until the
/// walk completes, and return whether any per-node error occurred.
///
/// ```ignore
/// let had_errors = fanwalk::walk(Path::new("/data"), |path, _entry, info| {
///     println!("{} ({} bytes)", path.display(), info.len());
///     Ok(())
/// })?;
/// ```
///
/// For exclusion filters, cancellation, or a custom error sink, build a
/// [`Walker`] and drive it through [`Walker::start`].
pub fn walk<F>(root: &Path, visit: F) -> Result<bool>
where
    F: FnMut(&Path, &WalkEntry, &Metadata) -> Result<()> + Send + 'static,
{
    let walker = Walker::new();
    let handle = walker.start(None, root, visit)?;
    handle.wait();
    Ok(walker.had_errors())
}
