//! Concurrent walker engine: one task per discovered node, a single consumer
//! loop that serializes visits and error aggregation, channel-close completion.

use anyhow::{Context as _, bail};
use crossbeam_channel::{Receiver, Sender, bounded, never, select};
use log::debug;
use std::fs::{self, Metadata};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use crate::Result;
use crate::cancel::{CancelHandle, CancelToken, cancel_pair};
use crate::entry::WalkEntry;
use crate::exclude::{Matcher, match_never};
use crate::fd_limit;
use crate::reader::BoundedReader;

/// Capacity of the discovered-entry channel; producers back off here when the
/// visit callback is slower than discovery.
const RESULTS_CAP: usize = 1024;
/// Capacity of the per-node error channel.
const ERRORS_CAP: usize = 256;

/// Visit callback: invoked once per accepted node from the consumer loop,
/// never concurrently. A returned error is aggregated like a per-node walk
/// error (sets [`Walker::had_errors`], one line to the error sink); it does
/// not cancel the walk.
pub type VisitFn = dyn FnMut(&Path, &WalkEntry, &Metadata) -> Result<()> + Send;

/// One accepted node flowing from a walk task to the consumer. Info was
/// resolved once by the task; the consumer and visitor never re-stat.
struct Discovered {
    path: PathBuf,
    entry: WalkEntry,
    info: Metadata,
}

/// A per-node failure. Recorded and reported; never fatal to the walk, and the
/// node that produced it is not published.
struct WalkError {
    path: PathBuf,
    error: anyhow::Error,
}

/// Concurrent directory walker.
///
/// Each discovered node becomes one rayon task: the task resolves the node's
/// info, runs the matching excluder, publishes the node, and (for directories)
/// reads its children through the bounded reader and spawns one task per child.
/// Task count is unbounded; only directory reads are throttled, by a semaphore
/// sized from the process open-file limit.
///
/// A single engine instance runs at most one walk at a time; it is reusable
/// once [`WalkHandle::wait`] returns.
pub struct Walker {
    dir_excluder: Matcher,
    file_excluder: Matcher,
    error_sink: Arc<Mutex<Box<dyn Write + Send>>>,
    read_capacity: Option<usize>,
    in_progress: Arc<AtomicBool>,
    had_errors: Arc<RwLock<bool>>,
}

impl Default for Walker {
    fn default() -> Self {
        Self::new()
    }
}

impl Walker {
    /// New idle engine: no exclusions, errors formatted to stderr, read
    /// capacity derived from the open-file limit at walk start.
    pub fn new() -> Self {
        Walker {
            dir_excluder: match_never(),
            file_excluder: match_never(),
            error_sink: Arc::new(Mutex::new(Box::new(io::stderr()))),
            read_capacity: None,
            in_progress: Arc::new(AtomicBool::new(false)),
            had_errors: Arc::new(RwLock::new(false)),
        }
    }

    /// Replace the directory excluder. Fails while a walk is in progress.
    pub fn set_dir_excluder(&mut self, matcher: Matcher) -> Result<()> {
        self.ensure_idle()?;
        self.dir_excluder = matcher;
        Ok(())
    }

    /// Replace the file excluder. Fails while a walk is in progress.
    pub fn set_file_excluder(&mut self, matcher: Matcher) -> Result<()> {
        self.ensure_idle()?;
        self.file_excluder = matcher;
        Ok(())
    }

    /// Replace the error sink receiving one formatted line per walk error.
    /// Fails while a walk is in progress.
    pub fn set_error_sink(&mut self, sink: Box<dyn Write + Send>) -> Result<()> {
        self.ensure_idle()?;
        self.error_sink = Arc::new(Mutex::new(sink));
        Ok(())
    }

    /// Override the semaphore capacity instead of reading the open-file limit.
    /// The portability hook for platforms without a resource-limit facility,
    /// and the instrumentation hook for tests. Fails while a walk is in
    /// progress.
    pub fn set_read_capacity(&mut self, capacity: usize) -> Result<()> {
        self.ensure_idle()?;
        self.read_capacity = Some(capacity.max(1));
        Ok(())
    }

    /// Whether any per-node error (or visitor error) occurred during the
    /// current or most recent walk. Pollable at any time; authoritative once
    /// [`WalkHandle::wait`] has returned.
    pub fn had_errors(&self) -> bool {
        *self.had_errors.read().unwrap()
    }

    /// Start walking the tree rooted at `root`. Non-blocking: on success the
    /// root task is spawned and the call returns before any node has
    /// necessarily been visited.
    ///
    /// Fails synchronously, with no tasks spawned, when a walk is already in
    /// progress on this engine, when `root` cannot be stat-ed, or when the
    /// open-file limit cannot be read (and no capacity override is set).
    ///
    /// Cancelling `parent` (or the handle on the returned [`WalkHandle`])
    /// stops the consumer loop promptly; in-flight tasks run to completion and
    /// their publishes are dropped. The root is always visited if it can be
    /// stat-ed; excluders are never consulted for it.
    pub fn start<F>(
        &self,
        parent: Option<&CancelToken>,
        root: impl AsRef<Path>,
        visit: F,
    ) -> Result<WalkHandle>
    where
        F: FnMut(&Path, &WalkEntry, &Metadata) -> Result<()> + Send + 'static,
    {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!("walk already in progress on this engine");
        }

        match self.start_locked(parent, root.as_ref(), Box::new(visit)) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                self.in_progress.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Body of [`start`](Walker::start), run with the in-progress guard held.
    /// Any error here must be returned without spawning the walk so the caller
    /// in `start` can clear the guard.
    fn start_locked(
        &self,
        parent: Option<&CancelToken>,
        root: &Path,
        visit: Box<VisitFn>,
    ) -> Result<WalkHandle> {
        let capacity = match self.read_capacity {
            Some(n) => n,
            None => fd_limit::read_capacity()?,
        };
        let root_meta = fs::symlink_metadata(root)
            .with_context(|| format!("cannot stat walk root {}", root.display()))?;
        let root = root.to_path_buf();

        *self.had_errors.write().unwrap() = false;

        let (cancel_handle, token) = cancel_pair();
        let (entry_tx, entry_rx) = bounded::<Discovered>(RESULTS_CAP);
        let (err_tx, err_rx) = bounded::<WalkError>(ERRORS_CAP);
        let (done_tx, done_rx) = bounded::<()>(0);

        debug!(
            "walk start: root {} (read capacity {})",
            root.display(),
            capacity
        );

        let consumer = Consumer {
            visit,
            entry_rx,
            err_rx,
            parent_rx: parent.map(|t| t.channel().clone()).unwrap_or_else(never),
            token_rx: token.channel().clone(),
            cancel: cancel_handle.clone(),
            had_errors: Arc::clone(&self.had_errors),
            error_sink: Arc::clone(&self.error_sink),
            in_progress: Arc::clone(&self.in_progress),
            done_tx,
        };
        thread::spawn(move || consumer.run());

        // The context owns the only copies of the senders. Tasks share it via
        // Arc, so the channels disconnect exactly when the last task exits:
        // that is what ends the consumer's receive loop on the happy path.
        let ctx = Arc::new(WalkContext {
            root: root.clone(),
            dir_excluder: Arc::clone(&self.dir_excluder),
            file_excluder: Arc::clone(&self.file_excluder),
            reader: BoundedReader::new(capacity),
            token: token.clone(),
            entry_tx,
            err_tx,
        });

        let root_entry = WalkEntry::from_root(&root, root_meta);
        rayon::spawn(move || walk_task(ctx, root, root_entry));

        Ok(WalkHandle {
            done: done_rx,
            cancel: cancel_handle,
            token,
        })
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.in_progress.load(Ordering::SeqCst) {
            bail!("cannot reconfigure the engine while a walk is in progress");
        }
        Ok(())
    }
}

/// Handle to one in-flight walk: the done signal plus the cancel trigger.
#[derive(Debug)]
pub struct WalkHandle {
    done: Receiver<()>,
    cancel: CancelHandle,
    token: CancelToken,
}

impl WalkHandle {
    /// Block until the walk has completed or been cancelled and the engine is
    /// torn down (consumer exited, in-progress guard cleared).
    pub fn wait(&self) {
        let _ = self.done.recv();
    }

    /// Stop the walk promptly. Idempotent; in-flight tasks are not force
    /// killed, but their publishes are dropped and they stop recursing.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The walk's own cancellation token (trips on [`cancel`](WalkHandle::cancel)
    /// or on parent cancellation).
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

/// Per-walk state shared by every task.
struct WalkContext {
    root: PathBuf,
    dir_excluder: Matcher,
    file_excluder: Matcher,
    reader: BoundedReader,
    token: CancelToken,
    entry_tx: Sender<Discovered>,
    err_tx: Sender<WalkError>,
}

impl WalkContext {
    /// Publish one accepted node. Returns false when the walk was cancelled
    /// instead of delivering, in which case the task should stop recursing.
    fn publish(&self, found: Discovered) -> bool {
        select! {
            send(self.entry_tx, found) -> res => res.is_ok(),
            recv(self.token.channel()) -> _ => false,
        }
    }

    /// Report one per-node error. Dropped silently when the walk was cancelled.
    fn report(&self, path: PathBuf, error: anyhow::Error) {
        let err = WalkError { path, error };
        select! {
            send(self.err_tx, err) -> _ => {}
            recv(self.token.channel()) -> _ => {}
        }
    }
}

/// One task, one node. Resolve info, filter, publish, and for directories read
/// children through the bounded reader and spawn one task each.
///
/// Per-node failures stop only the subtree rooted here; siblings and cousins
/// are untouched. The last task to exit drops the last channel senders, which
/// is the walk's completion signal.
fn walk_task(ctx: Arc<WalkContext>, path: PathBuf, entry: WalkEntry) {
    if ctx.token.is_cancelled() {
        return;
    }

    let info = match entry.info() {
        Ok(info) => info,
        Err(err) => {
            ctx.report(path, anyhow::Error::new(err).context("resolve file info"));
            return;
        }
    };
    let is_dir = info.is_dir();

    // The root is always visited if it could be stat-ed.
    if path != ctx.root {
        let excluder = if is_dir {
            &ctx.dir_excluder
        } else {
            &ctx.file_excluder
        };
        match (excluder.as_ref())(&path, &entry) {
            Ok(false) => {}
            // Excluded: silent, no publish, no recursion. Not an error.
            Ok(true) => return,
            Err(err) => {
                ctx.report(path, err.context("exclusion predicate failed"));
                return;
            }
        }
    }

    if !ctx.publish(Discovered {
        path: path.clone(),
        entry,
        info,
    }) {
        return;
    }

    if is_dir {
        let children = match ctx.reader.read_children(&path) {
            Ok(children) => children,
            Err(err) => {
                ctx.report(path, anyhow::Error::new(err).context("read directory"));
                return;
            }
        };
        for child in children {
            if ctx.token.is_cancelled() {
                return;
            }
            let child_path = path.join(child.file_name());
            let child_ctx = Arc::clone(&ctx);
            rayon::spawn(move || walk_task(child_ctx, child_path, WalkEntry::from_listing(child)));
        }
    }
}

/// The single consumer: serializes visit callbacks and error aggregation.
struct Consumer {
    visit: Box<VisitFn>,
    entry_rx: Receiver<Discovered>,
    err_rx: Receiver<WalkError>,
    parent_rx: Receiver<()>,
    token_rx: Receiver<()>,
    cancel: CancelHandle,
    had_errors: Arc<RwLock<bool>>,
    error_sink: Arc<Mutex<Box<dyn Write + Send>>>,
    in_progress: Arc<AtomicBool>,
    done_tx: Sender<()>,
}

impl Consumer {
    fn run(mut self) {
        let mut visited = 0_usize;
        let mut errors = 0_usize;
        let mut cancelled = false;

        loop {
            select! {
                recv(self.parent_rx) -> _ => {
                    // Parent cancellation trips the walk's own token so tasks
                    // observe it too.
                    self.cancel.cancel();
                    cancelled = true;
                    break;
                }
                recv(self.token_rx) -> _ => {
                    cancelled = true;
                    break;
                }
                recv(self.entry_rx) -> msg => match msg {
                    Ok(found) => {
                        visited += 1;
                        if let Err(err) = (self.visit)(&found.path, &found.entry, &found.info) {
                            errors += 1;
                            record_error(&self.had_errors, &self.error_sink, &found.path, &err);
                        }
                    }
                    // All tasks finished and dropped their senders.
                    Err(_) => break,
                },
                recv(self.err_rx) -> msg => match msg {
                    Ok(walk_err) => {
                        errors += 1;
                        record_error(
                            &self.had_errors,
                            &self.error_sink,
                            &walk_err.path,
                            &walk_err.error,
                        );
                    }
                    Err(_) => break,
                },
            }
        }

        if !cancelled {
            // Both channels share the same senders and disconnect together, so
            // whichever disconnect broke the loop, the other side may still
            // hold buffered messages. Drain them.
            for found in self.entry_rx.try_iter() {
                visited += 1;
                if let Err(err) = (self.visit)(&found.path, &found.entry, &found.info) {
                    errors += 1;
                    record_error(&self.had_errors, &self.error_sink, &found.path, &err);
                }
            }
            for walk_err in self.err_rx.try_iter() {
                errors += 1;
                record_error(
                    &self.had_errors,
                    &self.error_sink,
                    &walk_err.path,
                    &walk_err.error,
                );
            }
        }

        debug!(
            "walk done: {} visited, {} errors{}",
            visited,
            errors,
            if cancelled { " (cancelled)" } else { "" }
        );
        self.in_progress.store(false, Ordering::SeqCst);
        // Dropping the done sender releases every wait().
        drop(self.done_tx);
    }
}

fn record_error(
    had_errors: &RwLock<bool>,
    sink: &Mutex<Box<dyn Write + Send>>,
    path: &Path,
    error: &anyhow::Error,
) {
    *had_errors.write().unwrap() = true;
    let mut sink = sink.lock().unwrap();
    let _ = writeln!(sink, "walk error: {}: {:#}", path.display(), error);
}
