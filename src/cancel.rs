//! Cooperative cancellation: a token tasks can poll or select on, and a handle that trips it.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Create a linked (handle, token) pair. Cancel through the handle; observe through the token.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = bounded::<()>(0);
    let flag = Arc::new(AtomicBool::new(false));
    let handle = CancelHandle {
        flag: Arc::clone(&flag),
        tx: Arc::new(Mutex::new(Some(tx))),
    };
    let token = CancelToken { flag, rx };
    (handle, token)
}

/// Trips the linked [`CancelToken`]. Clones share one trigger; `cancel` is idempotent.
///
/// Dropping the last clone without calling [`cancel`](CancelHandle::cancel) also
/// trips the token (the channel side disconnects), so keep a handle alive for as
/// long as the work it governs should keep running.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // Dropping the sender disconnects the channel, waking every select arm
        // blocked on the token.
        self.tx.lock().unwrap().take();
    }
}

/// Observer side of a cancellation pair.
///
/// Poll with [`is_cancelled`](CancelToken::is_cancelled), or put
/// [`channel`](CancelToken::channel) in a `crossbeam_channel::select!` recv arm:
/// the channel never carries a message and disconnects on cancel, so the arm
/// fires exactly when the token trips.
#[derive(Clone, Debug)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    rx: Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        // The flag covers explicit cancel; the disconnect check covers a dropped handle.
        self.flag.load(Ordering::SeqCst)
            || matches!(
                self.rx.try_recv(),
                Err(crossbeam_channel::TryRecvError::Disconnected)
            )
    }

    pub fn channel(&self) -> &Receiver<()> {
        &self.rx
    }
}
