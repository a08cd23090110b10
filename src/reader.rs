//! Semaphore-gated directory listing: bounds how many directory reads are in flight at once.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::fs;
use std::io;
use std::path::Path;

/// Fixed-capacity counting semaphore built on a bounded channel: acquiring a
/// slot sends a unit into the channel (blocking while full), releasing receives
/// it back. Release is tied to guard drop so every exit path gives the slot up.
pub struct ReadSemaphore {
    slots_tx: Sender<()>,
    slots_rx: Receiver<()>,
    capacity: usize,
}

impl ReadSemaphore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (slots_tx, slots_rx) = bounded::<()>(capacity);
        ReadSemaphore {
            slots_tx,
            slots_rx,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until a slot is free. The slot is held until the guard drops.
    pub fn acquire(&self) -> SlotGuard<'_> {
        // Cannot disconnect: we hold both ends for the semaphore's lifetime.
        self.slots_tx.send(()).expect("semaphore channel closed");
        SlotGuard {
            slots_rx: &self.slots_rx,
        }
    }
}

/// Holds one semaphore slot; dropping it releases the slot.
pub struct SlotGuard<'a> {
    slots_rx: &'a Receiver<()>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let _ = self.slots_rx.recv();
    }
}

/// Directory reader gated by a [`ReadSemaphore`] so a walk never has more than
/// `capacity` directories open at the same time, whatever the task fan-out.
pub struct BoundedReader {
    sem: ReadSemaphore,
}

impl BoundedReader {
    pub fn new(capacity: usize) -> Self {
        BoundedReader {
            sem: ReadSemaphore::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.sem.capacity()
    }

    /// Read a directory's immediate children, holding one semaphore slot for
    /// the duration of the open + readdir.
    ///
    /// Children come back unsorted: sorting costs allocations and walk order is
    /// a race between sibling tasks anyway. Callers needing determinism sort
    /// the visited paths.
    pub fn read_children(&self, dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
        let _slot = self.sem.acquire();
        fs::read_dir(dir)?.collect()
    }
}
