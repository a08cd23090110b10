//! Open-file-limit query used to size the directory-read semaphore (Unix).

use anyhow::Context;

use crate::Result;

/// Ceiling on concurrent directory reads regardless of how high the fd limit is.
pub const MAX_READ_CAPACITY: usize = 1024;

/// Soft limit for max open file descriptors, or `None` if the query itself
/// fails. `RLIM_INFINITY` reports as `u64::MAX` (no practical limit; the
/// capacity ceiling still applies).
#[cfg(unix)]
pub fn max_open_files() -> Option<u64> {
    use std::mem::MaybeUninit;
    let mut rlim = MaybeUninit::<libc::rlimit>::uninit();
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, rlim.as_mut_ptr()) } != 0 {
        return None;
    }
    let rlim = unsafe { rlim.assume_init() };
    let cur = rlim.rlim_cur;
    if cur == libc::RLIM_INFINITY {
        return Some(u64::MAX);
    }
    Some(cur as u64)
}

/// No resource-limit facility outside Unix; callers must supply a capacity
/// override instead.
#[cfg(not(unix))]
pub fn max_open_files() -> Option<u64> {
    None
}

/// Semaphore capacity for one walk: `min(1024, soft fd limit)`, floored at 1.
/// Errors when the limit cannot be read, which fails the walk at start rather
/// than mid-tree with EMFILE.
pub fn read_capacity() -> Result<usize> {
    let limit = max_open_files().context("cannot read the open file limit on this platform")?;
    Ok(limit.min(MAX_READ_CAPACITY as u64).max(1) as usize)
}
