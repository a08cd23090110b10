//! Support-layer tests: semaphore bounds, bounded reader, fd-limit capacity,
//! cancellation tokens, excluders, and the entry abstraction.

use fanwalk::entry::WalkEntry;
use fanwalk::exclude::{
    is_os_metadata_file, match_always, match_never, name_list, os_metadata_files,
    virtual_filesystem_dirs,
};
use fanwalk::reader::{BoundedReader, ReadSemaphore};
use fanwalk::{cancel_pair, fd_limit};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

// --- semaphore ---

#[test]
fn test_semaphore_bounds_concurrent_holders() {
    let sem = Arc::new(ReadSemaphore::new(4));
    let current = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let sem = Arc::clone(&sem);
            let current = Arc::clone(&current);
            let max_seen = Arc::clone(&max_seen);
            thread::spawn(move || {
                let _slot = sem.acquire();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                current.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let max = max_seen.load(Ordering::SeqCst);
    assert!(max >= 1);
    assert!(max <= 4, "semaphore let {max} holders through");
}

#[test]
fn test_semaphore_slot_released_on_guard_drop() {
    let sem = ReadSemaphore::new(1);
    drop(sem.acquire());
    // Would block forever if the first slot leaked.
    drop(sem.acquire());
}

#[test]
fn test_semaphore_capacity_floor() {
    assert_eq!(ReadSemaphore::new(0).capacity(), 1);
    assert_eq!(BoundedReader::new(0).capacity(), 1);
}

// --- bounded reader ---

#[test]
fn test_read_children_returns_full_child_set() {
    let tmp = TempDir::new().unwrap();
    for name in ["one", "two", "three"] {
        fs::write(tmp.path().join(name), b"x").unwrap();
    }
    fs::create_dir(tmp.path().join("sub")).unwrap();

    let reader = BoundedReader::new(4);
    let names: BTreeSet<String> = reader
        .read_children(tmp.path())
        .unwrap()
        .into_iter()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();

    let expected: BTreeSet<String> = ["one", "two", "three", "sub"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(names, expected);
}

#[test]
fn test_read_children_missing_dir_errors() {
    let tmp = TempDir::new().unwrap();
    let reader = BoundedReader::new(4);
    assert!(reader.read_children(&tmp.path().join("absent")).is_err());
}

// --- fd limit ---

#[cfg(unix)]
#[test]
fn test_read_capacity_within_bounds() {
    let capacity = fd_limit::read_capacity().unwrap();
    assert!(capacity >= 1);
    assert!(capacity <= fd_limit::MAX_READ_CAPACITY);
}

#[cfg(unix)]
#[test]
fn test_max_open_files_available() {
    assert!(fd_limit::max_open_files().is_some());
}

// --- cancellation ---

#[test]
fn test_cancel_trips_all_token_clones() {
    let (handle, token) = cancel_pair();
    let clone = token.clone();
    assert!(!token.is_cancelled());

    handle.cancel();
    assert!(token.is_cancelled());
    assert!(clone.is_cancelled());
    // Idempotent.
    handle.cancel();
    assert!(token.is_cancelled());
}

#[test]
fn test_cancel_wakes_select_arm() {
    let (handle, token) = cancel_pair();
    let rx = token.channel().clone();
    let waiter = thread::spawn(move || rx.recv().is_err());
    thread::sleep(Duration::from_millis(10));
    handle.cancel();
    assert!(waiter.join().unwrap());
}

#[test]
fn test_dropping_last_handle_cancels() {
    let (handle, token) = cancel_pair();
    let second = handle.clone();
    drop(handle);
    assert!(!token.is_cancelled());
    drop(second);
    assert!(token.is_cancelled());
}

// --- excluders ---

fn root_entry_for(path: &Path) -> WalkEntry {
    WalkEntry::from_root(path, fs::symlink_metadata(path).unwrap())
}

fn matches(matcher: &fanwalk::Matcher, path: &Path, entry: &WalkEntry) -> bool {
    (matcher.as_ref())(path, entry).unwrap()
}

#[test]
fn test_match_constants() {
    let tmp = TempDir::new().unwrap();
    let entry = root_entry_for(tmp.path());
    assert!(!matches(&match_never(), tmp.path(), &entry));
    assert!(matches(&match_always(), tmp.path(), &entry));
}

#[test]
fn test_virtual_filesystem_dirs() {
    let tmp = TempDir::new().unwrap();
    let entry = root_entry_for(tmp.path());
    let matcher = virtual_filesystem_dirs();
    for vfs in ["/proc", "/dev", "/sys"] {
        assert!(matches(&matcher, Path::new(vfs), &entry), "{vfs}");
    }
    assert!(!matches(&matcher, Path::new("/home"), &entry));
    assert!(!matches(&matcher, Path::new("/proc/self"), &entry));
}

#[test]
fn test_os_metadata_files_matcher() {
    let tmp = TempDir::new().unwrap();
    for name in [".DS_Store", "Thumbs.db", "._resource", "normal.txt"] {
        fs::write(tmp.path().join(name), b"x").unwrap();
    }

    let matcher = os_metadata_files();
    for listed in fs::read_dir(tmp.path()).unwrap() {
        let listed = listed.unwrap();
        let path = listed.path();
        let entry = WalkEntry::from_listing(listed);
        let expect = entry.name() != "normal.txt";
        assert_eq!(matches(&matcher, &path, &entry), expect, "{}", path.display());
    }

    // Directories are never OS metadata, whatever their name.
    fs::create_dir(tmp.path().join("dirs")).unwrap();
    let dir = tmp.path().join("dirs").join(".DS_Store");
    fs::create_dir(&dir).unwrap();
    let entry = root_entry_for(&dir);
    assert!(!matches(&matcher, &dir, &entry));
}

#[test]
fn test_is_os_metadata_file_names() {
    assert!(is_os_metadata_file(Path::new("/a/.DS_Store")));
    assert!(is_os_metadata_file(Path::new("Desktop.ini")));
    assert!(is_os_metadata_file(Path::new("/a/._fork")));
    assert!(!is_os_metadata_file(Path::new("/a/report.txt")));
    assert!(!is_os_metadata_file(Path::new("/")));
}

#[test]
fn test_name_list_matches_exact_names() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("skipme"), b"x").unwrap();
    fs::write(tmp.path().join("keepme"), b"x").unwrap();

    let matcher = name_list(["skipme"]);
    for listed in fs::read_dir(tmp.path()).unwrap() {
        let listed = listed.unwrap();
        let path = listed.path();
        let entry = WalkEntry::from_listing(listed);
        let expect = entry.name() == "skipme";
        assert_eq!(matches(&matcher, &path, &entry), expect);
    }
}

// --- entry abstraction ---

#[test]
fn test_root_entry_resolves_info_without_restat() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("payload");
    fs::write(&file, vec![b'x'; 42]).unwrap();

    let entry = WalkEntry::from_root(&file, fs::symlink_metadata(&file).unwrap());
    assert_eq!(entry.name(), "payload");
    assert!(!entry.is_dir());
    assert!(entry.file_type().unwrap().is_file());
    assert_eq!(entry.info().unwrap().len(), 42);
}

#[test]
fn test_listed_entry_defers_info() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("sub")).unwrap();
    fs::write(tmp.path().join("sub").join("data"), vec![b'x'; 7]).unwrap();

    for listed in fs::read_dir(tmp.path()).unwrap() {
        let entry = WalkEntry::from_listing(listed.unwrap());
        assert_eq!(entry.name(), "sub");
        assert!(entry.is_dir());
        assert!(entry.info().unwrap().is_dir());
    }
}
