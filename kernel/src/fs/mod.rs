//! Filesystem surface consumed by the VM core
//!
//! A flat, RAM-backed file store with the operations the syscall layer and
//! the paging paths need: create, remove, open, reopen, positioned and
//! streaming reads/writes. The real on-disk filesystem and its drivers are
//! outside the core; this module keeps their contract.
//!
//! Every filesystem entry point serializes on one global lock, taken via
//! [`lock`]. Callers must not request user frames while holding it (the
//! eviction path may need the lock for dirty-page writeback).

pub mod blockdev;
pub mod file;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;

use lazy_static::lazy_static;
use spin::{Mutex, MutexGuard};

pub use file::{FdTable, File, FileDescriptor, FD_TABLE_SIZE, STDIN, STDOUT};

use file::Inode;

/// The global filesystem registry: name -> node.
struct FileStore {
    files: BTreeMap<String, Arc<Inode>>,
}

impl FileStore {
    const fn new() -> Self {
        Self {
            files: BTreeMap::new(),
        }
    }
}

lazy_static! {
    static ref FILE_STORE: Mutex<FileStore> = Mutex::new(FileStore::new());
}

/// The single lock serializing filesystem entry points.
static FS_LOCK: Mutex<()> = Mutex::new(());

/// Acquire the global filesystem lock.
///
/// Not reentrant: a thread already holding the guard must pass it down
/// rather than re-acquire.
pub fn lock() -> MutexGuard<'static, ()> {
    FS_LOCK.lock()
}

/// Create a file of the given initial size. Returns false if the name is
/// taken.
pub fn create(name: &str, initial_size: usize) -> bool {
    let mut store = FILE_STORE.lock();
    if store.files.contains_key(name) {
        return false;
    }
    store
        .files
        .insert(name.to_string(), Arc::new(Inode::new(name.to_string(), initial_size)));
    true
}

/// Remove a file by name. Open handles keep the node alive; the name is
/// released immediately. Returns false if no such file.
pub fn remove(name: &str) -> bool {
    FILE_STORE.lock().files.remove(name).is_some()
}

/// Open a file by name with a fresh position.
pub fn open(name: &str) -> Option<File> {
    let store = FILE_STORE.lock();
    store.files.get(name).map(|inode| File::new(Arc::clone(inode)))
}

/// Drop every file. Boot-time reset.
pub fn format() {
    FILE_STORE.lock().files.clear();
}
