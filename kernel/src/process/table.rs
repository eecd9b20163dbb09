//! Global process table
//!
//! Pid allocation and lookup for every live (or zombie) process, plus the
//! "currently running" slot the external scheduler maintains.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use spin::Mutex;

use super::{Process, ProcessId};

lazy_static! {
    static ref PROCESS_TABLE: Mutex<BTreeMap<ProcessId, Arc<Process>>> =
        Mutex::new(BTreeMap::new());
}

static NEXT_PID: AtomicU64 = AtomicU64::new(1);

static CURRENT: Mutex<Option<ProcessId>> = Mutex::new(None);

/// Empty the table. Boot-time reset; pids stay monotonic across it.
pub fn init() {
    PROCESS_TABLE.lock().clear();
    *CURRENT.lock() = None;
}

/// Allocate a pid, build the process with it, and register the result.
pub(super) fn register(build: impl FnOnce(ProcessId) -> Process) -> Arc<Process> {
    let pid = ProcessId(NEXT_PID.fetch_add(1, Ordering::Relaxed));
    let process = Arc::new(build(pid));
    if let Some(parent) = process.parent {
        if let Some(parent) = get(parent) {
            parent.children.lock().push(pid);
        }
    }
    PROCESS_TABLE.lock().insert(pid, Arc::clone(&process));
    process
}

pub fn get(pid: ProcessId) -> Option<Arc<Process>> {
    PROCESS_TABLE.lock().get(&pid).cloned()
}

/// Drop a process from the table (reap path).
pub fn remove(pid: ProcessId) {
    PROCESS_TABLE.lock().remove(&pid);
}

pub fn process_count() -> usize {
    PROCESS_TABLE.lock().len()
}

/// The process the external scheduler reports as running.
pub fn current_process() -> Option<Arc<Process>> {
    let pid = (*CURRENT.lock())?;
    get(pid)
}

/// Scheduler hook: announce the running process.
pub fn set_current(pid: ProcessId) {
    *CURRENT.lock() = Some(pid);
}

/// Scheduler hook: nothing is running.
pub fn clear_current() {
    *CURRENT.lock() = None;
}
