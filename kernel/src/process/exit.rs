//! Process termination and child reaping
//!
//! Every user-visible failure and the EXIT syscall funnel through
//! [`exit_current`]: print the canonical exit line, record the status for
//! the parent, write mapped regions back, and hand every frame, swap
//! slot, and descriptor back to the system. The zombie stays in the table
//! until its parent collects the status, once.

use core::sync::atomic::{AtomicU64, Ordering};

use super::{table, Process, ProcessId};
use crate::mm::spt::PageLocation;
use crate::mm::{frame, mmap, swap};
use crate::println;

static EXITS: AtomicU64 = AtomicU64::new(0);

/// Processes that have terminated since boot.
pub fn exit_count() -> u64 {
    EXITS.load(Ordering::Relaxed)
}

/// Terminate the running process with `status`.
pub fn exit_current(status: i32) {
    let Some(process) = table::current_process() else {
        return;
    };

    println!("{}: exit({})", process.name, status);
    *process.exit_status.lock() = Some(status);

    // Mapped files first: their dirty pages must reach the filesystem
    // before the frames go back to the pool.
    mmap::unmap_all(&process);

    // Reclaim everything else the address space still holds.
    let entries = process.spt.lock().drain();
    for (vpage, descriptor) in entries {
        match descriptor.location {
            PageLocation::Resident(frame_nr) => {
                process.pagedir.lock().clear(vpage);
                frame::free(frame_nr);
            }
            PageLocation::Swapped(slot) => swap::slot_free(slot),
            PageLocation::Absent => {}
        }
    }

    process.files.lock().close_all();
    table::clear_current();
    EXITS.fetch_add(1, Ordering::Relaxed);
    log::debug!(target: "process", "{} exited with status {}", process.pid, status);
}

/// Wait for a direct child to terminate and collect its status. Returns
/// -1 if `pid` is not an unreaped direct child of `parent`.
pub fn wait_child(parent: &Process, pid: ProcessId) -> isize {
    if !parent.children.lock().contains(&pid) {
        return -1;
    }
    let Some(child) = table::get(pid) else {
        // Already reaped.
        return -1;
    };
    if !child.try_reap() {
        return -1;
    }

    loop {
        if let Some(status) = *child.exit_status.lock() {
            table::remove(pid);
            return status as isize;
        }
        // The external scheduler preempts us here; the child runs on.
        core::hint::spin_loop();
    }
}
