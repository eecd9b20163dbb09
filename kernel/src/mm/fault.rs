//! Page-fault classification and resolution
//!
//! Classifies a faulting address against the process's supplemental page
//! table and drives the frame, swap, and filesystem layers to make the
//! page present: lazy file load, stack growth, swap-in, or write-
//! protection enforcement. An error return means the fault is not
//! resolvable and the process must die with status -1; a kernel-mode
//! fault that reaches that state panics instead.

use bitflags::bitflags;
use core::sync::atomic::{AtomicU64, Ordering};

use super::frame;
use super::spt::{PageDescriptor, PageLocation, PagePurpose};
use super::swap;
use super::{page_round_down, PHYS_BASE, STACK_LIMIT};
use crate::error::{KernelError, KernelResult};
use crate::fs;
use crate::process::{self, Process};

bitflags! {
    /// Page-fault error code, as latched by the trap prologue.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FaultCode: u32 {
        /// Set for permission faults; clear when the page was not present.
        const PRESENT = 1 << 0;
        /// The faulting access was a write.
        const WRITE = 1 << 1;
        /// The fault happened in user mode.
        const USER = 1 << 2;
    }
}

/// Slack below the stack pointer that still counts as stack access
/// (PUSHA writes 32 bytes below esp before esp moves).
const STACK_HEURISTIC_SLACK: usize = 32;

static PAGE_FAULTS: AtomicU64 = AtomicU64::new(0);

/// Page faults taken since boot.
pub fn fault_count() -> u64 {
    PAGE_FAULTS.load(Ordering::Relaxed)
}

/// Trap-level entry point. Resolves the fault or ends the offender: a
/// user-mode fault terminates the process with status -1, a kernel-mode
/// fault is unrecoverable.
pub fn page_fault_handler(addr: usize, code: FaultCode) {
    let process = process::current_process().expect("page fault with no current process");
    if let Err(error) = resolve(&process, addr, code) {
        if code.contains(FaultCode::USER) {
            log::warn!(
                target: "vm",
                "unresolvable fault at {:#x} ({:?}): {}", addr, code, error
            );
            process::exit_current(-1);
        } else {
            panic!(
                "kernel page fault at {:#x} (code {:?}, process {}): {}",
                addr, code, process.pid, error
            );
        }
    }
}

/// Resolve one fault for `process`. On success the page is present and its
/// frame is evictable again.
pub fn resolve(process: &Process, addr: usize, code: FaultCode) -> KernelResult<()> {
    PAGE_FAULTS.fetch_add(1, Ordering::Relaxed);

    if addr == 0 || addr >= PHYS_BASE {
        return Err(KernelError::InvalidAddress { addr });
    }
    let vpage = page_round_down(addr);

    let snapshot = process.spt.lock().lookup(vpage).cloned();
    match snapshot {
        None => grow_stack(process, addr, vpage),
        Some(descriptor) => {
            if code.contains(FaultCode::WRITE) && !descriptor.writable {
                return Err(KernelError::PermissionDenied {
                    operation: "write to read-only page",
                });
            }
            match descriptor.location {
                // Another fault on this page won the race; nothing to do.
                PageLocation::Resident(_) => Ok(()),
                PageLocation::Swapped(slot) => swap_in(process, vpage, slot),
                PageLocation::Absent => match descriptor.purpose {
                    PagePurpose::File | PagePurpose::Mmap => {
                        load_from_file(process, vpage, &descriptor)
                    }
                    PagePurpose::Stack => {
                        let frame_nr = frame::alloc(true);
                        mark_resident(process, vpage, frame_nr, true);
                        frame::install_and_unpin(
                            frame_nr,
                            &process.pagedir,
                            process.pid,
                            vpage,
                            true,
                        );
                        process.lower_saved_esp(addr);
                        Ok(())
                    }
                },
            }
        }
    }
}

/// The stack-growth heuristic: a miss close under the saved stack pointer
/// and within the stack ceiling grows the stack by one zeroed page.
fn grow_stack(process: &Process, addr: usize, vpage: usize) -> KernelResult<()> {
    if addr < STACK_LIMIT {
        return Err(KernelError::InvalidAddress { addr });
    }
    let esp = process.saved_esp();
    if addr + STACK_HEURISTIC_SLACK < esp {
        return Err(KernelError::InvalidAddress { addr });
    }

    let frame_nr = frame::alloc(true);
    {
        let mut spt = process.spt.lock();
        let mut descriptor = PageDescriptor::stack();
        descriptor.location = PageLocation::Resident(frame_nr);
        spt.insert(vpage, descriptor);
    }
    frame::install_and_unpin(frame_nr, &process.pagedir, process.pid, vpage, true);
    process.lower_saved_esp(addr);
    log::trace!(target: "vm", "stack grown to {:#x}", vpage);
    Ok(())
}

/// Bring a swapped page back. The slot is released once read; the page
/// keeps its private marking so a later eviction spills it again.
fn swap_in(process: &Process, vpage: usize, slot: swap::SwapSlot) -> KernelResult<()> {
    let frame_nr = frame::alloc(false);
    swap::read_slot(slot, frame_nr);
    swap::slot_free(slot);

    let writable = mark_resident(process, vpage, frame_nr, true);
    frame::install_and_unpin(frame_nr, &process.pagedir, process.pid, vpage, writable);
    Ok(())
}

/// Populate a file-backed page: read `read_bytes` at the descriptor's
/// offset, zero the rest. A short read releases the frame and kills the
/// fault.
fn load_from_file(
    process: &Process,
    vpage: usize,
    descriptor: &PageDescriptor,
) -> KernelResult<()> {
    let file = descriptor
        .file
        .as_ref()
        .expect("file-backed page without a file");
    let frame_nr = frame::alloc(false);

    // SAFETY: the frame is pinned and unpublished until installed below.
    let bytes = unsafe { frame::frame_slice(frame_nr) };
    let read = {
        let _fs = fs::lock();
        file.read_at(&mut bytes[..descriptor.read_bytes], descriptor.offset)
    };
    if read != descriptor.read_bytes {
        frame::free(frame_nr);
        return Err(KernelError::ShortRead {
            expected: descriptor.read_bytes,
            actual: read,
        });
    }
    bytes[descriptor.read_bytes..].fill(0);

    let writable = mark_resident(process, vpage, frame_nr, false);
    frame::install_and_unpin(frame_nr, &process.pagedir, process.pid, vpage, writable);
    Ok(())
}

/// Flip the descriptor to resident and return its writability.
fn mark_resident(process: &Process, vpage: usize, frame_nr: frame::FrameNumber, private: bool) -> bool {
    let mut spt = process.spt.lock();
    let descriptor = spt
        .lookup_mut(vpage)
        .expect("faulting page descriptor vanished");
    descriptor.location = PageLocation::Resident(frame_nr);
    if private {
        descriptor.private = true;
    }
    descriptor.writable
}
