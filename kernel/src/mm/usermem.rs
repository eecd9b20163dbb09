//! Validated access to user-space memory
//!
//! The syscall layer never dereferences raw user pointers. Every access
//! goes through these helpers, which check the address range, walk the
//! page directory, and latch the accessed/dirty bits the way the MMU
//! would. A miss hands the address to the fault resolver, so touching a
//! lazily loaded buffer pulls it in exactly as a hardware fault would;
//! an unresolvable address surfaces as an error for the dispatcher to
//! turn into a -1 termination.

use alloc::string::String;
use alloc::vec::Vec;

use super::fault::{self, FaultCode};
use super::{frame, page_round_down, PAGE_SIZE, PHYS_BASE};
use crate::error::{KernelError, KernelResult};
use crate::process::Process;

/// Longest string a syscall will pull from user space.
pub const MAX_USER_STRING: usize = 4096;

/// Make the page behind `addr` present, faulting it in if needed.
fn resolve(process: &Process, addr: usize, write: bool) -> KernelResult<()> {
    if addr == 0 || addr >= PHYS_BASE {
        return Err(KernelError::InvalidAddress { addr });
    }
    let vpage = page_round_down(addr);
    loop {
        {
            let pagedir = process.pagedir.lock();
            if pagedir.get_page(vpage).is_some() {
                if write && !pagedir.is_writable(vpage) {
                    return Err(KernelError::PermissionDenied {
                        operation: "write to read-only page",
                    });
                }
                return Ok(());
            }
        }
        let code = if write { FaultCode::WRITE } else { FaultCode::empty() };
        fault::resolve(process, addr, code)?;
    }
}

/// Run `f` over the in-frame bytes behind one user page, holding the page
/// present for the duration.
fn with_page<R>(
    process: &Process,
    addr: usize,
    write: bool,
    f: impl FnOnce(&mut [u8]) -> R,
) -> KernelResult<R> {
    loop {
        resolve(process, addr, write)?;
        let vpage = page_round_down(addr);
        let mut pagedir = process.pagedir.lock();
        let Some(frame_nr) = pagedir.get_page(vpage) else {
            // Evicted between resolution and lock; fault it back in.
            continue;
        };
        pagedir.mark_access(vpage, write);
        // SAFETY: the mapping is present under the held page-directory
        // lock; eviction clears the mapping under this lock before
        // recycling the frame, so the bytes cannot move underneath us.
        let bytes = unsafe { frame::frame_slice(frame_nr) };
        return Ok(f(bytes));
    }
}

/// Copy `bytes` out to user space at `addr`.
pub fn copy_out(process: &Process, addr: usize, bytes: &[u8]) -> KernelResult<()> {
    let mut addr = addr;
    let mut remaining = bytes;
    while !remaining.is_empty() {
        let offset = addr - page_round_down(addr);
        let chunk = remaining.len().min(PAGE_SIZE - offset);
        let (head, tail) = remaining.split_at(chunk);
        with_page(process, addr, true, |page| {
            page[offset..offset + chunk].copy_from_slice(head);
        })?;
        addr += chunk;
        remaining = tail;
    }
    Ok(())
}

/// Copy `len` bytes in from user space at `addr`.
pub fn copy_in(process: &Process, addr: usize, len: usize) -> KernelResult<Vec<u8>> {
    let mut out = Vec::with_capacity(len);
    let mut addr = addr;
    let mut remaining = len;
    while remaining > 0 {
        let offset = addr - page_round_down(addr);
        let chunk = remaining.min(PAGE_SIZE - offset);
        with_page(process, addr, false, |page| {
            out.extend_from_slice(&page[offset..offset + chunk]);
        })?;
        addr += chunk;
        remaining -= chunk;
    }
    Ok(out)
}

/// Read one little-endian 32-bit word from user space.
pub fn copy_in_u32(process: &Process, addr: usize) -> KernelResult<u32> {
    let bytes = copy_in(process, addr, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a NUL-terminated string, touching it byte by byte. Fails softly if
/// no terminator shows up within [`MAX_USER_STRING`] bytes.
pub fn copy_in_string(process: &Process, addr: usize) -> KernelResult<String> {
    let mut out = Vec::new();
    for i in 0..MAX_USER_STRING {
        let byte = copy_in(process, addr + i, 1)?[0];
        if byte == 0 {
            return Ok(String::from_utf8_lossy(&out).into_owned());
        }
        out.push(byte);
    }
    Err(KernelError::InvalidArgument {
        name: "string",
        value: "missing NUL terminator",
    })
}
