//! Memory-mapping system calls
//!
//! Every rejection here is a soft failure: the process keeps running and
//! sees -1.

use crate::error::KernelResult;
use crate::mm::mmap::{self, MmapId};
use crate::process::Process;

pub fn sys_mmap(process: &Process, fd: usize, addr: usize) -> KernelResult<isize> {
    match mmap::mmap(process, fd, addr) {
        Ok(id) => Ok(id as isize),
        Err(error) => {
            log::debug!(target: "vm", "mmap rejected: {}", error);
            Ok(-1)
        }
    }
}

pub fn sys_munmap(process: &Process, id: MmapId) -> KernelResult<isize> {
    match mmap::munmap(process, id) {
        Ok(()) => Ok(0),
        Err(_) => Ok(-1),
    }
}
