//! Process control
//!
//! The process control block owns everything the VM core tracks per
//! process: page directory, supplemental page table, file descriptors,
//! and mmap regions. Scheduling is external; the scheduler announces the
//! running process through [`table::set_current`], and the saved user
//! stack pointer is parked here for faults taken in kernel mode.

pub mod exit;
pub mod table;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::error::{KernelError, KernelResult};
use crate::fs::{FdTable, File};
use crate::mm::mmap::MmapTable;
use crate::mm::page_dir::PageDirectory;
use crate::mm::spt::{PageDescriptor, SuppPageTable};
use crate::mm::{PAGE_SIZE, PHYS_BASE};

pub use exit::{exit_current, wait_child};
pub use table::{current_process, set_current};

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessId(pub u64);

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process Control Block
pub struct Process {
    pub pid: ProcessId,
    pub name: String,
    pub parent: Option<ProcessId>,

    /// MMU state for this address space.
    pub pagedir: Mutex<PageDirectory>,
    /// Supplemental page table.
    pub spt: Mutex<SuppPageTable>,
    /// Open files.
    pub files: Mutex<FdTable>,
    /// Live memory-mapped regions.
    pub mmaps: Mutex<MmapTable>,

    pub children: Mutex<Vec<ProcessId>>,
    /// Set exactly once, when the process terminates.
    pub exit_status: Mutex<Option<i32>>,
    /// A parent may collect the exit status only once.
    waited: AtomicBool,

    /// User stack pointer, saved at every kernel entry so faults taken in
    /// kernel mode can still apply the stack-growth heuristic.
    saved_esp: AtomicUsize,
    /// First byte past the loaded image; mmap may not cover it.
    data_end: AtomicUsize,
}

impl Process {
    fn new(pid: ProcessId, name: String, parent: Option<ProcessId>) -> Self {
        Self {
            pid,
            name,
            parent,
            pagedir: Mutex::new(PageDirectory::new()),
            spt: Mutex::new(SuppPageTable::new()),
            files: Mutex::new(FdTable::new()),
            mmaps: Mutex::new(MmapTable::new()),
            children: Mutex::new(Vec::new()),
            exit_status: Mutex::new(None),
            waited: AtomicBool::new(false),
            saved_esp: AtomicUsize::new(PHYS_BASE),
            data_end: AtomicUsize::new(0),
        }
    }

    pub fn saved_esp(&self) -> usize {
        self.saved_esp.load(Ordering::Acquire)
    }

    /// Record the user stack pointer at kernel entry.
    pub fn set_saved_esp(&self, esp: usize) {
        self.saved_esp.store(esp, Ordering::Release);
    }

    /// Lower the saved stack pointer after successful stack growth. Policy
    /// knob, not a correctness invariant.
    pub fn lower_saved_esp(&self, addr: usize) {
        self.saved_esp.fetch_min(addr, Ordering::AcqRel);
    }

    pub fn data_end(&self) -> usize {
        self.data_end.load(Ordering::Acquire)
    }

    fn raise_data_end(&self, end: usize) {
        self.data_end.fetch_max(end, Ordering::AcqRel);
    }

    /// Whether this process has terminated.
    pub fn has_exited(&self) -> bool {
        self.exit_status.lock().is_some()
    }

    /// Mark this process reaped; returns false if it already was.
    pub(crate) fn try_reap(&self) -> bool {
        !self.waited.swap(true, Ordering::AcqRel)
    }

    /// Register a segment of the executable image for lazy loading: one
    /// file-backed page descriptor per page, no I/O. The loader calls this
    /// while building the address space.
    pub fn load_segment(
        &self,
        file: &File,
        mut offset: usize,
        mut upage: usize,
        mut read_bytes: usize,
        mut zero_bytes: usize,
        writable: bool,
    ) -> KernelResult<()> {
        assert_eq!(offset % PAGE_SIZE, 0);
        assert_eq!(upage % PAGE_SIZE, 0);
        assert_eq!((read_bytes + zero_bytes) % PAGE_SIZE, 0);

        let end = upage + read_bytes + zero_bytes;
        if end > PHYS_BASE {
            return Err(KernelError::InvalidAddress { addr: end });
        }

        let mut spt = self.spt.lock();
        while read_bytes > 0 || zero_bytes > 0 {
            let page_read = read_bytes.min(PAGE_SIZE);
            let page_zero = PAGE_SIZE - page_read;
            spt.insert(
                upage,
                PageDescriptor::file_backed(file.clone(), offset, page_read, page_zero, writable),
            );
            read_bytes -= page_read;
            zero_bytes -= page_zero;
            offset += PAGE_SIZE;
            upage += PAGE_SIZE;
        }
        drop(spt);

        self.raise_data_end(end);
        Ok(())
    }
}

/// Create a process and register it, linking it under `parent`.
pub fn spawn(name: &str, parent: Option<ProcessId>) -> Arc<Process> {
    table::register(|pid| Process::new(pid, String::from(name), parent))
}
