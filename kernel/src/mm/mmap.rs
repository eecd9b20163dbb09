//! Memory-mapped file regions
//!
//! A region maps a whole file at a page-aligned user address through a
//! privately reopened handle (independent seek position). Each covered
//! page gets its own supplemental-page entry tagged with the region id;
//! the region's page list owns those entries and drives writeback and
//! teardown. Unmapping is two-phase: dirty pages are written back to the
//! file first, then frames, mappings, and descriptors are released.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::spt::{PageDescriptor, PageLocation, PagePurpose};
use super::{frame, page_round_up, PAGE_SIZE, PHYS_BASE};
use crate::error::{KernelError, KernelResult};
use crate::fs::{self, File};
use crate::process::Process;

/// Region identifier, unique and monotonically increasing per process.
pub type MmapId = i32;

/// One live file mapping.
pub struct MmapRegion {
    pub id: MmapId,
    /// Page-aligned base address.
    pub addr: usize,
    /// Mapped length in bytes (the file length at mmap time).
    pub size: usize,
    /// Private reopened handle used for fault-in and writeback.
    pub file: File,
    /// Descriptor the mapping was created from.
    pub source_fd: usize,
    /// Page bases of every supplemental-page entry this region owns.
    pub pages: Vec<usize>,
}

/// Per-process registry of live regions.
pub struct MmapTable {
    regions: BTreeMap<MmapId, MmapRegion>,
    next_id: MmapId,
}

impl Default for MmapTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MmapTable {
    pub const fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Ids of all live regions, ascending.
    pub fn ids(&self) -> Vec<MmapId> {
        self.regions.keys().copied().collect()
    }

    pub fn get(&self, id: MmapId) -> Option<&MmapRegion> {
        self.regions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Map the file open on `fd` at `addr`. Returns the new region id.
pub fn mmap(process: &Process, fd: usize, addr: usize) -> KernelResult<MmapId> {
    if fd <= crate::fs::STDOUT {
        return Err(KernelError::InvalidArgument {
            name: "fd",
            value: "console descriptors cannot be mapped",
        });
    }
    let source = {
        let files = process.files.lock();
        files
            .get(fd)
            .cloned()
            .ok_or(KernelError::InvalidArgument {
                name: "fd",
                value: "not an open file",
            })?
    };

    let length = {
        let _fs = fs::lock();
        source.length()
    };
    if length == 0 {
        return Err(KernelError::InvalidArgument {
            name: "fd",
            value: "zero-length file",
        });
    }

    if addr == 0 || addr % PAGE_SIZE != 0 {
        return Err(KernelError::InvalidArgument {
            name: "addr",
            value: "null or unaligned",
        });
    }
    // The page just below the kernel boundary is reserved for the stack.
    if addr >= PHYS_BASE - PAGE_SIZE {
        return Err(KernelError::InvalidArgument {
            name: "addr",
            value: "inside or above the stack guard page",
        });
    }
    if addr <= process.data_end() {
        return Err(KernelError::InvalidArgument {
            name: "addr",
            value: "inside the loaded image",
        });
    }

    let page_count = page_round_up(length) / PAGE_SIZE;
    // Every covered page must be a user page.
    let end = addr + page_count * PAGE_SIZE;
    if end > PHYS_BASE {
        return Err(KernelError::InvalidArgument {
            name: "addr",
            value: "range crosses the kernel boundary",
        });
    }

    let mut mmaps = process.mmaps.lock();
    let mut spt = process.spt.lock();

    for i in 0..page_count {
        if spt.contains(addr + i * PAGE_SIZE) {
            return Err(KernelError::InvalidArgument {
                name: "addr",
                value: "range collides with an existing mapping",
            });
        }
    }

    let handle = {
        let _fs = fs::lock();
        source.reopen()
    };

    let id = mmaps.next_id;
    mmaps.next_id += 1;

    let mut pages = Vec::with_capacity(page_count);
    for i in 0..page_count {
        let vpage = addr + i * PAGE_SIZE;
        let offset = i * PAGE_SIZE;
        let read_bytes = PAGE_SIZE.min(length - offset);
        spt.insert(vpage, PageDescriptor::mmapped(handle.clone(), offset, read_bytes, id));
        pages.push(vpage);
    }

    mmaps.regions.insert(
        id,
        MmapRegion {
            id,
            addr,
            size: length,
            file: handle,
            source_fd: fd,
            pages,
        },
    );
    log::debug!(
        target: "vm",
        "mmap: fd {} -> [{:#x}, {:#x}), region {}", fd, addr, end, id
    );
    Ok(id)
}

/// Tear down a region: write dirty pages back, then release every page.
pub fn munmap(process: &Process, id: MmapId) -> KernelResult<()> {
    let mut mmaps = process.mmaps.lock();
    let region = mmaps
        .regions
        .remove(&id)
        .ok_or(KernelError::NotFound {
            resource: "mmap region",
        })?;
    drop(mmaps);

    let mut spt = process.spt.lock();

    // Phase one: writeback. Holding the SPT lock stalls any in-flight
    // eviction of these pages before it can alter the descriptors.
    for &vpage in &region.pages {
        let Some(descriptor) = spt.lookup(vpage) else { continue };
        debug_assert_eq!(descriptor.purpose, PagePurpose::Mmap);
        let PageLocation::Resident(frame_nr) = descriptor.location else {
            continue;
        };
        let pagedir = process.pagedir.lock();
        // A cleared mapping with the page still resident means an eviction
        // is parked on our SPT lock; its dirty snapshot will be discarded,
        // so treat the page as dirty here.
        let write_back = pagedir.is_dirty(vpage) || pagedir.get_page(vpage).is_none();
        drop(pagedir);
        if write_back {
            // SAFETY: the frame stays attached to this descriptor while we
            // hold the SPT lock; eviction cannot recycle it underneath us.
            let bytes = unsafe { frame::frame_slice(frame_nr) };
            let _fs = fs::lock();
            region.file.write_at(&bytes[..descriptor.read_bytes], descriptor.offset);
        }
    }

    // Phase two: free. Frames, MMU mappings, and descriptors all go.
    for &vpage in &region.pages {
        let Some(descriptor) = spt.remove(vpage) else { continue };
        match descriptor.location {
            PageLocation::Resident(frame_nr) => {
                process.pagedir.lock().clear(vpage);
                frame::free(frame_nr);
            }
            PageLocation::Absent => {}
            PageLocation::Swapped(_) => {
                // Eviction never sends mmap pages to swap.
                debug_assert!(false, "mmap page found on swap");
            }
        }
    }
    log::debug!(target: "vm", "munmap: region {} released", id);
    // Dropping the region closes the reopened handle, exactly once.
    Ok(())
}

/// Unmap every live region. Process-exit path.
pub fn unmap_all(process: &Process) {
    let ids = process.mmaps.lock().ids();
    for id in ids {
        let _ = munmap(process, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_ids_increase() {
        let mut table = MmapTable::new();
        assert!(table.is_empty());
        let first = table.next_id;
        table.next_id += 1;
        let second = table.next_id;
        assert!(second > first);
    }
}
