//! Per-process page directory
//!
//! The MMU interface the core programs: install or clear a virtual-to-
//! physical mapping with a writable bit, and query the hardware-maintained
//! dirty and accessed bits. Here the directory is a software table; the
//! user-memory access layer latches the status bits the way the MMU would.

use alloc::collections::BTreeMap;

use super::frame::FrameNumber;
use super::page_round_down;

#[derive(Debug, Clone, Copy)]
struct Entry {
    frame: FrameNumber,
    writable: bool,
    accessed: bool,
    dirty: bool,
}

/// One process's virtual-to-physical mappings, keyed by page base.
pub struct PageDirectory {
    entries: BTreeMap<usize, Entry>,
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl PageDirectory {
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Map `vpage` to `frame`. Fails (returns false) if a mapping exists.
    pub fn install(&mut self, vpage: usize, frame: FrameNumber, writable: bool) -> bool {
        debug_assert_eq!(vpage, page_round_down(vpage));
        if self.entries.contains_key(&vpage) {
            return false;
        }
        self.entries.insert(
            vpage,
            Entry {
                frame,
                writable,
                accessed: false,
                dirty: false,
            },
        );
        true
    }

    /// Drop the mapping for `vpage`, if any. Status bits vanish with it.
    pub fn clear(&mut self, vpage: usize) {
        self.entries.remove(&vpage);
    }

    /// Physical frame currently backing `vpage`.
    pub fn get_page(&self, vpage: usize) -> Option<FrameNumber> {
        self.entries.get(&vpage).map(|e| e.frame)
    }

    /// Whether the mapping at `vpage` permits writes.
    pub fn is_writable(&self, vpage: usize) -> bool {
        self.entries.get(&vpage).is_some_and(|e| e.writable)
    }

    /// Hardware dirty bit: has the page been written since install?
    pub fn is_dirty(&self, vpage: usize) -> bool {
        self.entries.get(&vpage).is_some_and(|e| e.dirty)
    }

    /// Hardware accessed bit: has the page been touched since last cleared?
    pub fn is_accessed(&self, vpage: usize) -> bool {
        self.entries.get(&vpage).is_some_and(|e| e.accessed)
    }

    /// Clear the accessed bit (second-chance clock tick).
    pub fn clear_accessed(&mut self, vpage: usize) {
        if let Some(e) = self.entries.get_mut(&vpage) {
            e.accessed = false;
        }
    }

    /// Latch the status bits for an access, as the MMU would on a TLB fill.
    pub fn mark_access(&mut self, vpage: usize, write: bool) {
        if let Some(e) = self.entries.get_mut(&vpage) {
            e.accessed = true;
            if write {
                e.dirty = true;
            }
        }
    }

    /// Iterate mapped page bases.
    pub fn mapped_pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_lookup() {
        let mut pd = PageDirectory::new();
        let f = FrameNumber::new(3);
        assert!(pd.install(0x1000, f, true));
        assert_eq!(pd.get_page(0x1000), Some(f));
        assert!(pd.get_page(0x2000).is_none());
    }

    #[test]
    fn double_install_rejected() {
        let mut pd = PageDirectory::new();
        assert!(pd.install(0x1000, FrameNumber::new(1), false));
        assert!(!pd.install(0x1000, FrameNumber::new(2), false));
    }

    #[test]
    fn status_bits_latch_and_clear() {
        let mut pd = PageDirectory::new();
        pd.install(0x1000, FrameNumber::new(0), true);
        assert!(!pd.is_accessed(0x1000));
        assert!(!pd.is_dirty(0x1000));

        pd.mark_access(0x1000, false);
        assert!(pd.is_accessed(0x1000));
        assert!(!pd.is_dirty(0x1000));

        pd.mark_access(0x1000, true);
        assert!(pd.is_dirty(0x1000));

        pd.clear_accessed(0x1000);
        assert!(!pd.is_accessed(0x1000));
        // Dirty survives an accessed-bit sweep.
        assert!(pd.is_dirty(0x1000));
    }

    #[test]
    fn clear_forgets_status() {
        let mut pd = PageDirectory::new();
        pd.install(0x1000, FrameNumber::new(0), true);
        pd.mark_access(0x1000, true);
        pd.clear(0x1000);
        assert!(pd.get_page(0x1000).is_none());
        assert!(!pd.is_dirty(0x1000));
    }
}
