//! Virtual memory core
//!
//! Three coupled tables make a page present on demand: the per-process
//! supplemental page table ([`spt`]) describing every page a process owns,
//! the global frame table ([`frame`]) over the fixed user-frame pool, and
//! the swap device bitmap ([`swap`]). The fault resolver ([`fault`]) drives
//! them; [`usermem`] rides the same machinery to validate and copy
//! user-space buffers for the syscall layer.
//!
//! Lock order, outermost first: per-process SPT, frame table, page
//! directory, swap bitmap, filesystem. Eviction drops the frame-table lock
//! before any spill I/O and reacquires it afterwards.

pub mod fault;
pub mod frame;
pub mod mmap;
pub mod page_dir;
pub mod spt;
pub mod swap;
pub mod usermem;

use alloc::boxed::Box;
use alloc::string::ToString;

use crate::fs::blockdev::RamBlockDevice;

/// Size of a page and of a physical frame, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// First kernel virtual address; user space lies strictly below.
pub const PHYS_BASE: usize = 0xC000_0000;

/// Maximum stack size: 8 MiB ending at `PHYS_BASE`.
pub const STACK_LIMIT: usize = PHYS_BASE - 8 * 1024 * 1024;

/// Round an address down to its page base.
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Round a byte count up to whole pages.
pub const fn page_round_up(len: usize) -> usize {
    (len + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// True for addresses a user mapping may cover.
pub const fn is_user_vaddr(addr: usize) -> bool {
    addr < PHYS_BASE
}

/// Boot-time sizing of the VM subsystem.
#[derive(Debug, Clone, Copy)]
pub struct VmConfig {
    /// Number of frames in the user pool.
    pub user_frames: usize,
    /// Number of page-sized slots on the swap partition.
    pub swap_slots: usize,
}

impl VmConfig {
    pub const DEFAULT_USER_FRAMES: usize = 256;
    pub const DEFAULT_SWAP_SLOTS: usize = 1024;
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            user_frames: Self::DEFAULT_USER_FRAMES,
            swap_slots: Self::DEFAULT_SWAP_SLOTS,
        }
    }
}

/// Bring up the frame pool and the swap device.
pub fn init(config: &VmConfig) {
    frame::init(config.user_frames);
    let sectors = (config.swap_slots * swap::SECTORS_PER_SLOT) as u64;
    let device = RamBlockDevice::new("swap".to_string(), swap::SECTOR_SIZE, sectors);
    swap::init(Box::new(device));
    log::info!(
        target: "vm",
        "vm ready: {} user frames, {} swap slots",
        config.user_frames,
        config.swap_slots
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_rounding() {
        assert_eq!(page_round_down(0x1234), 0x1000);
        assert_eq!(page_round_down(0x1000), 0x1000);
        assert_eq!(page_round_up(1), PAGE_SIZE);
        assert_eq!(page_round_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_round_up(PAGE_SIZE + 1), 2 * PAGE_SIZE);
    }

    #[test]
    fn user_kernel_split() {
        assert!(is_user_vaddr(0));
        assert!(is_user_vaddr(PHYS_BASE - 1));
        assert!(!is_user_vaddr(PHYS_BASE));
        assert_eq!(PHYS_BASE - STACK_LIMIT, 8 * 1024 * 1024);
    }
}
