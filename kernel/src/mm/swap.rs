//! Swap device: page-sized slots over a block device
//!
//! The swap partition is a flat array of `PAGE_SIZE` slots with no header
//! and no persistence across reboots. A bitmap tracks slot occupancy;
//! allocation is a first-fit scan under the device lock. Transfers move
//! `SECTORS_PER_SLOT` sectors per page and block the caller; the target
//! frame must be pinned for the duration.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use super::{frame, frame::FrameNumber, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::fs::blockdev::BlockDevice;

/// Sector size the swap partition is addressed in.
pub const SECTOR_SIZE: usize = 512;

/// Sectors occupied by one swap slot.
pub const SECTORS_PER_SLOT: usize = PAGE_SIZE / SECTOR_SIZE;

/// Index of a slot on the swap partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapSlot(usize);

impl SwapSlot {
    pub const fn index(&self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Bitmap
// ---------------------------------------------------------------------------

/// Fixed-size occupancy bitmap with first-fit scan.
struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    fn new(len: usize) -> Self {
        Self {
            words: alloc::vec![0u64; len.div_ceil(64)],
            len,
        }
    }

    fn set(&mut self, bit: usize, value: bool) {
        assert!(bit < self.len);
        let mask = 1u64 << (bit % 64);
        if value {
            self.words[bit / 64] |= mask;
        } else {
            self.words[bit / 64] &= !mask;
        }
    }

    fn get(&self, bit: usize) -> bool {
        assert!(bit < self.len);
        self.words[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    /// First clear bit, marked set; `None` when full.
    fn alloc_first_fit(&mut self) -> Option<usize> {
        for (w, word) in self.words.iter_mut().enumerate() {
            if *word != u64::MAX {
                let bit = word.trailing_ones() as usize;
                let index = w * 64 + bit;
                if index >= self.len {
                    return None;
                }
                *word |= 1u64 << bit;
                return Some(index);
            }
        }
        None
    }

    fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

// ---------------------------------------------------------------------------
// Device state
// ---------------------------------------------------------------------------

struct SwapDevice {
    device: Box<dyn BlockDevice>,
    bitmap: Bitmap,
}

static SWAP: Mutex<Option<SwapDevice>> = Mutex::new(None);

static SWAP_OUTS: AtomicU64 = AtomicU64::new(0);
static SWAP_INS: AtomicU64 = AtomicU64::new(0);

/// Adopt `device` as the swap partition. Previous contents are irrelevant;
/// every slot starts free.
pub fn init(device: Box<dyn BlockDevice>) {
    assert_eq!(device.block_size(), SECTOR_SIZE, "swap expects 512-byte sectors");
    let slots = device.block_count() as usize / SECTORS_PER_SLOT;
    *SWAP.lock() = Some(SwapDevice {
        device,
        bitmap: Bitmap::new(slots),
    });
}

fn with_swap<R>(f: impl FnOnce(&mut SwapDevice) -> R) -> R {
    let mut guard = SWAP.lock();
    let swap = guard.as_mut().expect("swap device not initialized");
    f(swap)
}

/// Reserve a free slot.
pub fn slot_alloc() -> KernelResult<SwapSlot> {
    with_swap(|swap| {
        swap.bitmap
            .alloc_first_fit()
            .map(SwapSlot)
            .ok_or(KernelError::SwapExhausted {
                slots: swap.bitmap.len,
            })
    })
}

/// Release a slot. Releasing a free slot is a kernel bug.
pub fn slot_free(slot: SwapSlot) {
    with_swap(|swap| {
        assert!(swap.bitmap.get(slot.0), "freeing unallocated swap slot {}", slot.0);
        swap.bitmap.set(slot.0, false);
    });
}

/// Copy one page from the slot into `dst`. The slot stays allocated; the
/// caller decides when to free it. `dst` must be pinned.
pub fn read_slot(slot: SwapSlot, dst: FrameNumber) {
    // SAFETY: the caller keeps `dst` pinned for the duration of the I/O.
    let bytes = unsafe { frame::frame_slice(dst) };
    with_swap(|swap| {
        assert!(swap.bitmap.get(slot.0), "reading unallocated swap slot {}", slot.0);
        let start = (slot.0 * SECTORS_PER_SLOT) as u64;
        swap.device
            .read_blocks(start, bytes)
            .expect("swap read failed");
    });
    SWAP_INS.fetch_add(1, Ordering::Relaxed);
}

/// Copy one page from `src` into the slot. `src` must be pinned.
pub fn write_slot(slot: SwapSlot, src: FrameNumber) {
    // SAFETY: the caller keeps `src` pinned for the duration of the I/O.
    let bytes = unsafe { frame::frame_slice(src) };
    with_swap(|swap| {
        assert!(swap.bitmap.get(slot.0), "writing unallocated swap slot {}", slot.0);
        let start = (slot.0 * SECTORS_PER_SLOT) as u64;
        swap.device
            .write_blocks(start, bytes)
            .expect("swap write failed");
    });
    SWAP_OUTS.fetch_add(1, Ordering::Relaxed);
}

/// Number of allocated slots (set bits in the occupancy bitmap).
pub fn slots_in_use() -> usize {
    with_swap(|swap| swap.bitmap.count_ones())
}

/// Pages written to and read from swap since boot.
pub fn transfer_counts() -> (u64, u64) {
    (
        SWAP_OUTS.load(Ordering::Relaxed),
        SWAP_INS.load(Ordering::Relaxed),
    )
}
