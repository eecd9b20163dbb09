//! Global frame table over the user-frame pool
//!
//! Every frame available for user pages is registered here. A frame is
//! handed out pinned (`evictable = false`) and becomes eligible for
//! eviction only after the faulting path has programmed the page
//! directory. When the pool runs dry, a second-chance clock picks a
//! victim, spills it to its backing file or to swap, and recycles the
//! frame. The frame-table lock is dropped across spill I/O; the victim is
//! pinned and its MMU mapping cleared first so user writes cannot race.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use super::page_dir::PageDirectory;
use super::spt::{PageLocation, PagePurpose};
use super::{swap, PAGE_SIZE};
use crate::process::{self, ProcessId};

/// Index of a frame in the user pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameNumber(usize);

impl FrameNumber {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(&self) -> usize {
        self.0
    }
}

/// The user page a frame currently backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameUser {
    pub owner: ProcessId,
    pub vpage: usize,
}

#[derive(Debug, Clone, Copy)]
struct FrameRecord {
    user: Option<FrameUser>,
    evictable: bool,
}

const FREE_RECORD: FrameRecord = FrameRecord {
    user: None,
    evictable: false,
};

struct FrameTable {
    records: Vec<FrameRecord>,
    free: Vec<usize>,
    clock: usize,
}

static FRAME_TABLE: Mutex<Option<FrameTable>> = Mutex::new(None);

// Pool geometry, published once per init. Kept outside the table lock so
// address arithmetic never has to take it (the user-copy path resolves
// frame addresses while holding a page-directory lock).
static POOL_BASE: AtomicUsize = AtomicUsize::new(0);
static POOL_FRAMES: AtomicUsize = AtomicUsize::new(0);

static EVICTIONS: AtomicU64 = AtomicU64::new(0);

/// Carve out the user pool and register its frames. Replaces any previous
/// pool; boot-time singleton otherwise.
pub fn init(user_frames: usize) {
    assert!(user_frames > 0, "user pool must hold at least one frame");
    let pool = alloc::vec![0u8; user_frames * PAGE_SIZE].into_boxed_slice();
    // The pool lives until the next init; the previous one (tests only) is
    // abandoned because stale FrameNumbers must never dangle.
    let pool_base = alloc::boxed::Box::into_raw(pool) as *mut u8 as usize;

    let mut guard = FRAME_TABLE.lock();
    POOL_BASE.store(pool_base, Ordering::Release);
    POOL_FRAMES.store(user_frames, Ordering::Release);
    *guard = Some(FrameTable {
        records: alloc::vec![FREE_RECORD; user_frames],
        free: (0..user_frames).rev().collect(),
        clock: 0,
    });
}

fn with_table<R>(f: impl FnOnce(&mut FrameTable) -> R) -> R {
    let mut guard = FRAME_TABLE.lock();
    let table = guard.as_mut().expect("frame table not initialized");
    f(table)
}

/// Kernel address of a frame's first byte.
pub fn kaddr(frame: FrameNumber) -> usize {
    let base = POOL_BASE.load(Ordering::Acquire);
    assert!(base != 0, "frame table not initialized");
    base + frame.index() * PAGE_SIZE
}

/// Structural lookup: the frame whose storage starts at `addr`, if any.
pub fn frame_at(addr: usize) -> Option<FrameNumber> {
    let base = POOL_BASE.load(Ordering::Acquire);
    let end = base + POOL_FRAMES.load(Ordering::Acquire) * PAGE_SIZE;
    if base == 0 || addr < base || addr >= end || (addr - base) % PAGE_SIZE != 0 {
        return None;
    }
    Some(FrameNumber::new((addr - base) / PAGE_SIZE))
}

/// The frame's page-backing bytes.
///
/// # Safety
///
/// The caller must exclude concurrent reuse of the frame for the lifetime
/// of the slice: either the frame is pinned by the caller, or the caller
/// holds the page-directory lock of the process mapped to it (eviction
/// clears that mapping under the same lock before recycling the frame).
pub unsafe fn frame_slice(frame: FrameNumber) -> &'static mut [u8] {
    let base = kaddr(frame);
    // SAFETY: `kaddr` points into the leaked pool allocation, which is
    // PAGE_SIZE-aligned per frame and never deallocated; exclusivity is the
    // caller's contract above.
    unsafe { core::slice::from_raw_parts_mut(base as *mut u8, PAGE_SIZE) }
}

/// Allocate a user frame, evicting if the pool is empty. The frame comes
/// back pinned and with no user; callers publish the mapping with
/// [`set_user`] and unpin with [`make_evictable`] once the page directory
/// is programmed.
///
/// Panics if the pool is exhausted and no frame is evictable, and if the
/// swap device fills up mid-eviction; both are unrecoverable states.
pub fn alloc(zero: bool) -> FrameNumber {
    loop {
        let reclaimed = {
            let mut guard = FRAME_TABLE.lock();
            let table = guard.as_mut().expect("frame table not initialized");
            if let Some(idx) = table.free.pop() {
                table.records[idx] = FREE_RECORD;
                Some(FrameNumber::new(idx))
            } else {
                None
            }
        };

        let frame = match reclaimed {
            Some(frame) => frame,
            None => match evict_one() {
                Some(frame) => frame,
                // The chosen victim vanished under us; take another lap.
                None => continue,
            },
        };

        if zero {
            // SAFETY: the frame is pinned and unpublished; no other path
            // can touch its bytes.
            unsafe { frame_slice(frame).fill(0) };
        }
        return frame;
    }
}

/// Record which user page the frame backs. The hint is authoritative only
/// under the frame-table lock; the owning SPT remains the source of truth.
pub fn set_user(frame: FrameNumber, owner: ProcessId, vpage: usize) {
    with_table(|t| {
        t.records[frame.index()].user = Some(FrameUser { owner, vpage });
    });
}

/// Open the frame to eviction. Callers must have finished installing the
/// MMU mapping first.
pub fn make_evictable(frame: FrameNumber) {
    with_table(|t| {
        let rec = &mut t.records[frame.index()];
        debug_assert!(rec.user.is_some(), "evictable frame must back a page");
        rec.evictable = true;
    });
}

/// Pin a frame against eviction. Returns false if it was already pinned.
pub fn pin(frame: FrameNumber) -> bool {
    with_table(|t| {
        let rec = &mut t.records[frame.index()];
        let was = rec.evictable;
        rec.evictable = false;
        was
    })
}

/// Release a frame back to the pool and clear its record.
pub fn free(frame: FrameNumber) {
    with_table(|t| {
        t.records[frame.index()] = FREE_RECORD;
        t.free.push(frame.index());
    });
}

/// The page a frame currently backs, if any.
pub fn user_of(frame: FrameNumber) -> Option<FrameUser> {
    with_table(|t| t.records[frame.index()].user)
}

/// Number of frames currently on the free list.
pub fn free_frames() -> usize {
    with_table(|t| t.free.len())
}

/// Number of evictions performed since boot.
pub fn evictions() -> u64 {
    EVICTIONS.load(Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Eviction
// ---------------------------------------------------------------------------

/// Pick a victim with the second-chance clock, spill it, and return the
/// recycled frame (still pinned). `None` means the selected victim was
/// concurrently released and selection must restart.
fn evict_one() -> Option<FrameNumber> {
    let (victim, user, dirty) = {
        let mut guard = FRAME_TABLE.lock();
        let table = guard.as_mut().expect("frame table not initialized");
        select_victim(table)
    };

    // The frame-table lock is dropped here: spilling may block on swap or
    // filesystem I/O. The victim is pinned and unmapped, so nothing else
    // can select or write it.
    if spill(victim, user, dirty) {
        EVICTIONS.fetch_add(1, Ordering::Relaxed);
        with_table(|t| t.records[victim.index()].user = None);
        Some(victim)
    } else {
        None
    }
}

/// Advance the clock hand until a victim falls out: an evictable frame
/// whose accessed bit is clear. Frames whose accessed bit is set get a
/// second chance (bit cleared, hand moves on). The victim comes back
/// pinned, with its mapping removed and the dirty bit captured.
fn select_victim(table: &mut FrameTable) -> (FrameNumber, FrameUser, bool) {
    let n = table.records.len();
    let mut examined = 0;
    while examined < 2 * n {
        let idx = table.clock;
        table.clock = (table.clock + 1) % n;
        examined += 1;

        let rec = table.records[idx];
        if !rec.evictable {
            continue;
        }
        let Some(user) = rec.user else { continue };
        let Some(victim_proc) = process::table::get(user.owner) else {
            continue;
        };

        let mut pagedir = victim_proc.pagedir.lock();
        if pagedir.is_accessed(user.vpage) {
            pagedir.clear_accessed(user.vpage);
            continue;
        }

        // Selected. Pin before the mapping goes away so the frame cannot be
        // chosen twice, and capture the dirty bit before it is lost.
        let dirty = pagedir.is_dirty(user.vpage);
        pagedir.clear(user.vpage);
        drop(pagedir);
        table.records[idx].evictable = false;
        return (FrameNumber::new(idx), user, dirty);
    }
    panic!("frame table: no evictable frame");
}

/// Write the victim's contents to their spill destination and mark its
/// page descriptor non-resident. Returns false if the owning process
/// released the page while the frame-table lock was down.
fn spill(victim: FrameNumber, user: FrameUser, dirty: bool) -> bool {
    let Some(owner) = process::table::get(user.owner) else {
        return false;
    };
    let mut spt = owner.spt.lock();
    let Some(desc) = spt.lookup_mut(user.vpage) else {
        return false;
    };
    if desc.location != PageLocation::Resident(victim) {
        return false;
    }

    match desc.purpose {
        PagePurpose::Mmap => {
            if dirty {
                // SAFETY: victim is pinned and unmapped; this path has the
                // only live reference to its bytes.
                let bytes = unsafe { frame_slice(victim) };
                let file = desc.file.as_ref().expect("mmap page without backing file");
                let _fs = crate::fs::lock();
                file.write_at(&bytes[..desc.read_bytes], desc.offset);
                log::trace!(
                    target: "vm",
                    "evict: wrote mmap page {:#x} back to file", user.vpage
                );
            }
            desc.location = PageLocation::Absent;
        }
        PagePurpose::File if desc.writable && (dirty || desc.private) => {
            spill_to_swap(victim, desc);
        }
        PagePurpose::File => {
            // Clean and reloadable from the file; no I/O.
            desc.location = PageLocation::Absent;
        }
        PagePurpose::Stack => {
            spill_to_swap(victim, desc);
        }
    }
    true
}

fn spill_to_swap(victim: FrameNumber, desc: &mut super::spt::PageDescriptor) {
    let slot = match swap::slot_alloc() {
        Ok(slot) => slot,
        Err(e) => panic!("eviction cannot spill: {}", e),
    };
    swap::write_slot(slot, victim);
    desc.private = true;
    desc.location = PageLocation::Swapped(slot);
    log::trace!(target: "vm", "evict: page -> swap slot {}", slot.index());
}

// ---------------------------------------------------------------------------
// Install helper
// ---------------------------------------------------------------------------

/// Publish a pinned frame as the backing of `vpage`: record the user,
/// program the page directory, then open the frame to eviction. Panics if
/// the page is already mapped (the caller broke the SPT invariant).
pub fn install_and_unpin(
    frame: FrameNumber,
    pagedir: &Mutex<PageDirectory>,
    owner: ProcessId,
    vpage: usize,
    writable: bool,
) {
    set_user(frame, owner, vpage);
    let installed = pagedir.lock().install(vpage, frame, writable);
    assert!(installed, "page {:#x} already mapped", vpage);
    make_evictable(frame);
}
