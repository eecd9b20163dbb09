//! Shared setup for the host-side integration suites.
//!
//! The VM core is process-wide state, so every test re-initializes it and
//! the suites serialize on one lock.

use std::sync::{Mutex, MutexGuard};

use kestrel_kernel::mm::VmConfig;
use kestrel_kernel::process::{self, Process};

static SERIAL: Mutex<()> = Mutex::new(());

/// A user stack pointer well below the stack top, so test buffers placed
/// anywhere in the top few pages pass the growth heuristic.
pub const TEST_ESP: usize = 0xBFFF_0000;

/// Re-initialize the kernel with a sized VM and one running process.
pub fn boot(user_frames: usize, swap_slots: usize) -> (MutexGuard<'static, ()>, std::sync::Arc<Process>) {
    let guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    kestrel_kernel::init(&VmConfig {
        user_frames,
        swap_slots,
    });
    let main = process::spawn("main", None);
    process::set_current(main.pid);
    main.set_saved_esp(TEST_ESP);
    (guard, main)
}
