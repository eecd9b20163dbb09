//! Kestrel kernel library
//!
//! The virtual-memory and user-syscall core of the Kestrel teaching OS:
//! demand paging over a supplemental page table, a global frame table
//! with clock eviction, a bitmap-managed swap device, memory-mapped file
//! regions, and the syscall dispatcher that mediates every user/kernel
//! crossing. The scheduler, interrupt wiring, device drivers, and loader
//! are separate components consuming the interfaces exported here.

#![no_std]

extern crate alloc;

// On bare-metal targets use the kernel heap allocator. On the host (for
// the test suite and coverage) delegate to the system allocator so test
// code using Vec/String/alloc compiles and runs.
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
use linked_list_allocator::LockedHeap;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

/// Get a reference to the global allocator (bare metal only; the
/// bootstrap hands it the heap region before the first allocation).
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub fn get_allocator() -> &'static LockedHeap {
    &ALLOCATOR
}

pub mod print;

pub mod console;
pub mod error;
pub mod fs;
pub mod log_service;
pub mod mm;
pub mod process;
pub mod syscall;

pub use error::{KernelError, KernelResult};
pub use mm::VmConfig;

/// Bring the core up: logging, console, filesystem, process table, and
/// the VM subsystem, in that order. Repeating the call re-initializes
/// everything (the test harness does); on hardware it runs once at boot.
pub fn init(config: &VmConfig) {
    log_service::init();
    console::reset();
    fs::format();
    process::table::init();
    mm::init(config);
    log::info!(target: "kernel", "core initialized");
}
