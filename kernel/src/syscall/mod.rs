//! System call dispatch
//!
//! A single trap vector enters here with the saved user frame. The call
//! number sits at `esp`, up to three 32-bit arguments above it; every
//! address involved is pulled through the validated user-memory layer, so
//! a bad pointer terminates the caller and a lazily mapped buffer faults
//! itself in. Handlers return a result; the dispatcher stores it in the
//! return register, converts a soft failure into -1, and turns a fatal
//! error into the caller's termination.

mod filesystem;
mod memory;
mod process;

use alloc::sync::Arc;

use crate::error::KernelResult;
use crate::mm::usermem;
use crate::process::{current_process, exit_current, Process};

/// System call numbers
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Halt = 0,
    Exit = 1,
    Exec = 2,
    Wait = 3,
    Create = 4,
    Remove = 5,
    Open = 6,
    Filesize = 7,
    Read = 8,
    Write = 9,
    Seek = 10,
    Tell = 11,
    Close = 12,
    Mmap = 13,
    Munmap = 14,
}

impl TryFrom<usize> for Syscall {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Syscall::Halt),
            1 => Ok(Syscall::Exit),
            2 => Ok(Syscall::Exec),
            3 => Ok(Syscall::Wait),
            4 => Ok(Syscall::Create),
            5 => Ok(Syscall::Remove),
            6 => Ok(Syscall::Open),
            7 => Ok(Syscall::Filesize),
            8 => Ok(Syscall::Read),
            9 => Ok(Syscall::Write),
            10 => Ok(Syscall::Seek),
            11 => Ok(Syscall::Tell),
            12 => Ok(Syscall::Close),
            13 => Ok(Syscall::Mmap),
            14 => Ok(Syscall::Munmap),
            _ => Err(()),
        }
    }
}

/// The register state a trap hands to the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    /// User stack pointer at the trap.
    pub esp: usize,
    /// Return-value register.
    pub eax: isize,
}

impl TrapFrame {
    pub fn new(esp: usize) -> Self {
        Self { esp, eax: 0 }
    }
}

/// What the trap stub should do after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Return to user mode with the frame's registers.
    Continue,
    /// Power off the machine.
    Halt,
    /// The calling process terminated with this status.
    Terminated(i32),
}

/// Decode and run one system call.
pub fn dispatch(frame: &mut TrapFrame) -> Control {
    let process = current_process().expect("syscall trap with no current process");
    // Park the user stack pointer for faults taken while we run.
    process.set_saved_esp(frame.esp);

    let number = match usermem::copy_in_u32(&process, frame.esp) {
        Ok(n) => n as usize,
        Err(_) => return kill(),
    };
    let Ok(call) = Syscall::try_from(number) else {
        // Unknown numbers leave the register file untouched.
        log::debug!(target: "syscall", "unknown syscall {}", number);
        return Control::Continue;
    };

    let arg = |index: usize| -> KernelResult<u32> {
        usermem::copy_in_u32(&process, frame.esp + 4 + 4 * index)
    };

    match call {
        Syscall::Halt => process::sys_halt(),
        Syscall::Exit => {
            let status = match arg(0) {
                Ok(v) => v as i32,
                Err(_) => return kill(),
            };
            exit_current(status);
            Control::Terminated(status)
        }
        _ => {
            let outcome = run_handler(&process, call, &arg);
            finish(frame, outcome)
        }
    }
}

fn run_handler(
    process: &Arc<Process>,
    call: Syscall,
    arg: &dyn Fn(usize) -> KernelResult<u32>,
) -> KernelResult<isize> {
    match call {
        Syscall::Exec => process::sys_exec(process, arg(0)? as usize),
        Syscall::Wait => process::sys_wait(process, arg(0)? as usize),
        Syscall::Create => filesystem::sys_create(process, arg(0)? as usize, arg(1)? as usize),
        Syscall::Remove => filesystem::sys_remove(process, arg(0)? as usize),
        Syscall::Open => filesystem::sys_open(process, arg(0)? as usize),
        Syscall::Filesize => filesystem::sys_filesize(process, arg(0)? as usize),
        Syscall::Read => filesystem::sys_read(
            process,
            arg(0)? as usize,
            arg(1)? as usize,
            arg(2)? as usize,
        ),
        Syscall::Write => filesystem::sys_write(
            process,
            arg(0)? as usize,
            arg(1)? as usize,
            arg(2)? as usize,
        ),
        Syscall::Seek => filesystem::sys_seek(process, arg(0)? as usize, arg(1)? as usize),
        Syscall::Tell => filesystem::sys_tell(process, arg(0)? as usize),
        Syscall::Close => filesystem::sys_close(process, arg(0)? as usize),
        Syscall::Mmap => memory::sys_mmap(process, arg(0)? as usize, arg(1)? as usize),
        Syscall::Munmap => memory::sys_munmap(process, arg(0)? as i32),
        Syscall::Halt | Syscall::Exit => unreachable!("handled by dispatch"),
    }
}

fn finish(frame: &mut TrapFrame, outcome: KernelResult<isize>) -> Control {
    match outcome {
        Ok(value) => {
            frame.eax = value;
            Control::Continue
        }
        Err(error) if error.is_fatal() => {
            log::warn!(target: "syscall", "fatal: {}", error);
            kill()
        }
        Err(error) => {
            log::debug!(target: "syscall", "soft failure: {}", error);
            frame.eax = -1;
            Control::Continue
        }
    }
}

/// Terminate the offender with the canonical -1 status.
fn kill() -> Control {
    exit_current(-1);
    Control::Terminated(-1)
}
