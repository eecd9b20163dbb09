//! Process-control system calls

use super::Control;
use crate::error::KernelResult;
use crate::fs;
use crate::mm::usermem;
use crate::process::{self, Process, ProcessId};

pub fn sys_halt() -> Control {
    log::info!(target: "syscall", "halt requested; powering off");
    Control::Halt
}

/// Spawn a child for `cmdline` and report its pid, or -1 if the
/// executable cannot be loaded. The caller observes the child's load
/// completion before the pid comes back.
pub fn sys_exec(process: &Process, cmdline_addr: usize) -> KernelResult<isize> {
    let cmdline = usermem::copy_in_string(process, cmdline_addr)?;
    let Some(name) = cmdline.split_whitespace().next() else {
        return Ok(-1);
    };

    let loadable = {
        let _fs = fs::lock();
        fs::open(name).is_some()
    };
    if !loadable {
        log::debug!(target: "process", "exec: no executable named '{}'", name);
        return Ok(-1);
    }

    let child = process::spawn(name, Some(process.pid));
    Ok(child.pid.0 as isize)
}

pub fn sys_wait(process: &Process, pid: usize) -> KernelResult<isize> {
    Ok(process::wait_child(process, ProcessId(pid as u64)))
}
