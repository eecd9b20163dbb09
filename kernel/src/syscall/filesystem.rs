//! File and console system calls
//!
//! Thin decoding shims over the filesystem and the per-process descriptor
//! table. All user buffers are staged through kernel memory so the global
//! filesystem lock is never held across a user-space fault.

use alloc::vec::Vec;

use crate::console;
use crate::error::{KernelError, KernelResult};
use crate::fs::{self, File, STDIN, STDOUT};
use crate::mm::usermem;
use crate::process::Process;

/// An fd that must name an open file; anything else ends the caller.
fn strict_file(process: &Process, fd: usize) -> KernelResult<File> {
    process
        .files
        .lock()
        .get(fd)
        .cloned()
        .ok_or(KernelError::BadFileDescriptor { fd })
}

pub fn sys_create(process: &Process, name_addr: usize, size: usize) -> KernelResult<isize> {
    let name = usermem::copy_in_string(process, name_addr)?;
    let _fs = fs::lock();
    Ok(fs::create(&name, size) as isize)
}

pub fn sys_remove(process: &Process, name_addr: usize) -> KernelResult<isize> {
    let name = usermem::copy_in_string(process, name_addr)?;
    let _fs = fs::lock();
    Ok(fs::remove(&name) as isize)
}

pub fn sys_open(process: &Process, name_addr: usize) -> KernelResult<isize> {
    let name = usermem::copy_in_string(process, name_addr)?;
    let file = {
        let _fs = fs::lock();
        fs::open(&name)
    };
    match file {
        None => Ok(-1),
        Some(file) => {
            let fd = process.files.lock().open(file)?;
            Ok(fd as isize)
        }
    }
}

pub fn sys_filesize(process: &Process, fd: usize) -> KernelResult<isize> {
    let file = strict_file(process, fd)?;
    let _fs = fs::lock();
    Ok(file.length() as isize)
}

pub fn sys_read(process: &Process, fd: usize, buf: usize, len: usize) -> KernelResult<isize> {
    if fd == STDIN {
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            data.push(console::getc());
        }
        usermem::copy_out(process, buf, &data)?;
        return Ok(len as isize);
    }
    if fd == STDOUT {
        return Ok(-1);
    }
    let Some(file) = process.files.lock().get(fd).cloned() else {
        return Ok(-1);
    };
    let mut data = alloc::vec![0u8; len];
    let read = {
        let _fs = fs::lock();
        file.read(&mut data)
    };
    usermem::copy_out(process, buf, &data[..read])?;
    Ok(read as isize)
}

pub fn sys_write(process: &Process, fd: usize, buf: usize, len: usize) -> KernelResult<isize> {
    let data = usermem::copy_in(process, buf, len)?;
    if fd == STDOUT {
        // One flush for the whole buffer, so interleaving output stays
        // line-coherent.
        console::write_bytes(&data);
        return Ok(len as isize);
    }
    if fd == STDIN {
        return Ok(-1);
    }
    let Some(file) = process.files.lock().get(fd).cloned() else {
        return Ok(-1);
    };
    let written = {
        let _fs = fs::lock();
        file.write(&data)
    };
    Ok(written as isize)
}

pub fn sys_seek(process: &Process, fd: usize, position: usize) -> KernelResult<isize> {
    let file = strict_file(process, fd)?;
    let _fs = fs::lock();
    file.seek(position);
    Ok(0)
}

pub fn sys_tell(process: &Process, fd: usize) -> KernelResult<isize> {
    let file = strict_file(process, fd)?;
    let _fs = fs::lock();
    Ok(file.tell() as isize)
}

pub fn sys_close(process: &Process, fd: usize) -> KernelResult<isize> {
    process.files.lock().close(fd)?;
    Ok(0)
}
