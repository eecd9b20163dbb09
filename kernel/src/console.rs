//! Console output sink and keyboard input queue
//!
//! The physical console and keyboard are device-driver territory; the core
//! only needs a byte sink for kernel and user output and a byte source for
//! reads from stdin. Both are process-wide buffers behind spin locks. The
//! driver side pushes keystrokes with [`push_input`]; tests inspect output
//! with [`take_output`].

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;

lazy_static! {
    static ref OUTPUT: Mutex<Vec<u8>> = Mutex::new(Vec::new());
    static ref INPUT: Mutex<VecDeque<u8>> = Mutex::new(VecDeque::new());
}

/// Append raw bytes to the console output buffer in one critical section.
pub fn write_bytes(bytes: &[u8]) {
    OUTPUT.lock().extend_from_slice(bytes);
}

struct ConsoleWriter;

impl fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_bytes(s.as_bytes());
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    use core::fmt::Write;
    let _ = ConsoleWriter.write_fmt(args);
}

/// Drain the output buffer, returning its contents as a (lossy) string.
pub fn take_output() -> String {
    let mut buffer = OUTPUT.lock();
    let bytes = core::mem::take(&mut *buffer);
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Queue keystrokes for later consumption by reads from stdin.
pub fn push_input(bytes: &[u8]) {
    let mut queue = INPUT.lock();
    for &b in bytes {
        queue.push_back(b);
    }
}

/// Take the next input byte, spinning until one arrives.
pub fn getc() -> u8 {
    loop {
        if let Some(b) = INPUT.lock().pop_front() {
            return b;
        }
        core::hint::spin_loop();
    }
}

/// Discard buffered output and pending input. Boot-time reset.
pub fn reset() {
    OUTPUT.lock().clear();
    INPUT.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_round_trip() {
        reset();
        write_bytes(b"abc");
        _print(format_args!("{}", 42));
        assert_eq!(take_output(), "abc42");
        assert_eq!(take_output(), "");
    }

    #[test]
    fn input_is_fifo() {
        reset();
        push_input(b"xy");
        assert_eq!(getc(), b'x');
        assert_eq!(getc(), b'y');
    }
}
