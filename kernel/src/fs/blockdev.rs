//! Block Device Abstraction
//!
//! Common interface for block-level storage. The swap partition consumes
//! this trait; the concrete driver (virtio, AHCI, ...) lives outside the
//! core. A RAM-backed implementation stands in for it.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{KernelError, KernelResult};

/// Block device trait
pub trait BlockDevice: Send + Sync {
    /// Get device name
    fn name(&self) -> &str;

    /// Get block size in bytes
    fn block_size(&self) -> usize;

    /// Get total number of blocks
    fn block_count(&self) -> u64;

    /// Read blocks from device; `buffer` must be a multiple of the block
    /// size.
    fn read_blocks(&self, start_block: u64, buffer: &mut [u8]) -> KernelResult<()>;

    /// Write blocks to device; `buffer` must be a multiple of the block
    /// size.
    fn write_blocks(&mut self, start_block: u64, buffer: &[u8]) -> KernelResult<()>;
}

/// RAM-backed block device
pub struct RamBlockDevice {
    name: String,
    block_size: usize,
    data: Vec<u8>,
}

impl RamBlockDevice {
    /// Create a new RAM block device, zero-filled.
    pub fn new(name: String, block_size: usize, block_count: u64) -> Self {
        let size = block_size * block_count as usize;
        Self {
            name,
            block_size,
            data: alloc::vec![0u8; size],
        }
    }

    fn byte_range(&self, start_block: u64, len: usize) -> KernelResult<(usize, usize)> {
        let start_byte = start_block as usize * self.block_size;
        let end_byte = start_byte + len;
        if len % self.block_size != 0 || end_byte > self.data.len() {
            return Err(KernelError::InvalidArgument {
                name: "block_range",
                value: "out of bounds",
            });
        }
        Ok((start_byte, end_byte))
    }
}

impl BlockDevice for RamBlockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        (self.data.len() / self.block_size) as u64
    }

    fn read_blocks(&self, start_block: u64, buffer: &mut [u8]) -> KernelResult<()> {
        let (start, end) = self.byte_range(start_block, buffer.len())?;
        buffer.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_blocks(&mut self, start_block: u64, buffer: &[u8]) -> KernelResult<()> {
        let (start, end) = self.byte_range(start_block, buffer.len())?;
        self.data[start..end].copy_from_slice(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn read_back_written_blocks() {
        let mut dev = RamBlockDevice::new("test".to_string(), 512, 4);
        let pattern = [0xA5u8; 1024];
        dev.write_blocks(1, &pattern).unwrap();

        let mut out = [0u8; 1024];
        dev.read_blocks(1, &mut out).unwrap();
        assert_eq!(out, pattern);
    }

    #[test]
    fn out_of_bounds_rejected() {
        let mut dev = RamBlockDevice::new("test".to_string(), 512, 2);
        let buf = [0u8; 1024];
        assert!(dev.write_blocks(1, &buf).is_err());
        let mut out = [0u8; 512];
        assert!(dev.read_blocks(2, &mut out).is_err());
    }
}
