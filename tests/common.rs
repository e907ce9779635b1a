//! Common utilities for tests
#![allow(unused)]

use std::sync::{Arc, Mutex};

use sfs::*;

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder") -> println!("[test] placeholder");
#[macro_export]
macro_rules! log {
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
    ($msg:expr) => {
        println!("{}[test] {}{}", crate::common::ORANGE, $msg, crate::common::RESET)
    };
}

#[derive(Debug)]
pub struct RamDisk {
    inner: Mutex<Vec<u8>>,
    num_blocks: usize,
}

impl RamDisk {
    /// Creates a new RamDisk with the specified number of blocks.
    /// Each block is BLOCK_SIZE bytes.
    pub fn new(num_blocks: usize) -> Self {
        RamDisk {
            inner: Mutex::new(vec![0u8; num_blocks * BLOCK_SIZE]),
            num_blocks,
        }
    }
}

impl BlockDevice for RamDisk {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(Error::Io);
        }
        let start = block_id * BLOCK_SIZE;
        let data = self.inner.lock().unwrap();
        buf.copy_from_slice(&data[start..start + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(Error::Io);
        }
        let start = block_id * BLOCK_SIZE;
        let mut data = self.inner.lock().unwrap();
        data[start..start + BLOCK_SIZE].copy_from_slice(buf);
        Ok(())
    }
}

/// Counts the clear bits of the on-disk bitmap, the ground truth the
/// superblock's free-block counter must agree with.
pub fn free_bits(device: &impl BlockDevice, sb: &SuperBlock) -> u32 {
    let mut bits = vec![0u8; BLOCK_SIZE];
    device.read_block(sb.bitmap_block as usize, &mut bits).unwrap();
    (0..sb.num_blocks)
        .filter(|id| bits[*id as usize / 8] & (1 << (id % 8)) == 0)
        .count() as u32
}

/// Counts inodes whose IN_USE flag is clear.
pub fn free_inode_records(device: &impl BlockDevice, sb: &SuperBlock) -> u32 {
    (0..sb.num_inodes)
        .filter(|&id| !get_inode(device, sb, id).unwrap().is_in_use())
        .count() as u32
}
