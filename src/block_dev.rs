use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::config::BLOCK_SIZE;
use crate::error::{FsError, Result};

pub trait BlockDevice: Send + Sync {
    /// Returns the number of blocks in the block device.
    fn num_blocks(&self) -> usize;

    /// Reads a block of data from the block device.
    /// buf.len() must be equal to block_size().
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()>;

    /// Writes a block of data to the block device.
    /// buf.len() must be equal to block_size().
    /// The data must reach the device before this returns.
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()>;

    /// Returns the size of each block in bytes.
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }
}

/// The backing image: a flat file of exactly `num_blocks * BLOCK_SIZE`
/// bytes. Opening a missing image creates it; a short image is extended
/// to full size before the superblock is ever read.
#[derive(Debug)]
pub struct ImageFile {
    inner: Mutex<File>,
    num_blocks: usize,
}

impl ImageFile {
    pub fn open(path: impl AsRef<Path>, num_blocks: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|_| FsError::Io)?;
        let total = (num_blocks * BLOCK_SIZE) as u64;
        let len = file.metadata().map_err(|_| FsError::Io)?.len();
        if len < total {
            file.set_len(total).map_err(|_| FsError::Io)?;
        }
        Ok(ImageFile {
            inner: Mutex::new(file),
            num_blocks,
        })
    }
}

impl BlockDevice for ImageFile {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(FsError::Io);
        }
        let mut file = self.inner.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(|_| FsError::Io)?;
        file.read_exact(buf).map_err(|_| FsError::Io)?;
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(FsError::Io);
        }
        let mut file = self.inner.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(|_| FsError::Io)?;
        file.write_all(buf).map_err(|_| FsError::Io)?;
        file.flush().map_err(|_| FsError::Io)?;
        Ok(())
    }
}
