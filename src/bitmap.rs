//! The block bitmap: one bit per block, bit i set when block i is in
//! use. A single block bounds the image size. The bitmap stays resident
//! for the whole mount and is rewritten whole, followed by the
//! superblock, on every allocation or deallocation.

use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::SuperBlock;
use crate::superblock::write_superblock;
use crate::BlockDevice;

pub struct Bitmap {
    bits: Box<[u8; BLOCK_SIZE]>,
}

impl Bitmap {
    /// An all-free bitmap, used when formatting.
    pub fn empty() -> Self {
        Bitmap {
            bits: Box::new([0u8; BLOCK_SIZE]),
        }
    }

    /// Reads the bitmap block of a formatted image.
    pub fn load(device: &impl BlockDevice, superblock: &SuperBlock) -> Result<Self> {
        let mut bits = Box::new([0u8; BLOCK_SIZE]);
        device.read_block(superblock.bitmap_block as usize, bits.as_mut_slice())?;
        Ok(Bitmap { bits })
    }

    pub fn is_used(&self, id: u32) -> bool {
        self.bits[id as usize / 8] & (1 << (id % 8)) != 0
    }

    fn set(&mut self, id: u32) {
        self.bits[id as usize / 8] |= 1 << (id % 8);
    }

    fn clear(&mut self, id: u32) {
        self.bits[id as usize / 8] &= !(1 << (id % 8));
    }

    /// Number of clear bits among the first `total` blocks.
    pub fn free_count(&self, total: u32) -> u32 {
        (0..total).filter(|&id| !self.is_used(id)).count() as u32
    }

    fn persist(&self, device: &impl BlockDevice, superblock: &SuperBlock) -> Result<()> {
        device.write_block(superblock.bitmap_block as usize, self.bits.as_slice())
    }
}

/// Flips the bit for `id`, then persists the bitmap and the updated
/// free-block counter.
pub fn mark_block_used(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    bitmap: &mut Bitmap,
    id: u32,
) -> Result<()> {
    bitmap.set(id);
    bitmap.persist(device, superblock)?;
    superblock.num_free_blocks -= 1;
    write_superblock(device, superblock)?;
    Ok(())
}

/// Clears the bit for `id`. Ids below the first data block are the
/// metadata region and are silently left alone.
pub fn mark_block_free(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    bitmap: &mut Bitmap,
    id: u32,
) -> Result<()> {
    if id < superblock.first_data_block {
        return Ok(());
    }
    bitmap.clear(id);
    bitmap.persist(device, superblock)?;
    superblock.num_free_blocks += 1;
    write_superblock(device, superblock)?;
    Ok(())
}

/// First-fit scan for a free block. Returns its id after marking it
/// used, or NoSpace when every bit is set.
pub fn alloc_block(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    bitmap: &mut Bitmap,
) -> Result<u32> {
    for id in 0..superblock.num_blocks {
        if !bitmap.is_used(id) {
            mark_block_used(device, superblock, bitmap, id)?;
            return Ok(id);
        }
    }
    Err(FsError::NoSpace)
}
