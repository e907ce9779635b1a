use log::info;

use crate::bitmap::{mark_block_used, Bitmap};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::SuperBlock;
use crate::BlockDevice;

impl SuperBlock {
    /// Derives the full geometry from a block count. The inode table is
    /// sized so it can name every remaining block as an individual
    /// file; the bitmap is a single block, which bounds the image at
    /// BLOCK_SIZE * 8 blocks.
    pub fn new(num_blocks: u32) -> Result<Self> {
        if num_blocks as usize > BLOCK_SIZE * 8 {
            return Err(FsError::InvalidImage);
        }
        let num_inode_blocks = (num_blocks - 1) / (INODES_PER_BLOCK as u32 + 1);
        let num_inodes = num_inode_blocks * INODES_PER_BLOCK as u32;
        let first_inode_block = 1;
        let first_data_block = first_inode_block + num_inode_blocks;
        if num_inode_blocks == 0 || first_data_block + 1 >= num_blocks {
            return Err(FsError::InvalidImage);
        }
        Ok(SuperBlock {
            magic: MAGIC,
            block_size: BLOCK_SIZE as u32,
            num_blocks,
            num_inodes,
            num_inode_blocks,
            num_free_blocks: num_blocks,
            num_free_inodes: num_inodes,
            first_inode_block,
            first_data_block,
            bitmap_block: first_data_block,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }
}

pub fn read_superblock(device: &impl BlockDevice) -> Result<SuperBlock> {
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    device.read_block(SUPERBLOCK_ID, buf.as_mut_slice())?;
    let superblock = unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const SuperBlock) };
    Ok(superblock)
}

pub fn write_superblock(device: &impl BlockDevice, superblock: &SuperBlock) -> Result<()> {
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    unsafe {
        core::ptr::write_unaligned(buf.as_mut_ptr() as *mut SuperBlock, *superblock);
    }
    device.write_block(SUPERBLOCK_ID, buf.as_ref())?;
    Ok(())
}

/// Formats the device: derives and writes the superblock, clears the
/// inode table, then marks every metadata block (superblock, inode
/// table, bitmap) used. Returns the superblock and the resident bitmap.
pub fn format(device: &impl BlockDevice) -> Result<(SuperBlock, Bitmap)> {
    let mut superblock = SuperBlock::new(device.num_blocks() as u32)?;
    write_superblock(device, &superblock)?;

    // A reused image may carry stale inodes; the free-inode counter is
    // only honest over a zeroed table.
    let zeros = Box::new([0u8; BLOCK_SIZE]);
    for blk in superblock.first_inode_block..superblock.first_data_block {
        device.write_block(blk as usize, zeros.as_ref())?;
    }

    let mut bitmap = Bitmap::empty();
    for id in 0..=superblock.first_data_block {
        mark_block_used(device, &mut superblock, &mut bitmap, id)?;
    }

    info!(
        "formatted image: {} blocks, {} inodes in {} blocks, data at {}",
        superblock.num_blocks,
        superblock.num_inodes,
        superblock.num_inode_blocks,
        superblock.first_data_block + 1
    );
    Ok((superblock, bitmap))
}

/// Loads a previously formatted image: the superblock from block 0 and
/// the bitmap into memory for the duration of the mount.
pub fn load(device: &impl BlockDevice) -> Result<(SuperBlock, Bitmap)> {
    let superblock = read_superblock(device)?;
    if !superblock.is_valid() {
        return Err(FsError::InvalidImage);
    }
    let bitmap = Bitmap::load(device, &superblock)?;
    Ok((superblock, bitmap))
}
