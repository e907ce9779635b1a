//! Inode table I/O and allocation. Records are addressed by flat byte
//! offset `first_inode_block * BLOCK_SIZE + id * INODE_SIZE`, so a
//! record may straddle two blocks; reads and writes assemble it from
//! both.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::bitmap::{alloc_block, Bitmap};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::{FileType, Inode, SuperBlock};
use crate::superblock::write_superblock;
use crate::BlockDevice;

/// Wall-clock seconds since the epoch, used for fresh timestamps.
pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Byte span of inode `id` relative to the start of the image.
fn inode_span(superblock: &SuperBlock, id: u32) -> (usize, usize) {
    let start = superblock.first_inode_block as usize * BLOCK_SIZE + id as usize * INODE_SIZE;
    (start / BLOCK_SIZE, start % BLOCK_SIZE)
}

pub fn get_inode(device: &impl BlockDevice, superblock: &SuperBlock, id: u32) -> Result<Inode> {
    if id >= superblock.num_inodes {
        return Err(FsError::NotFound);
    }
    let (block, offset) = inode_span(superblock, id);
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    let mut record = [0u8; INODE_SIZE];

    device.read_block(block, buf.as_mut_slice())?;
    let head = INODE_SIZE.min(BLOCK_SIZE - offset);
    record[..head].copy_from_slice(&buf[offset..offset + head]);
    if head < INODE_SIZE {
        device.read_block(block + 1, buf.as_mut_slice())?;
        record[head..].copy_from_slice(&buf[..INODE_SIZE - head]);
    }

    let inode = unsafe { core::ptr::read_unaligned(record.as_ptr() as *const Inode) };
    Ok(inode)
}

pub fn write_inode(
    device: &impl BlockDevice,
    superblock: &SuperBlock,
    id: u32,
    inode: &Inode,
) -> Result<()> {
    if id >= superblock.num_inodes {
        return Err(FsError::NotFound);
    }
    let (block, offset) = inode_span(superblock, id);
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    let mut record = [0u8; INODE_SIZE];
    unsafe {
        core::ptr::write_unaligned(record.as_mut_ptr() as *mut Inode, *inode);
    }

    device.read_block(block, buf.as_mut_slice())?;
    let head = INODE_SIZE.min(BLOCK_SIZE - offset);
    buf[offset..offset + head].copy_from_slice(&record[..head]);
    device.write_block(block, buf.as_ref())?;
    if head < INODE_SIZE {
        device.read_block(block + 1, buf.as_mut_slice())?;
        buf[..INODE_SIZE - head].copy_from_slice(&record[head..]);
        device.write_block(block + 1, buf.as_ref())?;
    }
    Ok(())
}

/// Linear scan for the first inode with IN_USE clear. Sets the bit,
/// updates the free counter, and returns the id.
pub fn alloc_next_inode(device: &impl BlockDevice, superblock: &mut SuperBlock) -> Result<u32> {
    for id in 0..superblock.num_inodes {
        let mut inode = get_inode(device, superblock, id)?;
        if !inode.is_in_use() {
            inode.set_in_use(true);
            write_inode(device, superblock, id, &inode)?;
            superblock.num_free_inodes -= 1;
            write_superblock(device, superblock)?;
            return Ok(id);
        }
    }
    Err(FsError::NoSpace)
}

pub fn mark_inode_free(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    id: u32,
) -> Result<()> {
    let mut inode = get_inode(device, superblock, id)?;
    inode.set_in_use(false);
    write_inode(device, superblock, id, &inode)?;
    superblock.num_free_inodes += 1;
    write_superblock(device, superblock)?;
    Ok(())
}

/// Allocates an inode of the given type together with its first data
/// block. If no data block can be had, the inode is released again
/// before NoSpace is reported.
pub fn allocate_file(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    bitmap: &mut Bitmap,
    ftype: FileType,
) -> Result<u32> {
    let id = alloc_next_inode(device, superblock)?;
    let blk = match alloc_block(device, superblock, bitmap) {
        Ok(blk) => blk,
        Err(e) => {
            mark_inode_free(device, superblock, id)?;
            return Err(e);
        }
    };

    let mut inode = Inode::new(ftype, unix_now());
    inode.blocks[0] = blk;
    write_inode(device, superblock, id, &inode)?;
    Ok(id)
}

/// Zeroes the record and clears IN_USE; the caller has already freed
/// any data blocks the inode referenced.
pub fn destroy_inode(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    id: u32,
) -> Result<()> {
    write_inode(device, superblock, id, &Inode::ZERO)?;
    superblock.num_free_inodes += 1;
    write_superblock(device, superblock)?;
    Ok(())
}
