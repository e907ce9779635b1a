//! The indirection mapper: translates a byte offset within a file to a
//! block id, and installs the next logical block when a hole is
//! written. Offsets partition into three levels; every level ends in
//! the same "read one indirection block and index it" step.

use crate::bitmap::{alloc_block, mark_block_free, Bitmap};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::{Inode, SuperBlock};
use crate::BlockDevice;

const DIRECT_SPAN: u64 = NUM_DIRECT_PTRS as u64 * BLOCK_SIZE as u64;
const SINGLE_SPAN: u64 = PTRS_PER_BLOCK as u64 * BLOCK_SIZE as u64;
const DOUBLE_SPAN: u64 = PTRS_PER_BLOCK as u64 * SINGLE_SPAN;

/// Which level of the block tree a file offset lives in, with the
/// index (or index pair) to follow at that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Direct(usize),
    Single(usize),
    Double(usize, usize),
}

impl Level {
    pub fn of(offset: u64) -> Result<Level> {
        if offset < DIRECT_SPAN {
            return Ok(Level::Direct((offset / BLOCK_SIZE as u64) as usize));
        }
        let offset = offset - DIRECT_SPAN;
        if offset < SINGLE_SPAN {
            return Ok(Level::Single((offset / BLOCK_SIZE as u64) as usize));
        }
        let offset = offset - SINGLE_SPAN;
        if offset < DOUBLE_SPAN {
            let first = (offset / SINGLE_SPAN) as usize;
            let second = (offset / BLOCK_SIZE as u64) as usize % PTRS_PER_BLOCK;
            return Ok(Level::Double(first, second));
        }
        Err(FsError::NoSpace)
    }
}

/// Reads an indirection block as an array of block ids.
pub fn read_level_block(device: &impl BlockDevice, block_id: u32) -> Result<Box<[u32; PTRS_PER_BLOCK]>> {
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    device.read_block(block_id as usize, buf.as_mut_slice())?;
    let ptrs = unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const [u32; PTRS_PER_BLOCK]) };
    Ok(Box::new(ptrs))
}

fn write_ptrs(
    device: &impl BlockDevice,
    block_id: u32,
    ptrs: &[u32; PTRS_PER_BLOCK],
) -> Result<()> {
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    unsafe {
        core::ptr::write_unaligned(buf.as_mut_ptr() as *mut [u32; PTRS_PER_BLOCK], *ptrs);
    }
    device.write_block(block_id as usize, buf.as_ref())
}

/// Translates `offset` to the data block that holds it. Returns 0 when
/// the traversal crosses an unallocated reference; the offset itself is
/// never range-checked against the file size here.
pub fn block_for_offset(device: &impl BlockDevice, node: &Inode, offset: u64) -> Result<u32> {
    match Level::of(offset)? {
        Level::Direct(i) => Ok(node.blocks[i]),
        Level::Single(i) => {
            let indirect = node.blocks[SINGLE_INDIRECT];
            if indirect == 0 {
                return Ok(0);
            }
            Ok(read_level_block(device, indirect)?[i])
        }
        Level::Double(i, j) => {
            let indirect = node.blocks[DOUBLE_INDIRECT];
            if indirect == 0 {
                return Ok(0);
            }
            let second = read_level_block(device, indirect)?[i];
            if second == 0 {
                return Ok(0);
            }
            Ok(read_level_block(device, second)?[j])
        }
    }
}

/// Allocates a zeroed block, remembering it for rollback.
fn alloc_tracked(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    bitmap: &mut Bitmap,
    taken: &mut Vec<u32>,
) -> Result<u32> {
    let blk = alloc_block(device, superblock, bitmap)?;
    taken.push(blk);
    Ok(blk)
}

fn release_tracked(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    bitmap: &mut Bitmap,
    taken: &[u32],
) -> Result<()> {
    for &blk in taken.iter().rev() {
        mark_block_free(device, superblock, bitmap, blk)?;
    }
    Ok(())
}

/// Installs the next logical block of the file, filling holes
/// left-to-right: the first empty direct slot, then the first empty
/// slot of the single-indirect block, then the first empty slot of the
/// double-indirect tree. Fresh indirection blocks are zeroed before
/// they are attached. On failure, every block taken for this call is
/// freed again before NoSpace surfaces.
pub fn assign_next_block(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    bitmap: &mut Bitmap,
    inode_id: u32,
    node: &mut Inode,
) -> Result<u32> {
    let mut taken = Vec::new();
    let saved = node.blocks;
    match assign_inner(device, superblock, bitmap, inode_id, node, &mut taken) {
        Ok(blk) => Ok(blk),
        Err(e) => {
            node.blocks = saved;
            release_tracked(device, superblock, bitmap, &taken)?;
            Err(e)
        }
    }
}

fn assign_inner(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    bitmap: &mut Bitmap,
    inode_id: u32,
    node: &mut Inode,
    taken: &mut Vec<u32>,
) -> Result<u32> {
    // Direct slots first.
    for i in 0..NUM_DIRECT_PTRS {
        if node.blocks[i] == 0 {
            let blk = alloc_tracked(device, superblock, bitmap, taken)?;
            node.blocks[i] = blk;
            crate::inode::write_inode(device, superblock, inode_id, node)?;
            return Ok(blk);
        }
    }

    // Single-indirect level.
    let mut inode_dirty = false;
    if node.blocks[SINGLE_INDIRECT] == 0 {
        let ind = alloc_tracked(device, superblock, bitmap, taken)?;
        write_ptrs(device, ind, &[0; PTRS_PER_BLOCK])?;
        node.blocks[SINGLE_INDIRECT] = ind;
        inode_dirty = true;
    }
    let ind = node.blocks[SINGLE_INDIRECT];
    let mut ptrs = read_level_block(device, ind)?;
    if let Some(slot) = ptrs.iter().position(|&p| p == 0) {
        let blk = alloc_tracked(device, superblock, bitmap, taken)?;
        ptrs[slot] = blk;
        write_ptrs(device, ind, &ptrs)?;
        if inode_dirty {
            crate::inode::write_inode(device, superblock, inode_id, node)?;
        }
        return Ok(blk);
    }

    // Double-indirect level.
    let mut inode_dirty = false;
    if node.blocks[DOUBLE_INDIRECT] == 0 {
        let ind = alloc_tracked(device, superblock, bitmap, taken)?;
        write_ptrs(device, ind, &[0; PTRS_PER_BLOCK])?;
        node.blocks[DOUBLE_INDIRECT] = ind;
        inode_dirty = true;
    }
    let top = node.blocks[DOUBLE_INDIRECT];
    let mut first = read_level_block(device, top)?;
    for i in 0..PTRS_PER_BLOCK {
        if first[i] == 0 {
            let second = alloc_tracked(device, superblock, bitmap, taken)?;
            write_ptrs(device, second, &[0; PTRS_PER_BLOCK])?;
            let blk = alloc_tracked(device, superblock, bitmap, taken)?;
            let mut ptrs = [0; PTRS_PER_BLOCK];
            ptrs[0] = blk;
            write_ptrs(device, second, &ptrs)?;
            first[i] = second;
            write_ptrs(device, top, &first)?;
            if inode_dirty {
                crate::inode::write_inode(device, superblock, inode_id, node)?;
            }
            return Ok(blk);
        }
        let mut ptrs = read_level_block(device, first[i])?;
        if let Some(slot) = ptrs.iter().position(|&p| p == 0) {
            let blk = alloc_tracked(device, superblock, bitmap, taken)?;
            ptrs[slot] = blk;
            write_ptrs(device, first[i], &ptrs)?;
            if inode_dirty {
                crate::inode::write_inode(device, superblock, inode_id, node)?;
            }
            return Ok(blk);
        }
    }

    Err(FsError::NoSpace)
}
