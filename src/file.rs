//! Byte-granular file I/O: maps each per-block window of a request
//! through the indirection mapper, allocating blocks on demand for
//! writes and reading zeros through holes.

use crate::bitmap::Bitmap;
use crate::config::*;
use crate::error::Result;
use crate::indirect::{assign_next_block, block_for_offset};
use crate::inode::{unix_now, write_inode};
use crate::structs::{Inode, SuperBlock};
use crate::BlockDevice;

/// Reads up to `buf.len()` bytes at `offset`. The request is clamped to
/// the file size; the clamped-off tail of `buf` is zero-filled. Returns
/// the number of file bytes delivered and stamps the access time.
pub fn fread(
    device: &impl BlockDevice,
    superblock: &SuperBlock,
    inode_id: u32,
    node: &mut Inode,
    offset: u64,
    buf: &mut [u8],
) -> Result<usize> {
    if offset >= node.size as u64 {
        buf.fill(0);
        return Ok(0);
    }
    let n = buf.len().min((node.size as u64 - offset) as usize);
    buf[n..].fill(0);

    let mut copied = 0;
    let mut pos = offset;
    let mut block_buf = Box::new([0u8; BLOCK_SIZE]);
    while copied < n {
        let start = pos as usize % BLOCK_SIZE;
        let take = (BLOCK_SIZE - start).min(n - copied);
        let blk = block_for_offset(device, node, pos)?;
        if blk == 0 {
            // A hole: nothing was ever written here.
            buf[copied..copied + take].fill(0);
        } else {
            device.read_block(blk as usize, block_buf.as_mut_slice())?;
            buf[copied..copied + take].copy_from_slice(&block_buf[start..start + take]);
        }
        copied += take;
        pos += take as u64;
    }

    node.atime = unix_now();
    write_inode(device, superblock, inode_id, node)?;
    Ok(n)
}

/// Writes `data` at `offset`, allocating the next logical block
/// whenever the translator reports a hole. Each touched block is
/// read-modified-written so unrelated bytes survive. The size grows to
/// max(old size, offset + written) and all three timestamps are
/// stamped.
pub fn fwrite(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    bitmap: &mut Bitmap,
    inode_id: u32,
    node: &mut Inode,
    offset: u64,
    data: &[u8],
) -> Result<usize> {
    if data.is_empty() {
        return Ok(0);
    }
    if offset + data.len() as u64 > u32::MAX as u64 {
        return Err(crate::error::FsError::NoSpace);
    }

    let mut written = 0;
    let mut pos = offset;
    let mut block_buf = Box::new([0u8; BLOCK_SIZE]);
    while written < data.len() {
        let start = pos as usize % BLOCK_SIZE;
        let take = (BLOCK_SIZE - start).min(data.len() - written);
        let mut blk = block_for_offset(device, node, pos)?;
        if blk == 0 {
            blk = assign_next_block(device, superblock, bitmap, inode_id, node)?;
        }
        device.read_block(blk as usize, block_buf.as_mut_slice())?;
        block_buf[start..start + take].copy_from_slice(&data[written..written + take]);
        device.write_block(blk as usize, block_buf.as_ref())?;
        written += take;
        pos += take as u64;
    }

    let end = offset + written as u64;
    if end > node.size as u64 {
        node.size = end as u32;
    }
    node.touch(unix_now());
    write_inode(device, superblock, inode_id, node)?;
    Ok(written)
}
