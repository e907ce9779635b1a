//! Directory entries: fixed-size name -> inode records packed densely
//! in insertion order across a directory's direct blocks.

use crate::bitmap::{alloc_block, mark_block_free, Bitmap};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::{get_inode, write_inode};
use crate::structs::{FileEntry, Inode, SuperBlock};
use crate::BlockDevice;

/// Where an entry sits: which direct block of the directory, and which
/// slot within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub block: usize,
    pub slot: usize,
}

impl EntryLocation {
    fn of(index: usize) -> Self {
        EntryLocation {
            block: index / ENTRIES_PER_BLOCK,
            slot: index % ENTRIES_PER_BLOCK,
        }
    }
}

fn read_entries(
    device: &impl BlockDevice,
    block_id: u32,
) -> Result<Box<[FileEntry; ENTRIES_PER_BLOCK]>> {
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    device.read_block(block_id as usize, buf.as_mut_slice())?;
    let entries = unsafe {
        core::ptr::read_unaligned(buf.as_ptr() as *const [FileEntry; ENTRIES_PER_BLOCK])
    };
    Ok(Box::new(entries))
}

fn write_entries(
    device: &impl BlockDevice,
    block_id: u32,
    entries: &[FileEntry; ENTRIES_PER_BLOCK],
) -> Result<()> {
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    unsafe {
        core::ptr::write_unaligned(
            buf.as_mut_ptr() as *mut [FileEntry; ENTRIES_PER_BLOCK],
            *entries,
        );
    }
    device.write_block(block_id as usize, buf.as_ref())
}

/// Scans a directory for `name`. Returns the child's inode id and the
/// entry's location. The node must be a directory.
pub fn find_file_entry(
    device: &impl BlockDevice,
    node: &Inode,
    name: &str,
) -> Result<(u32, EntryLocation)> {
    if !node.is_dir() {
        return Err(FsError::NotADirectory);
    }

    let mut remaining = node.child_count as usize;
    let mut blk = 0;
    while remaining > 0 {
        let entries = read_entries(device, node.blocks[blk])?;
        let count = remaining.min(ENTRIES_PER_BLOCK);
        for slot in 0..count {
            if entries[slot].name_matches(name) {
                return Ok((
                    entries[slot].id,
                    EntryLocation {
                        block: blk,
                        slot,
                    },
                ));
            }
        }
        remaining -= count;
        blk += 1;
    }
    Err(FsError::NotFound)
}

/// Appends a `name -> child` entry to the directory. Refuses with
/// NoSpace once all 14 direct blocks are packed. If the target block is
/// a hole, it is allocated and attached first; a failure after that
/// detaches and frees it again so the directory stays consistent.
pub fn add_file_entry(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    bitmap: &mut Bitmap,
    dir_id: u32,
    name: &str,
    child: u32,
) -> Result<()> {
    let entry = FileEntry::new(name, child)?;
    let mut node = get_inode(device, superblock, dir_id)?;
    if !node.is_dir() {
        return Err(FsError::NotADirectory);
    }
    if node.child_count as usize == MAX_DIR_ENTRIES {
        return Err(FsError::NoSpace);
    }

    let loc = EntryLocation::of(node.child_count as usize);
    let mut fresh_block = false;
    if node.blocks[loc.block] == 0 {
        node.blocks[loc.block] = alloc_block(device, superblock, bitmap)?;
        node.size += BLOCK_SIZE as u32;
        fresh_block = true;
    }

    if let Err(e) = fill_slot(device, superblock, dir_id, &mut node, loc, entry) {
        if fresh_block {
            let blk = node.blocks[loc.block];
            node.blocks[loc.block] = 0;
            mark_block_free(device, superblock, bitmap, blk)?;
        }
        return Err(e);
    }
    Ok(())
}

fn fill_slot(
    device: &impl BlockDevice,
    superblock: &SuperBlock,
    dir_id: u32,
    node: &mut Inode,
    loc: EntryLocation,
    entry: FileEntry,
) -> Result<()> {
    let mut entries = read_entries(device, node.blocks[loc.block])?;
    entries[loc.slot] = entry;
    write_entries(device, node.blocks[loc.block], &entries)?;
    node.child_count += 1;
    write_inode(device, superblock, dir_id, node)
}

/// Collects the directory's live entries in insertion order.
pub fn list_entries(device: &impl BlockDevice, node: &Inode) -> Result<Vec<FileEntry>> {
    if !node.is_dir() {
        return Err(FsError::NotADirectory);
    }
    let mut out = Vec::with_capacity(node.child_count as usize);
    let mut remaining = node.child_count as usize;
    let mut blk = 0;
    while remaining > 0 {
        let entries = read_entries(device, node.blocks[blk])?;
        let count = remaining.min(ENTRIES_PER_BLOCK);
        out.extend_from_slice(&entries[..count]);
        remaining -= count;
        blk += 1;
    }
    Ok(out)
}

/// Removes the entry for `name`, compacting by moving the last entry
/// into the vacated slot. The trailing block is kept even when it
/// becomes empty. Returns the removed child's inode id.
pub fn remove_file_entry(
    device: &impl BlockDevice,
    superblock: &mut SuperBlock,
    dir_id: u32,
    name: &str,
) -> Result<u32> {
    let mut node = get_inode(device, superblock, dir_id)?;
    let (child, loc) = find_file_entry(device, &node, name)?;

    let last = EntryLocation::of(node.child_count as usize - 1);
    if loc != last {
        let last_entry = read_entries(device, node.blocks[last.block])?[last.slot];
        let mut entries = read_entries(device, node.blocks[loc.block])?;
        entries[loc.slot] = last_entry;
        write_entries(device, node.blocks[loc.block], &entries)?;
    }

    node.child_count -= 1;
    write_inode(device, superblock, dir_id, &node)?;
    Ok(child)
}
