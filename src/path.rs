//! Absolute-path resolution. Paths are walked as immutable slices;
//! components are split on '/' and looked up one directory at a time
//! starting from the root inode.

use crate::config::*;
use crate::directory::find_file_entry;
use crate::error::{FsError, Result};
use crate::inode::get_inode;
use crate::structs::SuperBlock;
use crate::BlockDevice;

/// Strips the leading '/' (required) and a single trailing '/'.
fn components(path: &str) -> Result<&str> {
    let rest = path.strip_prefix('/').ok_or(FsError::InvalidPath)?;
    Ok(rest.strip_suffix('/').unwrap_or(rest))
}

/// Resolves an absolute path to an inode id. The terminal component may
/// be of either type; every non-terminal component must be a directory.
pub fn find_file(device: &impl BlockDevice, superblock: &SuperBlock, path: &str) -> Result<u32> {
    let rest = components(path)?;
    let mut current = ROOT_INODE_ID;
    if rest.is_empty() {
        return Ok(current);
    }
    for component in rest.split('/') {
        if component.len() > NAME_MAX {
            return Err(FsError::NameTooLong);
        }
        let node = get_inode(device, superblock, current)?;
        let (id, _) = find_file_entry(device, &node, component)?;
        current = id;
    }
    Ok(current)
}

/// Splits a path into its parent and the final component.
/// eg. "/a/b/c" -> ("/a/b", "c"), "/a" -> ("/", "a"), "/" -> ("/", "").
pub fn split(path: &str) -> Result<(&str, &str)> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidPath);
    }
    let trimmed = path.strip_suffix('/').filter(|t| !t.is_empty()).unwrap_or(path);
    let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
    let cut = trimmed.rfind('/').unwrap_or(0);
    let name = &trimmed[cut + 1..];
    let parent = if cut == 0 { "/" } else { &trimmed[..cut] };
    Ok((parent, name))
}

/// Resolves the parent directory of a path; the root is its own parent.
pub fn find_parent(device: &impl BlockDevice, superblock: &SuperBlock, path: &str) -> Result<u32> {
    let (parent, _) = split(path)?;
    find_file(device, superblock, parent)
}
