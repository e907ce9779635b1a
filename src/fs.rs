use std::fmt::Write as _;
use std::sync::Arc;

use log::{debug, info};

use crate::bitmap::{mark_block_free, Bitmap};
use crate::config::*;
use crate::directory::{add_file_entry, remove_file_entry};
use crate::error::{FsError, Result};
use crate::file::{fread, fwrite};
use crate::handle::HandleTable;
use crate::indirect::read_level_block;
use crate::inode::{allocate_file, destroy_inode, get_inode, unix_now, write_inode};
use crate::path::{find_file, find_parent, split};
use crate::structs::{FileAttr, FileType, Inode, SuperBlock};
use crate::superblock;
use crate::BlockDevice;

/// The mounted file system: the backing device, the persisted
/// superblock, the resident bitmap, and the open-handle table. All
/// operations run to completion before the next begins; the host
/// dispatcher must serialize access.
pub struct FileSystem<D: BlockDevice> {
    device: Arc<D>,
    superblock: SuperBlock,
    bitmap: Bitmap,
    handles: HandleTable,
}

impl<D: BlockDevice> FileSystem<D> {
    /// Mounts the device. An image whose magic does not match is
    /// formatted; a valid one is reused as-is. Either way, if no inode
    /// has ever been allocated the root directory is created at
    /// inode 0.
    pub fn mount(device: Arc<D>) -> Result<Self> {
        let raw = superblock::read_superblock(&*device)?;
        let (superblock, bitmap) = if raw.is_valid() {
            info!("valid superblock found, reusing image");
            superblock::load(&*device)?
        } else {
            info!("superblock magic {:#x} invalid, formatting", raw.magic);
            superblock::format(&*device)?
        };

        let mut fs = Self {
            device,
            superblock,
            bitmap,
            handles: HandleTable::new(),
        };
        if fs.superblock.num_free_inodes == fs.superblock.num_inodes {
            let root = allocate_file(
                &*fs.device,
                &mut fs.superblock,
                &mut fs.bitmap,
                FileType::Dir,
            )?;
            debug_assert_eq!(root, ROOT_INODE_ID);
        }
        Ok(fs)
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn device(&self) -> Arc<D> {
        Arc::clone(&self.device)
    }

    /// Resolves a path to its inode id.
    pub fn lookup(&self, path: &str) -> Result<u32> {
        find_file(&*self.device, &self.superblock, path)
    }

    pub fn get_inode(&self, id: u32) -> Result<Inode> {
        get_inode(&*self.device, &self.superblock, id)
    }

    pub fn getattr(&self, path: &str) -> Result<FileAttr> {
        debug!("getattr path={path:?}");
        let id = self.lookup(path)?;
        let node = self.get_inode(id)?;
        let kind = node.ftype();
        let type_bits = match kind {
            FileType::Dir => 0o040000,
            FileType::File => 0o100000,
        };
        Ok(FileAttr {
            ino: id,
            kind,
            mode: type_bits | 0o777,
            nlink: 1,
            size: node.size as u64,
            atime: node.atime,
            mtime: node.mtime,
            ctime: node.ctime,
            blksize: self.superblock.block_size,
            blocks: node.size as u64 / 512,
        })
    }

    /// Creates and opens a regular file. An existing path simply opens.
    pub fn create(&mut self, path: &str, flags: i32) -> Result<u64> {
        debug!("create path={path:?} flags={flags:#o}");
        match self.lookup(path) {
            Ok(id) => self.handles.alloc(id, flags),
            Err(FsError::NotFound) => {
                let id = self.allocate_at(path, FileType::File)?;
                self.handles.alloc(id, flags)
            }
            Err(e) => Err(e),
        }
    }

    /// Creates a directory. Unlike create, an existing path is an
    /// error. No "." or ".." entries are stored.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        debug!("mkdir path={path:?}");
        match self.lookup(path) {
            Ok(_) => Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {
                self.allocate_at(path, FileType::Dir)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Allocates an inode of the given type and links it under its
    /// parent, touching the parent's timestamps. A failed link releases
    /// the fresh inode and its block again.
    fn allocate_at(&mut self, path: &str, ftype: FileType) -> Result<u32> {
        let parent = find_parent(&*self.device, &self.superblock, path)?;
        let (_, name) = split(path)?;
        if name.is_empty() {
            return Err(FsError::NotFound);
        }

        let mut parent_node = self.get_inode(parent)?;
        parent_node.touch(unix_now());
        write_inode(&*self.device, &self.superblock, parent, &parent_node)?;

        let id = allocate_file(&*self.device, &mut self.superblock, &mut self.bitmap, ftype)?;
        if let Err(e) = add_file_entry(
            &*self.device,
            &mut self.superblock,
            &mut self.bitmap,
            parent,
            name,
            id,
        ) {
            self.release_inode_blocks(id)?;
            return Err(e);
        }
        Ok(id)
    }

    /// Opens an existing file, claiming a handle slot.
    pub fn open(&mut self, path: &str, flags: i32) -> Result<u64> {
        debug!("open path={path:?} flags={flags:#o}");
        let id = self.lookup(path)?;
        self.handles.alloc(id, flags)
    }

    pub fn release(&mut self, fh: u64) -> Result<()> {
        debug!("release fh={fh}");
        self.handles.release(fh)
    }

    pub fn read(&mut self, fh: u64, offset: u64, buf: &mut [u8]) -> Result<usize> {
        debug!("read fh={fh} offset={offset} len={}", buf.len());
        let id = self.handles.get(fh)?.inode_id;
        let mut node = self.get_inode(id)?;
        fread(&*self.device, &self.superblock, id, &mut node, offset, buf)
    }

    pub fn write(&mut self, fh: u64, offset: u64, data: &[u8]) -> Result<usize> {
        debug!("write fh={fh} offset={offset} len={}", data.len());
        let id = self.handles.get(fh)?.inode_id;
        let mut node = self.get_inode(id)?;
        fwrite(
            &*self.device,
            &mut self.superblock,
            &mut self.bitmap,
            id,
            &mut node,
            offset,
            data,
        )
    }

    /// Removes a file: frees every reachable data block (double
    /// indirect first, then single, then direct), destroys the inode,
    /// and unlinks the name from the parent.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        debug!("unlink path={path:?}");
        let (_, name) = split(path)?;
        if name.is_empty() {
            // The root has no parent entry to remove.
            return Err(FsError::InvalidPath);
        }
        let id = self.lookup(path)?;
        let parent = find_parent(&*self.device, &self.superblock, path)?;
        self.release_inode_blocks(id)?;
        remove_file_entry(&*self.device, &mut self.superblock, parent, name)?;
        Ok(())
    }

    /// Removes an empty directory; a populated one reports NotEmpty.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        debug!("rmdir path={path:?}");
        let (_, name) = split(path)?;
        if name.is_empty() {
            // The root has no parent entry to remove.
            return Err(FsError::InvalidPath);
        }
        let id = self.lookup(path)?;
        let node = self.get_inode(id)?;
        if !node.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if node.child_count > 0 {
            return Err(FsError::NotEmpty);
        }
        let parent = find_parent(&*self.device, &self.superblock, path)?;
        for blk in node.blocks {
            if blk != 0 {
                mark_block_free(&*self.device, &mut self.superblock, &mut self.bitmap, blk)?;
            }
        }
        destroy_inode(&*self.device, &mut self.superblock, id)?;
        remove_file_entry(&*self.device, &mut self.superblock, parent, name)?;
        Ok(())
    }

    pub fn opendir(&mut self, path: &str) -> Result<u64> {
        debug!("opendir path={path:?}");
        let id = self.lookup(path)?;
        if !self.get_inode(id)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        self.handles.alloc(id, 0)
    }

    pub fn releasedir(&mut self, fh: u64) -> Result<()> {
        debug!("releasedir fh={fh}");
        self.handles.release(fh)
    }

    /// Walks the directory's live entries in insertion order, handing
    /// each name to `filler`. A filler that reports itself full aborts
    /// the walk with OutOfMemory.
    pub fn readdir(&self, path: &str, filler: &mut dyn FnMut(&str) -> bool) -> Result<()> {
        debug!("readdir path={path:?}");
        let id = self.lookup(path)?;
        let node = self.get_inode(id)?;
        for entry in crate::directory::list_entries(&*self.device, &node)? {
            let name = String::from_utf8_lossy(entry.name_bytes()).into_owned();
            if filler(&name) {
                return Err(FsError::OutOfMemory);
            }
        }
        Ok(())
    }

    /// Frees every data and indirection block the inode references,
    /// then zeroes and releases the inode itself.
    fn release_inode_blocks(&mut self, id: u32) -> Result<()> {
        let node = self.get_inode(id)?;

        if node.blocks[DOUBLE_INDIRECT] != 0 {
            let first = read_level_block(&*self.device, node.blocks[DOUBLE_INDIRECT])?;
            for &second in first.iter().filter(|&&p| p != 0) {
                let ptrs = read_level_block(&*self.device, second)?;
                for &blk in ptrs.iter().filter(|&&p| p != 0) {
                    mark_block_free(&*self.device, &mut self.superblock, &mut self.bitmap, blk)?;
                }
                mark_block_free(&*self.device, &mut self.superblock, &mut self.bitmap, second)?;
            }
            mark_block_free(
                &*self.device,
                &mut self.superblock,
                &mut self.bitmap,
                node.blocks[DOUBLE_INDIRECT],
            )?;
        }

        if node.blocks[SINGLE_INDIRECT] != 0 {
            let ptrs = read_level_block(&*self.device, node.blocks[SINGLE_INDIRECT])?;
            for &blk in ptrs.iter().filter(|&&p| p != 0) {
                mark_block_free(&*self.device, &mut self.superblock, &mut self.bitmap, blk)?;
            }
            mark_block_free(
                &*self.device,
                &mut self.superblock,
                &mut self.bitmap,
                node.blocks[SINGLE_INDIRECT],
            )?;
        }

        for blk in &node.blocks[..NUM_DIRECT_PTRS] {
            if *blk != 0 {
                mark_block_free(&*self.device, &mut self.superblock, &mut self.bitmap, *blk)?;
            }
        }

        destroy_inode(&*self.device, &mut self.superblock, id)?;
        Ok(())
    }

    /// Human-readable summary of the volume, for diagnostics and tests.
    pub fn dump(&self) -> String {
        let sb = &self.superblock;
        let mut out = String::new();
        let _ = writeln!(out, "magic: {:#x}", sb.magic);
        let _ = writeln!(out, "blocks: {} ({} free)", sb.num_blocks, sb.num_free_blocks);
        let _ = writeln!(out, "inodes: {} ({} free)", sb.num_inodes, sb.num_free_inodes);
        let _ = writeln!(
            out,
            "inode table: blocks [{}, {})",
            sb.first_inode_block, sb.first_data_block
        );
        let _ = writeln!(out, "bitmap block: {}", sb.bitmap_block);
        out
    }
}
