use crate::config::NUM_OPEN_FILES;
use crate::error::{FsError, Result};

/// One slot of the open-file table.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFile {
    in_use: bool,
    pub inode_id: u32,
    pub flags: i32,
    pub index: u32,
}

/// Fixed-size table mapping opaque handles to inodes. Slots are
/// claimed on open/create/opendir and returned on release.
pub struct HandleTable {
    slots: [OpenFile; NUM_OPEN_FILES],
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable {
            slots: [OpenFile::default(); NUM_OPEN_FILES],
        }
    }

    /// Claims the first free slot; its index is the handle.
    pub fn alloc(&mut self, inode_id: u32, flags: i32) -> Result<u64> {
        for (fh, slot) in self.slots.iter_mut().enumerate() {
            if !slot.in_use {
                *slot = OpenFile {
                    in_use: true,
                    inode_id,
                    flags,
                    index: 0,
                };
                return Ok(fh as u64);
            }
        }
        Err(FsError::TooManyOpenFiles)
    }

    pub fn get(&self, fh: u64) -> Result<&OpenFile> {
        self.slots
            .get(fh as usize)
            .filter(|slot| slot.in_use)
            .ok_or(FsError::Io)
    }

    pub fn release(&mut self, fh: u64) -> Result<()> {
        let slot = self
            .slots
            .get_mut(fh as usize)
            .filter(|slot| slot.in_use)
            .ok_or(FsError::Io)?;
        *slot = OpenFile::default();
        Ok(())
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
