pub const MAGIC: u32 = 0xEF53; // Superblock magic; anything else triggers a format

pub const BLOCK_SIZE: usize = 4096;
pub const TOTAL_BLOCKS: usize = 32768; // 128 MiB image
pub const SUPERBLOCK_ID: usize = 0;
pub const ROOT_INODE_ID: u32 = 0;

pub const INODE_SIZE: usize = 80;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

pub const NAME_MAX: usize = 123; // name bytes, NUL excluded
pub const FILE_ENTRY_NAME_LEN: usize = 124; // name field incl. NUL padding
pub const FILE_ENTRY_SIZE: usize = 128;
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / FILE_ENTRY_SIZE;

pub const NUM_BLOCK_PTRS: usize = 14;
pub const NUM_DIRECT_PTRS: usize = 12;
pub const SINGLE_INDIRECT: usize = 12; // blocks[] slot of the single-indirect block
pub const DOUBLE_INDIRECT: usize = 13; // blocks[] slot of the double-indirect block
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// A directory stores entries in its 14 direct blocks only.
pub const MAX_DIR_ENTRIES: usize = NUM_BLOCK_PTRS * ENTRIES_PER_BLOCK;

pub const NUM_OPEN_FILES: usize = 128;
