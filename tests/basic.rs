#![allow(unused)]

use std::sync::Arc;

mod common;

use common::{free_bits, free_inode_records, RamDisk};
use sfs::*;

#[test]
fn test_geometry_derivation() {
    // The default 128 MiB image: the inode table must be able to name
    // every remaining block as an individual file.
    let sb = SuperBlock::new(TOTAL_BLOCKS as u32).unwrap();
    assert_eq!(sb.magic, 0xEF53);
    assert_eq!(sb.block_size, BLOCK_SIZE as u32);
    assert_eq!(sb.num_inode_blocks, 630);
    assert_eq!(sb.num_inodes, 630 * 51);
    assert_eq!(sb.first_inode_block, 1);
    assert_eq!(sb.first_data_block, 631);
    assert_eq!(sb.bitmap_block, 631);
}

#[test]
fn test_geometry_limits() {
    // One bitmap block bounds the image at BLOCK_SIZE * 8 blocks.
    assert!(SuperBlock::new((BLOCK_SIZE * 8) as u32).is_ok());
    assert!(matches!(
        SuperBlock::new((BLOCK_SIZE * 8 + 1) as u32),
        Err(Error::InvalidImage)
    ));
}

#[test]
fn test_format_fresh_image() {
    let rd = Arc::new(RamDisk::new(256));
    let fs = FileSystem::mount(rd.clone()).unwrap();
    let sb = fs.superblock();
    log!("{}", fs.dump());

    assert!(sb.is_valid());
    // Metadata blocks plus the root's first data block are in use.
    assert_eq!(sb.num_free_blocks, sb.num_blocks - sb.first_data_block - 2);
    assert_eq!(sb.num_free_inodes, sb.num_inodes - 1);
    assert_eq!(sb.num_free_blocks, free_bits(&*rd, sb));
    assert_eq!(sb.num_free_inodes, free_inode_records(&*rd, sb));

    let root = fs.get_inode(ROOT_INODE_ID).unwrap();
    assert!(root.is_in_use());
    assert!(root.is_dir());
    assert_eq!(root.child_count, 0);
    assert_ne!(root.blocks[0], 0);
}

#[test]
fn test_create_nested() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();

    fs.mkdir("/a").unwrap();
    fs.mkdir("/a/b").unwrap();
    let fh = fs.create("/a/b/c.txt", 0).unwrap();
    fs.release(fh).unwrap();

    let id = fs.lookup("/a/b/c.txt").unwrap();
    let node = fs.get_inode(id).unwrap();
    assert!(node.is_in_use());
    assert_eq!(node.ftype(), FileType::File);

    let parent = fs.lookup("/a/b").unwrap();
    assert_eq!(fs.get_inode(parent).unwrap().child_count, 1);
    assert_eq!(fs.get_inode(fs.lookup("/a").unwrap()).unwrap().child_count, 1);
    assert_eq!(fs.get_inode(ROOT_INODE_ID).unwrap().child_count, 1);
}

#[test]
fn test_mkdir_existing() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();

    fs.mkdir("/a").unwrap();
    assert_eq!(fs.mkdir("/a"), Err(Error::AlreadyExists));

    // Still exactly one directory.
    let attr = fs.getattr("/a").unwrap();
    assert_eq!(attr.kind, FileType::Dir);
    assert_eq!(fs.get_inode(ROOT_INODE_ID).unwrap().child_count, 1);
}

#[test]
fn test_lookup_failures() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();

    assert_eq!(fs.lookup("/missing"), Err(Error::NotFound));
    assert_eq!(fs.lookup("relative"), Err(Error::InvalidPath));

    let fh = fs.create("/file", 0).unwrap();
    fs.release(fh).unwrap();
    assert_eq!(fs.lookup("/file/child"), Err(Error::NotADirectory));

    let long = format!("/{}", "n".repeat(NAME_MAX + 1));
    assert_eq!(fs.lookup(&long), Err(Error::NameTooLong));
    // The maximum name itself is fine.
    let just_fits = format!("/{}", "n".repeat(NAME_MAX));
    let fh = fs.create(&just_fits, 0).unwrap();
    fs.release(fh).unwrap();
    assert!(fs.lookup(&just_fits).is_ok());
}

#[test]
fn test_getattr() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();

    let root = fs.getattr("/").unwrap();
    assert_eq!(root.kind, FileType::Dir);
    assert_eq!(root.mode, 0o040777);
    assert_eq!(root.nlink, 1);

    let fh = fs.create("/f", 0).unwrap();
    fs.write(fh, 0, &[7u8; 5000]).unwrap();
    fs.release(fh).unwrap();

    let attr = fs.getattr("/f").unwrap();
    assert_eq!(attr.kind, FileType::File);
    assert_eq!(attr.mode, 0o100777);
    assert_eq!(attr.size, 5000);
    assert_eq!(attr.blksize, BLOCK_SIZE as u32);
    assert_eq!(attr.blocks, 5000 / 512);
    assert!(attr.mtime > 0);
}

#[test]
fn test_write_read_roundtrip() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();

    let pattern: Vec<u8> = vec![b'A'; 100_000];
    let fh = fs.create("/f", 0).unwrap();
    assert_eq!(fs.write(fh, 0, &pattern).unwrap(), pattern.len());

    let mut buf = vec![0u8; pattern.len()];
    assert_eq!(fs.read(fh, 0, &mut buf).unwrap(), pattern.len());
    assert_eq!(buf, pattern);

    assert_eq!(fs.getattr("/f").unwrap().size, 100_000);

    // Reading past the end delivers nothing and zeroes the buffer.
    let mut tail = vec![0xFFu8; 10];
    assert_eq!(fs.read(fh, 100_000, &mut tail).unwrap(), 0);
    assert_eq!(tail, vec![0u8; 10]);

    // A read straddling the end is clamped and zero-padded.
    let mut edge = vec![0xFFu8; 10];
    assert_eq!(fs.read(fh, 99_995, &mut edge).unwrap(), 5);
    assert_eq!(&edge[..5], &pattern[99_995..]);
    assert_eq!(&edge[5..], &[0u8; 5]);

    fs.release(fh).unwrap();
}

#[test]
fn test_overwrite_keeps_unrelated_bytes() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();

    let fh = fs.create("/f", 0).unwrap();
    fs.write(fh, 0, &[b'x'; 9000]).unwrap();
    // Rewrite a window in the middle; neighbours must survive.
    fs.write(fh, 4090, b"HELLO").unwrap();

    let mut buf = vec![0u8; 9000];
    fs.read(fh, 0, &mut buf).unwrap();
    assert_eq!(&buf[..4090], &[b'x'; 4090][..]);
    assert_eq!(&buf[4090..4095], b"HELLO");
    assert_eq!(&buf[4095..], &[b'x'; 4905][..]);
    // Size unchanged by an interior write.
    assert_eq!(fs.getattr("/f").unwrap().size, 9000);
    fs.release(fh).unwrap();
}

#[test]
fn test_directory_capacity() {
    let rd = Arc::new(RamDisk::new(1024));
    let mut fs = FileSystem::mount(rd).unwrap();
    fs.mkdir("/d").unwrap();

    for i in 0..MAX_DIR_ENTRIES {
        let fh = fs.create(&format!("/d/f{i}"), 0).unwrap();
        fs.release(fh).unwrap();
    }
    let dir = fs.get_inode(fs.lookup("/d").unwrap()).unwrap();
    assert_eq!(dir.child_count as usize, MAX_DIR_ENTRIES);

    // Entry 449 does not fit in 14 direct blocks.
    assert_eq!(fs.create("/d/overflow", 0), Err(Error::NoSpace));
    let dir = fs.get_inode(fs.lookup("/d").unwrap()).unwrap();
    assert_eq!(dir.child_count as usize, MAX_DIR_ENTRIES);
}

#[test]
fn test_indirect_levels() {
    let rd = Arc::new(RamDisk::new(2048));
    let mut fs = FileSystem::mount(rd.clone()).unwrap();

    let fh = fs.create("/big", 0).unwrap();
    let id = fs.lookup("/big").unwrap();

    let direct_span = NUM_DIRECT_PTRS * BLOCK_SIZE;
    let single_span = PTRS_PER_BLOCK * BLOCK_SIZE;

    // Fill the direct region plus one byte: the single-indirect block
    // appears and maps the spill.
    let data: Vec<u8> = (0..direct_span + 1).map(|i| (i % 251) as u8).collect();
    fs.write(fh, 0, &data).unwrap();
    let node = fs.get_inode(id).unwrap();
    assert_ne!(node.blocks[SINGLE_INDIRECT], 0);
    assert_eq!(node.blocks[DOUBLE_INDIRECT], 0);
    let blk = block_for_offset(&*rd, &node, direct_span as u64).unwrap();
    assert_ne!(blk, 0);
    let mut probe = vec![0u8; 1];
    fs.read(fh, direct_span as u64, &mut probe).unwrap();
    assert_eq!(probe[0], (direct_span % 251) as u8);

    // Push past the single-indirect region: the double-indirect tree
    // appears.
    let spill = vec![b'z'; single_span + 1];
    fs.write(fh, (direct_span + 1) as u64, &spill).unwrap();
    let node = fs.get_inode(id).unwrap();
    assert_ne!(node.blocks[DOUBLE_INDIRECT], 0);
    let last = (direct_span + single_span) as u64;
    let blk = block_for_offset(&*rd, &node, last).unwrap();
    assert_ne!(blk, 0);

    let mut buf = vec![0u8; 2];
    fs.read(fh, last, &mut buf).unwrap();
    assert_eq!(buf, [b'z', b'z']);

    fs.release(fh).unwrap();
}

#[test]
fn test_unlink_releases_everything() {
    let rd = Arc::new(RamDisk::new(2048));
    let mut fs = FileSystem::mount(rd.clone()).unwrap();

    let before_create = fs.superblock().num_free_blocks;
    let free_inodes_before = fs.superblock().num_free_inodes;

    let fh = fs.create("/victim", 0).unwrap();
    let id = fs.lookup("/victim").unwrap();
    // Reach all three levels: direct, single- and double-indirect.
    let len = NUM_DIRECT_PTRS * BLOCK_SIZE + PTRS_PER_BLOCK * BLOCK_SIZE + BLOCK_SIZE;
    fs.write(fh, 0, &vec![1u8; len]).unwrap();
    fs.release(fh).unwrap();

    let node = fs.get_inode(id).unwrap();
    assert_ne!(node.blocks[SINGLE_INDIRECT], 0);
    assert_ne!(node.blocks[DOUBLE_INDIRECT], 0);

    fs.unlink("/victim").unwrap();

    let sb = fs.superblock();
    assert_eq!(sb.num_free_blocks, before_create);
    assert_eq!(sb.num_free_inodes, free_inodes_before);
    assert_eq!(sb.num_free_blocks, free_bits(&*rd, sb));
    assert!(!fs.get_inode(id).unwrap().is_in_use());
    assert_eq!(fs.lookup("/victim"), Err(Error::NotFound));
}

#[test]
fn test_rmdir() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd.clone()).unwrap();

    let before = fs.superblock().num_free_blocks;
    fs.mkdir("/d").unwrap();
    let fh = fs.create("/d/f", 0).unwrap();
    fs.release(fh).unwrap();

    assert_eq!(fs.rmdir("/d"), Err(Error::NotEmpty));

    fs.unlink("/d/f").unwrap();
    fs.rmdir("/d").unwrap();
    assert_eq!(fs.lookup("/d"), Err(Error::NotFound));
    assert_eq!(fs.superblock().num_free_blocks, before);
    assert_eq!(fs.superblock().num_free_blocks, free_bits(&*rd, fs.superblock()));

    assert_eq!(fs.rmdir("/d"), Err(Error::NotFound));
}

#[test]
fn test_root_cannot_be_removed() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd.clone()).unwrap();

    assert_eq!(fs.rmdir("/"), Err(Error::InvalidPath));
    assert_eq!(fs.unlink("/"), Err(Error::InvalidPath));
    assert_eq!(fs.rmdir("///"), Err(Error::InvalidPath));

    // The root inode and its block survive untouched.
    let root = fs.get_inode(ROOT_INODE_ID).unwrap();
    assert!(root.is_in_use());
    assert!(root.is_dir());
    assert_ne!(root.blocks[0], 0);
    let sb = fs.superblock();
    assert_eq!(sb.num_free_blocks, free_bits(&*rd, sb));
    assert_eq!(sb.num_free_inodes, sb.num_inodes - 1);

    // And the volume still takes new entries.
    fs.mkdir("/survivor").unwrap();
    assert!(fs.lookup("/survivor").is_ok());
}

#[test]
fn test_rmdir_not_a_directory() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();
    let fh = fs.create("/f", 0).unwrap();
    fs.release(fh).unwrap();
    assert_eq!(fs.rmdir("/f"), Err(Error::NotADirectory));
}

#[test]
fn test_readdir() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();

    fs.mkdir("/d").unwrap();
    for name in ["one", "two", "three"] {
        let fh = fs.create(&format!("/d/{name}"), 0).unwrap();
        fs.release(fh).unwrap();
    }

    let mut names = Vec::new();
    fs.readdir("/d", &mut |name| {
        names.push(name.to_string());
        false
    })
    .unwrap();
    assert_eq!(names, ["one", "two", "three"]);

    // A filler that reports itself full aborts the walk.
    let mut first_only = Vec::new();
    let res = fs.readdir("/d", &mut |name| {
        first_only.push(name.to_string());
        true
    });
    assert_eq!(res, Err(Error::OutOfMemory));
    assert_eq!(first_only, ["one"]);

    assert_eq!(
        fs.readdir("/missing", &mut |_| false),
        Err(Error::NotFound)
    );
}

#[test]
fn test_remove_compacts_entries() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();

    for name in ["a", "b", "c", "d"] {
        let fh = fs.create(&format!("/{name}"), 0).unwrap();
        fs.release(fh).unwrap();
    }
    // Removing from the middle moves the last entry into the gap.
    fs.unlink("/b").unwrap();

    let mut names = Vec::new();
    fs.readdir("/", &mut |name| {
        names.push(name.to_string());
        false
    })
    .unwrap();
    assert_eq!(names, ["a", "d", "c"]);
    for name in &names {
        assert!(fs.lookup(&format!("/{name}")).is_ok());
    }
}

#[test]
fn test_handle_table_exhaustion() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();
    let fh = fs.create("/f", 0).unwrap();
    fs.release(fh).unwrap();

    let mut handles = Vec::new();
    for _ in 0..NUM_OPEN_FILES {
        handles.push(fs.open("/f", 0).unwrap());
    }
    assert_eq!(fs.open("/f", 0), Err(Error::TooManyOpenFiles));

    // Releasing a slot makes it reusable.
    fs.release(handles.pop().unwrap()).unwrap();
    let fh = fs.open("/f", 0).unwrap();
    fs.release(fh).unwrap();
}

#[test]
fn test_create_existing_opens() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();

    let fh = fs.create("/f", 0).unwrap();
    fs.write(fh, 0, b"payload").unwrap();
    fs.release(fh).unwrap();
    let inodes_used = fs.superblock().num_free_inodes;

    // A second create is just an open; contents and inode survive.
    let fh = fs.create("/f", 0).unwrap();
    let mut buf = vec![0u8; 7];
    fs.read(fh, 0, &mut buf).unwrap();
    assert_eq!(&buf, b"payload");
    fs.release(fh).unwrap();
    assert_eq!(fs.superblock().num_free_inodes, inodes_used);
}

#[test]
fn test_create_missing_parent() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();
    assert_eq!(fs.create("/no/such/file", 0), Err(Error::NotFound));
    assert_eq!(fs.mkdir("/no/such/dir"), Err(Error::NotFound));
}

#[test]
fn test_inode_reuse() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd).unwrap();

    let fh = fs.create("/f", 0).unwrap();
    fs.release(fh).unwrap();
    let first = fs.lookup("/f").unwrap();
    fs.unlink("/f").unwrap();

    let fh = fs.create("/g", 0).unwrap();
    fs.release(fh).unwrap();
    // The freed inode is the lowest free slot and gets reused.
    assert_eq!(fs.lookup("/g").unwrap(), first);
}

#[test]
fn test_remount_preserves_state() {
    let rd = Arc::new(RamDisk::new(256));
    let mut fs = FileSystem::mount(rd.clone()).unwrap();

    fs.mkdir("/d").unwrap();
    let fh = fs.create("/d/f", 0).unwrap();
    fs.write(fh, 0, b"persistent").unwrap();
    fs.release(fh).unwrap();
    let free_blocks = fs.superblock().num_free_blocks;
    drop(fs);

    // The magic matches, so the second mount must not reformat.
    let mut fs = FileSystem::mount(rd).unwrap();
    assert_eq!(fs.superblock().num_free_blocks, free_blocks);
    let fh = fs.open("/d/f", 0).unwrap();
    let mut buf = vec![0u8; 10];
    assert_eq!(fs.read(fh, 0, &mut buf).unwrap(), 10);
    assert_eq!(&buf, b"persistent");
    fs.release(fh).unwrap();
}
