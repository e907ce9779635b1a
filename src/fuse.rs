//! FUSE dispatch layer: adapts kernel upcalls to the core's path-based
//! operations. The kernel speaks inode numbers, the core speaks paths,
//! so the adapter keeps an ino -> path table populated by lookup and
//! the create operations. ino is always the core inode id plus one
//! (FUSE reserves 1 for the root).

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr as FuseFileAttr, FileType as FuseFileType, Filesystem, MountOption, ReplyAttr,
    ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use log::warn;

use crate::structs::{FileAttr, FileType};
use crate::{BlockDevice, Error, FileSystem};

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;

pub struct SfsFuse<D: BlockDevice> {
    fs: FileSystem<D>,
    paths: HashMap<u64, String>,
}

impl<D: BlockDevice> SfsFuse<D> {
    pub fn new(fs: FileSystem<D>) -> Self {
        let mut paths = HashMap::new();
        paths.insert(ROOT_INO, "/".to_string());
        SfsFuse { fs, paths }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.paths.get(&ino).cloned()
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let name = name.to_str()?;
        let parent = self.paths.get(&parent)?;
        if parent == "/" {
            Some(format!("/{name}"))
        } else {
            Some(format!("{parent}/{name}"))
        }
    }

    fn remember(&mut self, attr: &FileAttr, path: String) -> u64 {
        let ino = attr.ino as u64 + 1;
        self.paths.insert(ino, path);
        ino
    }

    fn to_fuse_attr(attr: &FileAttr, ino: u64) -> FuseFileAttr {
        let kind = match attr.kind {
            FileType::Dir => FuseFileType::Directory,
            FileType::File => FuseFileType::RegularFile,
        };
        FuseFileAttr {
            ino,
            size: attr.size,
            blocks: attr.blocks,
            atime: epoch(attr.atime),
            mtime: epoch(attr.mtime),
            ctime: epoch(attr.ctime),
            crtime: epoch(attr.ctime),
            kind,
            perm: (attr.mode & 0o7777) as u16,
            nlink: attr.nlink,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: attr.blksize,
            flags: 0,
        }
    }
}

fn epoch(secs: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs as u64)
}

impl<D: BlockDevice> Filesystem for SfsFuse<D> {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.getattr(&path) {
            Ok(attr) => {
                let ino = self.remember(&attr, path);
                reply.entry(&TTL, &Self::to_fuse_attr(&attr, ino), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.getattr(&path) {
            Ok(attr) => reply.attr(&TTL, &Self::to_fuse_attr(&attr, ino)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let fh = match self.fs.create(&path, flags) {
            Ok(fh) => fh,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        match self.fs.getattr(&path) {
            Ok(attr) => {
                let ino = self.remember(&attr, path);
                reply.created(&TTL, &Self::to_fuse_attr(&attr, ino), 0, fh, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Err(e) = self.fs.mkdir(&path) {
            reply.error(e.errno());
            return;
        }
        match self.fs.getattr(&path) {
            Ok(attr) => {
                let ino = self.remember(&attr, path);
                reply.entry(&TTL, &Self::to_fuse_attr(&attr, ino), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.unlink(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.rmdir(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.open(&path, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.fs.release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut buf = vec![0u8; size as usize];
        match self.fs.read(fh, offset as u64, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.fs.write(fh, offset as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.opendir(&path) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        match self.fs.releasedir(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        // The core stores no dot entries; synthesize them here.
        let mut names = vec![".".to_string(), "..".to_string()];
        let listed = self.fs.readdir(&path, &mut |name| {
            names.push(name.to_string());
            false
        });
        if let Err(e) = listed {
            reply.error(e.errno());
            return;
        }

        for (i, name) in names.iter().enumerate().skip(offset as usize) {
            let (entry_ino, kind) = if i < 2 {
                (ino, FuseFileType::Directory)
            } else {
                let child = if path == "/" {
                    format!("/{name}")
                } else {
                    format!("{path}/{name}")
                };
                match self.fs.getattr(&child) {
                    Ok(attr) => {
                        let kind = match attr.kind {
                            FileType::Dir => FuseFileType::Directory,
                            FileType::File => FuseFileType::RegularFile,
                        };
                        (attr.ino as u64 + 1, kind)
                    }
                    Err(e) => {
                        warn!("readdir: entry {name:?} vanished: {e}");
                        continue;
                    }
                }
            };
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }
}

/// Mounts the file system at `mount_point` and blocks until unmount.
pub fn mount<D: BlockDevice + 'static>(
    fs: FileSystem<D>,
    mount_point: impl AsRef<Path>,
    options: &[MountOption],
) -> crate::Result<()> {
    fuser::mount2(SfsFuse::new(fs), mount_point, options).map_err(|_| Error::Io)
}
