use thiserror::Error;

/// Every failure a file operation can report. No kind is ever retried
/// inside the core; all surface directly at the facade boundary.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("file exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("no space left on device")]
    NoSpace,
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("file name too long")]
    NameTooLong,
    #[error("path must be absolute")]
    InvalidPath,
    #[error("out of memory")]
    OutOfMemory,
    #[error("i/o error on backing image")]
    Io,
    #[error("backing image has an invalid geometry")]
    InvalidImage,
}

impl FsError {
    /// The libc errno this kind maps to at the host boundary. The
    /// dispatcher negates it; the core never deals in raw integers.
    pub fn errno(self) -> libc::c_int {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::NoSpace => libc::ENOSPC,
            FsError::TooManyOpenFiles => libc::EMFILE,
            FsError::NameTooLong => libc::ENAMETOOLONG,
            FsError::InvalidPath => libc::EIO,
            FsError::OutOfMemory => libc::ENOMEM,
            FsError::Io => libc::EIO,
            FsError::InvalidImage => libc::EIO,
        }
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
