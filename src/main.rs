use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use fuser::MountOption;
use log::error;

use sfs::{FileSystem, ImageFile, TOTAL_BLOCKS};

/// Mount a flat-image file system over FUSE.
#[derive(Parser)]
#[command(name = "sfs", version)]
struct Cli {
    /// Backing image; created and sized on first use
    disk_file: PathBuf,

    /// Directory to mount the file system on
    mount_point: PathBuf,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Unmount automatically when the process exits
    #[arg(long)]
    auto_unmount: bool,

    /// Mount read-only
    #[arg(long)]
    read_only: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut options = vec![MountOption::FSName("sfs".to_string())];
    if cli.allow_other {
        options.push(MountOption::AllowOther);
    }
    if cli.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }
    if cli.read_only {
        options.push(MountOption::RO);
    }

    let device = match ImageFile::open(&cli.disk_file, TOTAL_BLOCKS) {
        Ok(device) => device,
        Err(e) => {
            error!("cannot open image {:?}: {e}", cli.disk_file);
            process::exit(1);
        }
    };
    let fs = match FileSystem::mount(Arc::new(device)) {
        Ok(fs) => fs,
        Err(e) => {
            error!("mount failed: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = sfs::fuse::mount(fs, &cli.mount_point, &options) {
        error!("fuse session failed: {e}");
        process::exit(1);
    }
}
