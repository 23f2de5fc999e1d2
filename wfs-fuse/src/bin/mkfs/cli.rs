use std::path::PathBuf;

use clap::Parser;
use wfs::RaidMode;

/// Format disk images as one RAID volume
#[derive(Parser)]
pub struct Cli {
    /// RAID mode: 0 (striping), 1 (mirroring) or 1v (mirroring with verified reads)
    #[arg(short, long = "raid")]
    pub raid: RaidMode,

    /// Disk image, repeat for every disk (at least 2)
    #[arg(short, long = "disk", required = true)]
    pub disks: Vec<PathBuf>,

    /// Number of inodes, rounded up to a multiple of 32
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub inodes: u64,

    /// Number of data blocks, rounded up to a multiple of 32
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub blocks: u64,
}
