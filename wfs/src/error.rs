use std::path::PathBuf;

/// 格式化或挂载阶段的失败，进程会在释放磁盘后以非零状态退出
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("a volume needs at least 2 disks, got {0}")]
    TooFewDisks(usize),

    #[error("inode and data block counts must both be positive")]
    EmptyGeometry,

    #[error("{}: image holds {actual} bytes but the layout needs {needed}", path.display())]
    TooSmall {
        path: PathBuf,
        actual: u64,
        needed: u64,
    },

    #[error("{}: superblock geometry is inconsistent", path.display())]
    BadLayout { path: PathBuf },

    #[error("{}: superblock does not belong to the same volume as the first disk", path.display())]
    Mismatch { path: PathBuf },

    #[error("unknown RAID mode {0}")]
    UnknownRaidMode(u32),

    #[error("{}: disk ordinal {order} is out of range or taken twice", path.display())]
    BadOrder { path: PathBuf, order: u64 },

    #[error("{}: root inode is missing or not a directory", path.display())]
    BadRoot { path: PathBuf },

    #[error(transparent)]
    Disk(#[from] block_dev::Error),
}
