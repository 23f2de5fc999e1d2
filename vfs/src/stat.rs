use crate::DirEntryType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Inode number
    pub inode: u64,
    pub kind: DirEntryType,
    /// 类型位与权限位
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// File size
    pub size: u64,
    pub links: u32,
    /// 秒级时间戳
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl Stat {
    /// 只保留权限位
    #[inline]
    pub fn perm(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }
}

/// 卷的容量统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u32,
    pub blocks: u64,
    pub free_blocks: u64,
    pub inodes: u64,
    pub free_inodes: u64,
    pub name_max: u32,
}
