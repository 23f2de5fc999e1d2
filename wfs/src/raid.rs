//! RAID 放置策略与读时表决

use vfs::DirEntryType;

use crate::RaidMode;

/// 一个数据块落在哪些盘上
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// 每块盘同一偏移处各一份
    All,
    /// 只在某一块盘上
    Disk(usize),
}

impl RaidMode {
    /// 某个 inode 的第`index`个数据块的放置方式。
    ///
    /// 只有条带化下普通文件的数据块按`index % disks`分散，
    /// 目录块与一切镜像模式的块都在每块盘上各一份。
    pub fn placement(self, kind: DirEntryType, index: usize, disks: usize) -> Placement {
        match (self, kind) {
            (RaidMode::Raid0, DirEntryType::Regular) => Placement::Disk(index % disks),
            _ => Placement::All,
        }
    }

    /// 间接块记录块偏移，属于元数据
    #[inline]
    pub fn indirect_placement(self) -> Placement {
        Placement::All
    }

    /// 读取时是否要比对各盘副本
    #[inline]
    pub fn votes(self) -> bool {
        self == RaidMode::Raid1v
    }
}

/// 字节和，按 32 位回绕
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |sum, &byte| sum.wrapping_add(byte.into()))
}

/// 选出校验和被最多副本认同的盘，票数相同时取序号最小者
pub fn elect(sums: &[u32]) -> usize {
    let votes = |sum: u32| sums.iter().filter(|&&other| other == sum).count();

    let mut winner = 0;
    let mut best = 0;
    for (disk, &sum) in sums.iter().enumerate() {
        let count = votes(sum);
        if count > best {
            winner = disk;
            best = count;
        }
    }

    winner
}
