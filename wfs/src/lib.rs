/* wfs 的整体架构，自上而下 */

// 文件系统操作层：路径解析与面向调用方的各项操作
mod ops;

// 目录层：目录项的查找、插入与删除
mod dir;

// 卷管理层：挂载上下文、inode 与数据块的分配、逻辑块到物理块的映射
mod fs;

// RAID 放置策略与读时表决
mod raid;

// 磁盘数据结构层
mod layout;

mod error;

use std::time::{SystemTime, UNIX_EPOCH};

pub use self::{
    error::MountError,
    fs::{FormatOptions, Wfs},
    layout::{
        Bitmap, BlockSlot, DirEntry, DiskInode, Layout, Owner, ParseRaidModeError, RaidMode,
        SuperBlock,
    },
    raid::Placement,
};

pub const BLOCK_SIZE: usize = 512;
/// 目录项中名字字段的长度，名字可以恰好填满而不留 `\0`
pub const MAX_NAME: usize = 28;

/// 最后一个直接块指针的下标
pub const D_BLOCK: usize = 6;
/// 间接块指针的下标
pub const IND_BLOCK: usize = D_BLOCK + 1;
/// 块指针表的长度
pub const N_BLOCKS: usize = IND_BLOCK + 1;
/// 一个间接块能容纳的块偏移个数
pub const INDIRECT_COUNT: usize = BLOCK_SIZE / 8;
/// 一个文件最多占用的数据块数（不含间接块本身）
pub const MAX_FILE_BLOCKS: usize = IND_BLOCK + INDIRECT_COUNT;

/// 根目录恒为 0 号 inode
pub const ROOT_INODE: u32 = 0;

/// 当前时间（秒）
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}
