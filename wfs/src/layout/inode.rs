//! 索引节点
//!
//! 块指针表中存的是数据块在镜像内的**字节偏移**，0 表示未分配：
//! - 前 7 项直接指向数据块；
//! - 最后一项指向一个间接块，间接块连续存放 64 个数据块偏移。

use block_dev::Plain;
use vfs::{DirEntryType, Stat};

use crate::{D_BLOCK, IND_BLOCK, MAX_FILE_BLOCKS, N_BLOCKS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DiskInode {
    pub num: u32,
    /// 类型位与权限位
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// 硬链接个数
    pub nlinks: u32,
    _pad: u32,
    pub atim: i64,
    pub mtim: i64,
    pub ctim: i64,
    pub blocks: [u64; N_BLOCKS],
}

unsafe impl Plain for DiskInode {}

/// 创建者
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    /// 当前进程的身份
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
}

impl DiskInode {
    pub fn new(num: u32, mode: u32, owner: Owner, now: i64) -> Self {
        Self {
            num,
            mode,
            uid: owner.uid,
            gid: owner.gid,
            nlinks: 1,
            atim: now,
            mtim: now,
            ctim: now,
            ..Default::default()
        }
    }

    #[inline]
    pub fn kind(&self) -> DirEntryType {
        DirEntryType::from_mode(self.mode)
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == DirEntryType::Directory
    }

    /// 内容被修改
    #[inline]
    pub fn touch(&mut self, now: i64) {
        self.mtim = now;
        self.ctim = now;
    }

    /// 容纳`size`字节所需的数据块数
    #[inline]
    pub fn count_data_block(size: u64) -> usize {
        size.div_ceil(crate::BLOCK_SIZE as u64) as usize
    }

    pub fn stat(&self) -> Stat {
        Stat {
            inode: self.num.into(),
            kind: self.kind(),
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            size: self.size,
            links: self.nlinks,
            atime: self.atim,
            mtime: self.mtim,
            ctime: self.ctim,
        }
    }
}

/// 文件内第几个数据块存放在哪
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSlot {
    /// 块指针表的下标
    Direct(usize),
    /// 间接块内的下标
    Indirect(usize),
}

impl BlockSlot {
    /// 超出单个文件的容量则返回空
    pub fn of(index: usize) -> Option<Self> {
        match index {
            0..=D_BLOCK => Some(Self::Direct(index)),
            _ if index < MAX_FILE_BLOCKS => Some(Self::Indirect(index - IND_BLOCK)),
            _ => None,
        }
    }
}
