//! # 磁盘数据结构层
//!
//! 每块磁盘的布局：
//!
//! ```text
//!           d_bitmap_ptr       d_blocks_ptr
//!                v                  v
//! +----+---------+---------+--------+--------------------------+
//! | SB | IBITMAP | DBITMAP | INODES |       DATA BLOCKS        |
//! +----+---------+---------+--------+--------------------------+
//! 0    ^                   ^
//!  i_bitmap_ptr        i_blocks_ptr
//! ```
//!
//! 所有偏移都是镜像内的字节偏移，多字节字段按小端存放。

mod super_block;
pub use super_block::{ParseRaidModeError, RaidMode, SuperBlock};

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{BlockSlot, DiskInode, Owner};

/// 目录项，也属于磁盘数据结构
mod dir_entry;
pub use dir_entry::DirEntry;

use core::mem;

use crate::BLOCK_SIZE;

const BLOCK: u64 = BLOCK_SIZE as u64;

/// 由 inode 数与数据块数推出的各区域位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub num_inodes: u64,
    pub num_data_blocks: u64,
    pub i_bitmap_ptr: u64,
    pub d_bitmap_ptr: u64,
    pub i_blocks_ptr: u64,
    pub d_blocks_ptr: u64,
}

impl Layout {
    /// 两个数量都先向上取整到 32 的倍数，位图因此总是整字
    pub fn new(inodes: u64, blocks: u64) -> Self {
        let num_inodes = inodes.next_multiple_of(32);
        let num_data_blocks = blocks.next_multiple_of(32);

        let i_bitmap_ptr = mem::size_of::<SuperBlock>() as u64;
        let d_bitmap_ptr = i_bitmap_ptr + num_inodes / 8;
        // inode 区从块边界开始
        let i_blocks_ptr = (d_bitmap_ptr + num_data_blocks / 8).next_multiple_of(BLOCK);
        let d_blocks_ptr = i_blocks_ptr + num_inodes * BLOCK;

        Self {
            num_inodes,
            num_data_blocks,
            i_bitmap_ptr,
            d_bitmap_ptr,
            i_blocks_ptr,
            d_blocks_ptr,
        }
    }

    /// 布局所需的镜像字节数
    #[inline]
    pub fn total_size(&self) -> u64 {
        self.d_blocks_ptr + self.num_data_blocks * BLOCK
    }

    #[inline]
    pub fn inode_bitmap(&self) -> Bitmap {
        Bitmap::new(self.i_bitmap_ptr, (self.num_inodes / 32) as usize)
    }

    #[inline]
    pub fn data_bitmap(&self) -> Bitmap {
        Bitmap::new(self.d_bitmap_ptr, (self.num_data_blocks / 32) as usize)
    }

    /// 每个 inode 独占一块
    #[inline]
    pub fn inode_offset(&self, num: u32) -> u64 {
        self.i_blocks_ptr + u64::from(num) * BLOCK
    }

    #[inline]
    pub fn block_offset(&self, index: u32) -> u64 {
        self.d_blocks_ptr + u64::from(index) * BLOCK
    }

    /// 数据块偏移在位图中的编号；偏移不在数据区或未按块对齐则返回空
    pub fn block_index(&self, offset: u64) -> Option<u32> {
        let relative = offset.checked_sub(self.d_blocks_ptr)?;
        (relative % BLOCK == 0 && relative / BLOCK < self.num_data_blocks)
            .then(|| (relative / BLOCK) as u32)
    }
}

#[cfg(test)]
mod tests {
    use core::mem;

    use super::*;

    #[test]
    fn disk_structures() {
        assert_eq!(64, mem::size_of::<SuperBlock>());
        assert_eq!(120, mem::size_of::<DiskInode>());
        assert_eq!(32, mem::size_of::<DirEntry>());
    }

    #[test]
    fn small_volume() {
        let layout = Layout::new(32, 32);
        assert_eq!(layout.i_bitmap_ptr, 64);
        assert_eq!(layout.d_bitmap_ptr, 68);
        assert_eq!(layout.i_blocks_ptr, 512);
        assert_eq!(layout.d_blocks_ptr, 512 + 32 * 512);
        assert_eq!(layout.total_size(), 512 + 64 * 512);
    }

    #[test]
    fn counts_round_up() {
        let layout = Layout::new(33, 1);
        assert_eq!(layout.num_inodes, 64);
        assert_eq!(layout.num_data_blocks, 32);
        assert_eq!(layout.d_bitmap_ptr, 64 + 8);
    }

    #[test]
    fn aligned_inode_region_gets_no_pad() {
        // 64 + 224 / 8 + 3872 / 8 = 576，并非块对齐
        assert_eq!(Layout::new(224, 3872).i_blocks_ptr, 1024);
        // 恰好对齐：64 + 128 / 8 + 3456 / 8 = 512
        assert_eq!(Layout::new(128, 3456).i_blocks_ptr, 512);
    }

    #[test]
    fn block_index() {
        let layout = Layout::new(32, 32);
        assert_eq!(layout.block_index(layout.d_blocks_ptr), Some(0));
        assert_eq!(layout.block_index(layout.block_offset(31)), Some(31));
        assert_eq!(layout.block_index(layout.block_offset(32)), None);
        assert_eq!(layout.block_index(layout.d_blocks_ptr + 1), None);
        assert_eq!(layout.block_index(0), None);
    }
}
