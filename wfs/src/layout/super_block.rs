use core::fmt;
use core::str::FromStr;

use block_dev::Plain;

use super::Layout;

/// 超级块，位于每块磁盘的 0 偏移处：
/// - 记录几何参数，定位其它区域；
/// - 以文件系统标识与 RAID 模式把多块磁盘绑成一个卷；
/// - 记录本盘在阵列中的序号。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SuperBlock {
    pub num_inodes: u64,
    pub num_data_blocks: u64,
    pub i_bitmap_ptr: u64,
    pub d_bitmap_ptr: u64,
    pub i_blocks_ptr: u64,
    pub d_blocks_ptr: u64,
    /// 格式化时选定，同一卷的各盘一致
    pub fs_identifier: u32,
    raid_mode: u32,
    /// 本盘在阵列中的序号
    pub device_order: u64,
}

unsafe impl Plain for SuperBlock {}

impl SuperBlock {
    pub fn new(layout: &Layout, fs_identifier: u32, mode: RaidMode, device_order: u64) -> Self {
        Self {
            num_inodes: layout.num_inodes,
            num_data_blocks: layout.num_data_blocks,
            i_bitmap_ptr: layout.i_bitmap_ptr,
            d_bitmap_ptr: layout.d_bitmap_ptr,
            i_blocks_ptr: layout.i_blocks_ptr,
            d_blocks_ptr: layout.d_blocks_ptr,
            fs_identifier,
            raid_mode: mode as u32,
            device_order,
        }
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        Layout {
            num_inodes: self.num_inodes,
            num_data_blocks: self.num_data_blocks,
            i_bitmap_ptr: self.i_bitmap_ptr,
            d_bitmap_ptr: self.d_bitmap_ptr,
            i_blocks_ptr: self.i_blocks_ptr,
            d_blocks_ptr: self.d_blocks_ptr,
        }
    }

    /// 未知的模式值原样返回
    #[inline]
    pub fn raid_mode(&self) -> Result<RaidMode, u32> {
        RaidMode::try_from(self.raid_mode)
    }

    /// 同一卷的各盘只在序号上不同
    pub fn same_volume(&self, other: &Self) -> bool {
        self.fs_identifier == other.fs_identifier
            && self.raid_mode == other.raid_mode
            && self.layout() == other.layout()
    }

    /// 几何参数是否正是由两个数量算出来的那一套
    pub fn is_consistent(&self) -> bool {
        self.num_inodes > 0
            && self.num_data_blocks > 0
            && Layout::new(self.num_inodes, self.num_data_blocks) == self.layout()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RaidMode {
    /// 条带化：文件数据轮流分布到各盘，元数据每盘一份
    Raid0 = 0,
    /// 镜像：每块盘内容完全相同
    Raid1 = 1,
    /// 镜像，读取时按校验和多数表决
    Raid1v = 2,
}

impl TryFrom<u32> for RaidMode {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Raid0),
            1 => Ok(Self::Raid1),
            2 => Ok(Self::Raid1v),
            raw => Err(raw),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown RAID mode `{0}`, expected 0, 1 or 1v")]
pub struct ParseRaidModeError(String);

impl FromStr for RaidMode {
    type Err = ParseRaidModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Self::Raid0),
            "1" => Ok(Self::Raid1),
            "1v" | "2" => Ok(Self::Raid1v),
            s => Err(ParseRaidModeError(s.to_owned())),
        }
    }
}

impl fmt::Display for RaidMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raid0 => "0",
            Self::Raid1 => "1",
            Self::Raid1v => "1v",
        })
    }
}
