//! # 卷管理层
//!
//! 把多块磁盘组织成一个卷：
//! - 格式化与挂载时的校验；
//! - inode 与数据块的分配、释放，分配在哪些盘上由 RAID 模式决定；
//! - 文件内逻辑块到数据块偏移的映射，以及按块进行的读写。
//!
//! 释放时总会先清零再清位，分配时不再清零。

use core::iter;
use core::ops::Range;

use block_dev::Disk;
use vfs::Error;

use crate::layout::{Bitmap, BlockSlot, DiskInode, Layout, Owner, RaidMode, SuperBlock};
use crate::raid::{self, Placement};
use crate::{BLOCK_SIZE, D_BLOCK, IND_BLOCK, INDIRECT_COUNT, MAX_FILE_BLOCKS, MountError, ROOT_INODE};

const BLOCK: u64 = BLOCK_SIZE as u64;

/// 元数据总是从这块盘读取
pub(crate) const PRIMARY: usize = 0;

/// 已挂载的卷
#[derive(Debug)]
pub struct Wfs {
    /// 按序号排列
    disks: Vec<Disk>,
    mode: RaidMode,
    layout: Layout,
    fs_identifier: u32,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
}

/// 格式化参数
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    pub mode: RaidMode,
    pub inodes: u64,
    pub blocks: u64,
    pub fs_identifier: u32,
    /// 根目录的属主
    pub owner: Owner,
    /// 根目录的时间戳
    pub time: i64,
}

impl FormatOptions {
    /// 以当前时间作为文件系统标识
    pub fn new(mode: RaidMode, inodes: u64, blocks: u64) -> Self {
        let time = crate::now();
        Self {
            mode,
            inodes,
            blocks,
            fs_identifier: time as u32,
            owner: Owner::current(),
            time,
        }
    }
}

/// 一次读写落在某个块内的部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Chunk {
    /// 文件内的块下标
    index: usize,
    /// 块内偏移
    offset: usize,
    len: usize,
}

/// 把`[start, end)`按块边界切开
fn chunks(start: u64, end: u64) -> impl Iterator<Item = Chunk> {
    let mut pos = start;
    iter::from_fn(move || {
        (pos < end).then(|| {
            let offset = (pos % BLOCK) as usize;
            let len = (BLOCK_SIZE - offset).min((end - pos) as usize);
            let chunk = Chunk {
                index: (pos / BLOCK) as usize,
                offset,
                len,
            };
            pos += len as u64;
            chunk
        })
    })
}

impl Wfs {
    /// 在每块盘上写下同一个卷：清零布局覆盖的范围，写入超级块，
    /// 分配 0 号 inode 作为根目录。
    ///
    /// 所有盘都通过检查后才开始写。
    pub fn format(disks: &mut [Disk], options: &FormatOptions) -> Result<Layout, MountError> {
        if disks.len() < 2 {
            return Err(MountError::TooFewDisks(disks.len()));
        }
        if options.inodes == 0 || options.blocks == 0 {
            return Err(MountError::EmptyGeometry);
        }

        let layout = Layout::new(options.inodes, options.blocks);
        let needed = layout.total_size();
        for disk in disks.iter() {
            if (disk.len() as u64) < needed {
                return Err(MountError::TooSmall {
                    path: disk.path().to_path_buf(),
                    actual: disk.len() as u64,
                    needed,
                });
            }
        }

        log::info!(
            "formatting {} disks as RAID {}: {} inodes, {} data blocks, {needed} bytes each",
            disks.len(),
            options.mode,
            layout.num_inodes,
            layout.num_data_blocks,
        );

        let root = DiskInode::new(
            ROOT_INODE,
            libc::S_IFDIR | 0o755,
            options.owner,
            options.time,
        );
        for (order, disk) in disks.iter_mut().enumerate() {
            disk.fill(0, needed as usize, 0)?;
            *disk.get_mut::<SuperBlock>(0)? =
                SuperBlock::new(&layout, options.fs_identifier, options.mode, order as u64);

            // 位图刚被清零，分到的必是 0 号
            layout.inode_bitmap().alloc(disk)?;
            *disk.get_mut::<DiskInode>(layout.inode_offset(ROOT_INODE))? = root;
            disk.flush()?;
        }

        Ok(layout)
    }

    /// 校验各盘属于同一个卷并按序号排好。
    ///
    /// 失败时所有磁盘随`disks`一起释放。
    pub fn mount(disks: Vec<Disk>) -> Result<Self, MountError> {
        if disks.len() < 2 {
            return Err(MountError::TooFewDisks(disks.len()));
        }

        let first: SuperBlock = *disks[0].get(0)?;
        let mode = first.raid_mode().map_err(MountError::UnknownRaidMode)?;
        if !first.is_consistent() {
            return Err(MountError::BadLayout {
                path: disks[0].path().to_path_buf(),
            });
        }
        let layout = first.layout();
        let needed = layout.total_size();

        let count = disks.len();
        let mut slots: Vec<Option<Disk>> = iter::repeat_with(|| None).take(count).collect();
        for disk in disks {
            let super_block: SuperBlock = *disk.get(0)?;
            if !super_block.same_volume(&first) {
                return Err(MountError::Mismatch {
                    path: disk.path().to_path_buf(),
                });
            }
            if (disk.len() as u64) < needed {
                return Err(MountError::TooSmall {
                    path: disk.path().to_path_buf(),
                    actual: disk.len() as u64,
                    needed,
                });
            }

            let order = super_block.device_order;
            match usize::try_from(order).ok().filter(|&slot| slot < count) {
                Some(slot) if slots[slot].is_none() => slots[slot] = Some(disk),
                _ => {
                    return Err(MountError::BadOrder {
                        path: disk.path().to_path_buf(),
                        order,
                    });
                }
            }
        }
        // 序号两两不同且都小于盘数，因此每个槽位都有盘
        let disks: Vec<Disk> = slots.into_iter().flatten().collect();

        let inode_bitmap = layout.inode_bitmap();
        for disk in &disks {
            let is_dir = disk.map(layout.inode_offset(ROOT_INODE), DiskInode::is_dir)?;
            if !inode_bitmap.contains(disk, ROOT_INODE)? || !is_dir {
                return Err(MountError::BadRoot {
                    path: disk.path().to_path_buf(),
                });
            }
        }

        log::info!(
            "mounted {} disks as RAID {}: fs id {:#x}, {} inodes, {} data blocks",
            disks.len(),
            mode,
            first.fs_identifier,
            layout.num_inodes,
            layout.num_data_blocks,
        );

        Ok(Self {
            disks,
            mode,
            layout,
            fs_identifier: first.fs_identifier,
            inode_bitmap,
            data_bitmap: layout.data_bitmap(),
        })
    }

    #[inline]
    pub fn mode(&self) -> RaidMode {
        self.mode
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[inline]
    pub fn fs_identifier(&self) -> u32 {
        self.fs_identifier
    }

    /// 按序号排列的各盘
    #[inline]
    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    /// 直接改写镜像，只应用于故障注入
    #[inline]
    pub fn disks_mut(&mut self) -> &mut [Disk] {
        &mut self.disks
    }

    pub fn flush(&self) -> block_dev::Result<()> {
        self.disks.iter().try_for_each(Disk::flush)
    }

    #[inline]
    pub(crate) fn inode_bitmap(&self) -> &Bitmap {
        &self.inode_bitmap
    }

    #[inline]
    pub(crate) fn data_bitmap(&self) -> &Bitmap {
        &self.data_bitmap
    }
}

/* inode */
impl Wfs {
    /// 某块盘上的 inode，位图中未分配则不存在
    pub fn inode_on(&self, disk: usize, num: u32) -> vfs::Result<DiskInode> {
        let disk = self.disks.get(disk).ok_or(Error::InvalidArgument)?;
        if u64::from(num) >= self.layout.num_inodes || !self.inode_bitmap.contains(disk, num)? {
            return Err(Error::NotFound);
        }

        Ok(*disk.get(self.layout.inode_offset(num))?)
    }

    #[inline]
    pub fn inode(&self, num: u32) -> vfs::Result<DiskInode> {
        self.inode_on(PRIMARY, num)
    }

    /// inode 在每块盘上各一份
    pub(crate) fn store_inode(&mut self, inode: &DiskInode) -> vfs::Result<()> {
        let offset = self.layout.inode_offset(inode.num);
        for disk in &mut self.disks {
            disk.map_mut(offset, |slot: &mut DiskInode| *slot = *inode)?;
        }
        Ok(())
    }

    pub(crate) fn alloc_inode(&mut self, mode: u32, owner: Owner) -> vfs::Result<DiskInode> {
        let Some(num) = self.inode_bitmap.alloc_all(&mut self.disks)? else {
            log::warn!("no free inode left");
            return Err(Error::NoSpace);
        };

        let inode = DiskInode::new(num, mode, owner, crate::now());
        self.store_inode(&inode)?;
        Ok(inode)
    }

    pub(crate) fn release_inode(&mut self, num: u32) -> vfs::Result<()> {
        let offset = self.layout.inode_offset(num);
        for disk in &mut self.disks {
            disk.fill(offset, BLOCK_SIZE, 0)?;
            self.inode_bitmap.dealloc(disk, num)?;
        }
        Ok(())
    }
}

/* 数据块 */
impl Wfs {
    /// 放置方式对应的盘
    #[inline]
    fn targets(&self, placement: Placement) -> Range<usize> {
        match placement {
            Placement::All => 0..self.disks.len(),
            Placement::Disk(disk) => disk..disk + 1,
        }
    }

    /// 某个 inode 的第`index`个数据块的放置方式
    #[inline]
    pub(crate) fn placement(&self, inode: &DiskInode, index: usize) -> Placement {
        self.mode.placement(inode.kind(), index, self.disks.len())
    }

    /// 块偏移必须落在数据区且按块对齐，否则元数据已损坏
    pub(crate) fn check_block(&self, offset: u64) -> vfs::Result<u32> {
        self.layout.block_index(offset).ok_or_else(|| {
            log::error!("corrupt block pointer {offset:#x}");
            Error::Io
        })
    }

    fn alloc_block(&mut self, placement: Placement) -> vfs::Result<u64> {
        let index = match placement {
            Placement::All => self.data_bitmap.alloc_all(&mut self.disks)?,
            Placement::Disk(disk) => self.data_bitmap.alloc(&mut self.disks[disk])?,
        };
        let Some(index) = index else {
            log::warn!("no free data block left for {placement:?}");
            return Err(Error::NoSpace);
        };

        Ok(self.layout.block_offset(index))
    }

    fn release_block(&mut self, offset: u64, placement: Placement) -> vfs::Result<()> {
        let index = self.check_block(offset)?;
        for disk in self.targets(placement) {
            let disk = &mut self.disks[disk];
            disk.fill(offset, BLOCK_SIZE, 0)?;
            self.data_bitmap.dealloc(disk, index)?;
        }
        Ok(())
    }

    fn indirect_entries(&self, indirect: u64) -> vfs::Result<&[u64]> {
        self.check_block(indirect)?;
        Ok(self.disks[PRIMARY].slice(indirect, INDIRECT_COUNT)?)
    }

    /// 间接块在每块盘上各一份，逐盘改写其中一项
    fn set_indirect_entry(&mut self, indirect: u64, slot: usize, block: u64) -> vfs::Result<()> {
        for disk in &mut self.disks {
            disk.slice_mut::<u64>(indirect, INDIRECT_COUNT)?[slot] = block;
        }
        Ok(())
    }

    /// 文件内第`index`个数据块的偏移，未分配时为 0
    pub(crate) fn block_of(&self, inode: &DiskInode, index: usize) -> vfs::Result<u64> {
        match BlockSlot::of(index) {
            Some(BlockSlot::Direct(slot)) => Ok(inode.blocks[slot]),
            Some(BlockSlot::Indirect(slot)) => match inode.blocks[IND_BLOCK] {
                0 => Ok(0),
                indirect => Ok(self.indirect_entries(indirect)?[slot]),
            },
            None => Ok(0),
        }
    }

    /// 同`block_of`，但未分配时就地分配。
    ///
    /// 块指针表的变化只写进`inode`，由调用方落盘；
    /// 间接块中的项则立即写到每块盘上。
    pub(crate) fn ensure_block(&mut self, inode: &mut DiskInode, index: usize) -> vfs::Result<u64> {
        let placement = self.placement(inode, index);
        match BlockSlot::of(index) {
            Some(BlockSlot::Direct(slot)) => {
                if inode.blocks[slot] == 0 {
                    inode.blocks[slot] = self.alloc_block(placement)?;
                }
                Ok(inode.blocks[slot])
            }
            // 目录只用直接块
            Some(BlockSlot::Indirect(_)) if inode.is_dir() => Err(Error::NoSpace),
            Some(BlockSlot::Indirect(slot)) => {
                if inode.blocks[IND_BLOCK] == 0 {
                    inode.blocks[IND_BLOCK] = self.alloc_block(self.mode.indirect_placement())?;
                }
                let indirect = inode.blocks[IND_BLOCK];

                let block = self.indirect_entries(indirect)?[slot];
                if block != 0 {
                    return Ok(block);
                }

                let block = self.alloc_block(placement)?;
                self.set_indirect_entry(indirect, slot, block)?;
                Ok(block)
            }
            None => Err(Error::NoSpace),
        }
    }

    /// 释放下标不小于`from`的所有数据块：先间接块中的项，再间接块本身，最后直接块
    pub(crate) fn release_blocks_from(&mut self, inode: &mut DiskInode, from: usize) -> vfs::Result<()> {
        let indirect = inode.blocks[IND_BLOCK];
        if indirect != 0 {
            let entries = self.indirect_entries(indirect)?.to_vec();
            for (slot, &block) in entries.iter().enumerate().skip(from.saturating_sub(IND_BLOCK)) {
                if block == 0 {
                    continue;
                }
                self.release_block(block, self.placement(inode, IND_BLOCK + slot))?;
                self.set_indirect_entry(indirect, slot, 0)?;
            }

            if from <= IND_BLOCK {
                self.release_block(indirect, self.mode.indirect_placement())?;
                inode.blocks[IND_BLOCK] = 0;
            }
        }

        for slot in from..=D_BLOCK {
            let block = inode.blocks[slot];
            if block != 0 {
                self.release_block(block, self.placement(inode, slot))?;
                inode.blocks[slot] = 0;
            }
        }

        Ok(())
    }

    /// RAID1V 下由各盘副本的校验和表决出读取来源
    fn elect_source(&self, offset: u64, len: usize) -> vfs::Result<usize> {
        let sums = self
            .disks
            .iter()
            .map(|disk| disk.slice::<u8>(offset, len).map(raid::checksum))
            .collect::<block_dev::Result<Vec<_>>>()?;
        let winner = raid::elect(&sums);

        for (disk, &sum) in sums.iter().enumerate() {
            if sum != sums[winner] {
                log::warn!(
                    "{}: {len} bytes at {offset:#x} outvoted by {}",
                    self.disks[disk].path().display(),
                    self.disks[winner].path().display(),
                );
            }
        }

        Ok(winner)
    }

    /// 从`offset`起读到`buf`满或文件末尾，返回读到的字节数。空洞读出 0。
    pub(crate) fn read_data(&self, inode: &DiskInode, offset: u64, buf: &mut [u8]) -> vfs::Result<usize> {
        if offset >= inode.size {
            return Ok(0);
        }
        let end = inode.size.min(offset.saturating_add(buf.len() as u64));

        let mut done = 0;
        for chunk in chunks(offset, end) {
            let dst = &mut buf[done..done + chunk.len];
            done += chunk.len;

            let block = self.block_of(inode, chunk.index)?;
            if block == 0 {
                dst.fill(0);
                continue;
            }
            self.check_block(block)?;

            let at = block + chunk.offset as u64;
            let source = match self.placement(inode, chunk.index) {
                Placement::Disk(disk) => disk,
                Placement::All if self.mode.votes() => self.elect_source(at, chunk.len)?,
                Placement::All => PRIMARY,
            };
            dst.copy_from_slice(self.disks[source].slice::<u8>(at, chunk.len)?);
        }

        Ok(done)
    }

    /// 从`offset`起写入`data`，按需分配数据块并更新大小，`inode`随之落盘。
    ///
    /// 中途空间耗尽时，已写入的部分保留并返回其长度；一个字节都没写成才报错。
    pub(crate) fn write_data(&mut self, inode: &mut DiskInode, offset: u64, data: &[u8]) -> vfs::Result<usize> {
        let end = offset.saturating_add(data.len() as u64);

        let mut done = 0;
        let mut failure = None;
        for chunk in chunks(offset, end) {
            let block = match self.ensure_block(inode, chunk.index) {
                Ok(block) => block,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            self.check_block(block)?;

            let at = block + chunk.offset as u64;
            let src = &data[done..done + chunk.len];
            for disk in self.targets(self.placement(inode, chunk.index)) {
                self.disks[disk].slice_mut::<u8>(at, chunk.len)?.copy_from_slice(src);
            }
            done += chunk.len;
        }

        if done > 0 {
            inode.size = inode.size.max(offset + done as u64);
            inode.touch(crate::now());
        }
        // 即便一个字节都没写成，也可能新分配了间接块
        self.store_inode(inode)?;

        match failure {
            Some(e) if done == 0 => Err(e),
            Some(e) => {
                log::warn!("short write to inode {}: {done} of {} bytes ({e})", inode.num, data.len());
                Ok(done)
            }
            None => Ok(done),
        }
    }

    /// 改变文件大小。缩小时释放新末尾之后的块并清零最后一块的尾部；
    /// 扩大时只记录大小，中间成为空洞。
    pub(crate) fn resize(&mut self, inode: &mut DiskInode, size: u64) -> vfs::Result<()> {
        if size > (MAX_FILE_BLOCKS * BLOCK_SIZE) as u64 {
            return Err(Error::NoSpace);
        }

        if size < inode.size {
            self.release_blocks_from(inode, DiskInode::count_data_block(size))?;

            let tail = (size % BLOCK) as usize;
            if tail != 0 {
                let index = (size / BLOCK) as usize;
                let block = self.block_of(inode, index)?;
                if block != 0 {
                    self.check_block(block)?;
                    for disk in self.targets(self.placement(inode, index)) {
                        self.disks[disk].fill(block + tail as u64, BLOCK_SIZE - tail, 0)?;
                    }
                }
            }
        }

        inode.size = size;
        inode.touch(crate::now());
        self.store_inode(inode)
    }
}
