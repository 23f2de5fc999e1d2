//! # 目录层
//!
//! 目录的内容是紧密排列的 [`DirEntry`]，只占用直接块，
//! 大小总是块大小的整数倍。目录块在每块盘上各一份。

use vfs::Error;

use crate::fs::PRIMARY;
use crate::layout::{DirEntry, DiskInode};
use crate::{BLOCK_SIZE, Wfs};

/// 每块能放下的目录项个数
const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DirEntry::SIZE;

/// 目录中的一个槽位
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    /// 所在数据块的偏移
    block: u64,
    /// 块内下标
    index: usize,
    pub entry: DirEntry,
}

impl Wfs {
    /// 按磁盘上的顺序列出目录的所有槽位，空槽也在内
    pub(crate) fn dir_slots(&self, dir: &DiskInode) -> vfs::Result<Vec<Slot>> {
        let mut slots = Vec::new();
        for index in 0..DiskInode::count_data_block(dir.size) {
            let block = self.block_of(dir, index)?;
            if block == 0 {
                continue;
            }
            self.check_block(block)?;

            let entries = self.disks()[PRIMARY].slice::<DirEntry>(block, ENTRIES_PER_BLOCK)?;
            slots.extend(entries.iter().enumerate().map(|(index, &entry)| Slot {
                block,
                index,
                entry,
            }));
        }

        Ok(slots)
    }

    /// 在用的目录项
    pub(crate) fn dir_entries(&self, dir: &DiskInode) -> vfs::Result<Vec<DirEntry>> {
        Ok(self
            .dir_slots(dir)?
            .into_iter()
            .map(|slot| slot.entry)
            .filter(|entry| !entry.is_free())
            .collect())
    }

    pub(crate) fn lookup_entry(&self, dir: &DiskInode, name: &str) -> vfs::Result<Option<u32>> {
        Ok(self
            .dir_slots(dir)?
            .into_iter()
            .find(|slot| slot.entry.matches(name))
            .map(|slot| slot.entry.num()))
    }

    pub(crate) fn is_empty_dir(&self, dir: &DiskInode) -> vfs::Result<bool> {
        Ok(self.dir_slots(dir)?.iter().all(|slot| slot.entry.is_free()))
    }

    fn write_slot(&mut self, block: u64, index: usize, entry: DirEntry) -> vfs::Result<()> {
        for disk in self.disks_mut() {
            disk.slice_mut::<DirEntry>(block, ENTRIES_PER_BLOCK)?[index] = entry;
        }
        Ok(())
    }

    /// 优先复用空槽；没有空槽时为目录新添一块，目录随之增大一个块。
    /// `dir`随之落盘。
    pub(crate) fn insert_entry(&mut self, dir: &mut DiskInode, name: &str, num: u32) -> vfs::Result<()> {
        let free = self.dir_slots(dir)?.into_iter().find(|slot| slot.entry.is_free());
        let (block, index) = match free {
            Some(slot) => (slot.block, slot.index),
            None => {
                let block = self
                    .ensure_block(dir, DiskInode::count_data_block(dir.size))
                    .inspect_err(|_| log::warn!("directory {} cannot grow any more", dir.num))?;
                dir.size += BLOCK_SIZE as u64;
                (block, 0)
            }
        };

        self.write_slot(block, index, DirEntry::new(name, num))?;
        dir.nlinks += 1;
        dir.touch(crate::now());
        self.store_inode(dir)
    }

    /// 清空名为`name`的槽位，槽位留待复用。`dir`随之落盘。
    pub(crate) fn remove_entry(&mut self, dir: &mut DiskInode, name: &str) -> vfs::Result<()> {
        let slot = self
            .dir_slots(dir)?
            .into_iter()
            .find(|slot| slot.entry.matches(name))
            .ok_or(Error::NotFound)?;

        self.write_slot(slot.block, slot.index, DirEntry::default())?;
        dir.nlinks = dir.nlinks.saturating_sub(1);
        dir.touch(crate::now());
        self.store_inode(dir)
    }
}
