//! # 文件系统操作层
//!
//! 面向调用方的各项操作。每项操作都有两种入口：
//! - 以绝对路径寻址，从根目录逐级解析；
//! - 以 inode 编号寻址（`*_at`），供已知编号的内核桥接使用。
//!
//! 一次操作要么完整生效，要么不改变任何状态；唯一的例外是写入时空间耗尽，
//! 已写入的部分会保留。

use vfs::{DirEntryType, Error, Stat, StatFs};

use crate::layout::{DirEntry, DiskInode, Owner, RaidMode};
use crate::{MAX_NAME, ROOT_INODE, Wfs};

/// 把路径拆成父目录与最后一级名字，`/`本身没有父目录
fn split_parent(path: &str) -> vfs::Result<(&str, &str)> {
    let path = path.trim_end_matches('/');
    let (parent, name) = path.rsplit_once('/').ok_or(Error::InvalidArgument)?;
    if name.is_empty() {
        return Err(Error::InvalidArgument);
    }

    Ok((if parent.is_empty() { "/" } else { parent }, name))
}

/* 路径解析与属性 */
impl Wfs {
    fn resolve_inode(&self, path: &str) -> vfs::Result<DiskInode> {
        let rest = path.strip_prefix('/').ok_or(Error::InvalidArgument)?;

        let mut current = self.inode(ROOT_INODE)?;
        for name in rest.split('/').filter(|name| !name.is_empty()) {
            if !current.is_dir() {
                return Err(Error::NotADirectory);
            }
            let num = self.lookup_entry(&current, name)?.ok_or(Error::NotFound)?;
            current = self.inode(num)?;
        }

        Ok(current)
    }

    fn dir_inode(&self, num: u32) -> vfs::Result<DiskInode> {
        let dir = self.inode(num)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(dir)
    }

    /// 绝对路径对应的 inode 编号
    pub fn resolve(&self, path: &str) -> vfs::Result<u32> {
        self.resolve_inode(path).map(|inode| inode.num)
    }

    pub fn getattr(&self, path: &str) -> vfs::Result<Stat> {
        self.resolve_inode(path).map(|inode| inode.stat())
    }

    #[inline]
    pub fn stat(&self, num: u32) -> vfs::Result<Stat> {
        self.inode(num).map(|inode| inode.stat())
    }

    /// 在目录`parent`中查找`name`
    pub fn lookup(&self, parent: u32, name: &str) -> vfs::Result<Stat> {
        if name.len() > MAX_NAME {
            return Err(Error::NameTooLong);
        }

        let dir = self.dir_inode(parent)?;
        let num = self.lookup_entry(&dir, name)?.ok_or(Error::NotFound)?;
        self.stat(num)
    }

    /// 卷的容量。条带化下各盘的数据块各自独立，容量相加；
    /// 镜像下每块盘都是完整的副本，按剩余最少的盘计。
    pub fn statfs(&self) -> vfs::Result<StatFs> {
        let layout = self.layout();
        let disks = self.disks();

        let mut free_blocks = Vec::with_capacity(disks.len());
        for disk in disks {
            let used = self.data_bitmap().count_used(disk)? as u64;
            free_blocks.push(layout.num_data_blocks - used.min(layout.num_data_blocks));
        }
        let (blocks, free_blocks) = match self.mode() {
            RaidMode::Raid0 => (
                layout.num_data_blocks * disks.len() as u64,
                free_blocks.iter().sum::<u64>(),
            ),
            RaidMode::Raid1 | RaidMode::Raid1v => (
                layout.num_data_blocks,
                free_blocks.iter().copied().min().unwrap_or(0),
            ),
        };

        let used_inodes = self.inode_bitmap().count_used(&disks[crate::fs::PRIMARY])? as u64;
        Ok(StatFs {
            block_size: crate::BLOCK_SIZE as u32,
            blocks,
            free_blocks,
            inodes: layout.num_inodes,
            free_inodes: layout.num_inodes - used_inodes.min(layout.num_inodes),
            name_max: MAX_NAME as u32,
        })
    }
}

/* 创建与删除 */
impl Wfs {
    /// 在目录`parent`中新建`name`，`mode`含类型位。
    /// 写入目录项失败时新分配的 inode 会被收回。
    pub fn create_at(&mut self, parent: u32, name: &str, mode: u32, owner: Owner) -> vfs::Result<Stat> {
        DirEntry::check_name(name)?;
        let mut dir = self.dir_inode(parent)?;
        if self.lookup_entry(&dir, name)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let inode = self.alloc_inode(mode, owner)?;
        if let Err(e) = self.insert_entry(&mut dir, name, inode.num) {
            self.release_inode(inode.num)?;
            return Err(e);
        }

        log::debug!("created {name:?} as inode {} in directory {parent}", inode.num);
        Ok(inode.stat())
    }

    /// 新建普通文件，`mode`中只取权限位
    pub fn mknod(&mut self, path: &str, mode: u32, owner: Owner) -> vfs::Result<Stat> {
        let (parent, name) = split_parent(path)?;
        let parent = self.resolve(parent)?;
        self.create_at(parent, name, DirEntryType::Regular.mode_bits() | (mode & 0o7777), owner)
    }

    pub fn mkdir(&mut self, path: &str, mode: u32, owner: Owner) -> vfs::Result<Stat> {
        let (parent, name) = split_parent(path)?;
        let parent = self.resolve(parent)?;
        self.create_at(parent, name, DirEntryType::Directory.mode_bits() | (mode & 0o7777), owner)
    }

    /// 依次释放数据块、目录项与 inode
    fn remove_at(&mut self, parent: u32, name: &str, kind: DirEntryType) -> vfs::Result<()> {
        let mut dir = self.dir_inode(parent)?;
        let num = self.lookup_entry(&dir, name)?.ok_or(Error::NotFound)?;
        let mut inode = self.inode(num)?;

        match (kind, inode.kind()) {
            (DirEntryType::Regular, DirEntryType::Directory) => return Err(Error::IsADirectory),
            (DirEntryType::Directory, DirEntryType::Regular) => return Err(Error::NotADirectory),
            (DirEntryType::Directory, DirEntryType::Directory) if !self.is_empty_dir(&inode)? => {
                return Err(Error::DirectoryNotEmpty);
            }
            _ => {}
        }

        self.release_blocks_from(&mut inode, 0)?;
        self.remove_entry(&mut dir, name)?;
        self.release_inode(num)?;

        log::debug!("removed {name:?} (inode {num}) from directory {parent}");
        Ok(())
    }

    #[inline]
    pub fn unlink_at(&mut self, parent: u32, name: &str) -> vfs::Result<()> {
        self.remove_at(parent, name, DirEntryType::Regular)
    }

    /// 只能删除空目录
    #[inline]
    pub fn rmdir_at(&mut self, parent: u32, name: &str) -> vfs::Result<()> {
        self.remove_at(parent, name, DirEntryType::Directory)
    }

    pub fn unlink(&mut self, path: &str) -> vfs::Result<()> {
        let (parent, name) = split_parent(path)?;
        let parent = self.resolve(parent)?;
        self.unlink_at(parent, name)
    }

    pub fn rmdir(&mut self, path: &str) -> vfs::Result<()> {
        let (parent, name) = split_parent(path)?;
        let parent = self.resolve(parent)?;
        self.rmdir_at(parent, name)
    }
}

/* 读写 */
impl Wfs {
    fn file_inode(&self, num: u32) -> vfs::Result<DiskInode> {
        let inode = self.inode(num)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }
        Ok(inode)
    }

    /// 读到的字节数可能少于`buf`的长度，到达文件末尾即止
    pub fn read_at(&self, num: u32, offset: u64, buf: &mut [u8]) -> vfs::Result<usize> {
        let inode = self.file_inode(num)?;
        self.read_data(&inode, offset, buf)
    }

    pub fn write_at(&mut self, num: u32, offset: u64, data: &[u8]) -> vfs::Result<usize> {
        let mut inode = self.file_inode(num)?;
        self.write_data(&mut inode, offset, data)
    }

    pub fn read(&self, path: &str, offset: u64, buf: &mut [u8]) -> vfs::Result<usize> {
        self.read_at(self.resolve(path)?, offset, buf)
    }

    pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> vfs::Result<usize> {
        let num = self.resolve(path)?;
        self.write_at(num, offset, data)
    }

    pub fn truncate_at(&mut self, num: u32, size: u64) -> vfs::Result<()> {
        let mut inode = self.file_inode(num)?;
        self.resize(&mut inode, size)
    }

    pub fn truncate(&mut self, path: &str, size: u64) -> vfs::Result<()> {
        let num = self.resolve(path)?;
        self.truncate_at(num, size)
    }
}

/* 目录与元数据 */
impl Wfs {
    /// 先是`.`与`..`，之后按磁盘上的顺序列出各项
    pub fn readdir_at(&self, num: u32, parent: u32) -> vfs::Result<Vec<vfs::DirEntry>> {
        let dir = self.dir_inode(num)?;

        let mut entries = vec![
            vfs::DirEntry {
                inode: num.into(),
                ty: DirEntryType::Directory,
                name: ".".to_owned(),
            },
            vfs::DirEntry {
                inode: parent.into(),
                ty: DirEntryType::Directory,
                name: "..".to_owned(),
            },
        ];
        for entry in self.dir_entries(&dir)? {
            entries.push(vfs::DirEntry {
                inode: entry.num().into(),
                ty: self.inode(entry.num())?.kind(),
                name: entry.name_string(),
            });
        }

        Ok(entries)
    }

    pub fn readdir(&self, path: &str) -> vfs::Result<Vec<vfs::DirEntry>> {
        let num = self.resolve(path)?;
        let parent = match split_parent(path) {
            Ok((parent, _)) => self.resolve(parent)?,
            // 根目录的上级是它自己
            Err(_) => ROOT_INODE,
        };
        self.readdir_at(num, parent)
    }

    /// 缺省的时间戳保持不变
    pub fn set_times_at(&mut self, num: u32, atime: Option<i64>, mtime: Option<i64>) -> vfs::Result<Stat> {
        let mut inode = self.inode(num)?;
        if let Some(atime) = atime {
            inode.atim = atime;
        }
        if let Some(mtime) = mtime {
            inode.mtim = mtime;
        }
        inode.ctim = crate::now();

        self.store_inode(&inode)?;
        Ok(inode.stat())
    }

    /// 只改权限位，类型位保持不变
    pub fn set_mode_at(&mut self, num: u32, mode: u32) -> vfs::Result<Stat> {
        let mut inode = self.inode(num)?;
        inode.mode = (inode.mode & libc::S_IFMT) | (mode & 0o7777);
        inode.ctim = crate::now();

        self.store_inode(&inode)?;
        Ok(inode.stat())
    }

    pub fn set_times(&mut self, path: &str, atime: Option<i64>, mtime: Option<i64>) -> vfs::Result<Stat> {
        let num = self.resolve(path)?;
        self.set_times_at(num, atime, mtime)
    }

    pub fn set_mode(&mut self, path: &str, mode: u32) -> vfs::Result<Stat> {
        let num = self.resolve(path)?;
        self.set_mode_at(num, mode)
    }
}
