//! 把 [`Wfs`] 接到内核的 FUSE 桥接上。
//!
//! FUSE 的根目录编号恒为 1，而卷的根目录是 0 号 inode，两者相差 1。

#[cfg(test)]
mod tests;

mod args;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FUSE_ROOT_ID, FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use vfs::{DirEntryType, Error, Stat};
use wfs::{BLOCK_SIZE, Owner, Wfs};

pub use self::args::{mount_option, split_disks};

const TTL: Duration = Duration::from_secs(1);

#[inline]
fn to_ino(num: u64) -> u64 {
    num + 1
}

/// 超出 inode 编号范围的 ino 不存在
#[inline]
fn to_num(ino: u64) -> vfs::Result<u32> {
    ino.checked_sub(1)
        .and_then(|num| u32::try_from(num).ok())
        .ok_or(Error::NotFound)
}

fn to_name(name: &OsStr) -> vfs::Result<&str> {
    name.to_str().ok_or(Error::InvalidArgument)
}

fn to_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn from_time(time: TimeOrNow) -> i64 {
    match time {
        TimeOrNow::SpecificTime(time) => time
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as i64),
        TimeOrNow::Now => wfs::now(),
    }
}

fn file_type(ty: DirEntryType) -> FileType {
    match ty {
        DirEntryType::Directory => FileType::Directory,
        DirEntryType::Regular => FileType::RegularFile,
    }
}

fn file_attr(stat: &Stat) -> FileAttr {
    FileAttr {
        ino: to_ino(stat.inode),
        size: stat.size,
        blocks: stat.size.div_ceil(BLOCK_SIZE as u64),
        atime: to_time(stat.atime),
        mtime: to_time(stat.mtime),
        ctime: to_time(stat.ctime),
        crtime: to_time(stat.ctime),
        kind: file_type(stat.kind),
        perm: stat.perm(),
        nlink: stat.links,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

#[inline]
fn owner(req: &Request<'_>) -> Owner {
    Owner {
        uid: req.uid(),
        gid: req.gid(),
    }
}

/// 失败的回调统一记一条日志
fn failed(op: &str, e: Error) -> i32 {
    log::debug!("{op}: {e}");
    e.errno()
}

pub struct WfsFuse {
    fs: Wfs,
    /// 目录的上级，只用于列出`..`
    parents: HashMap<u64, u64>,
}

impl WfsFuse {
    pub fn new(fs: Wfs) -> Self {
        Self {
            fs,
            parents: HashMap::from([(FUSE_ROOT_ID, FUSE_ROOT_ID)]),
        }
    }

    fn remember(&mut self, parent: u64, stat: &Stat) {
        if stat.kind == DirEntryType::Directory {
            self.parents.insert(to_ino(stat.inode), parent);
        }
    }

    fn do_lookup(&mut self, parent: u64, name: &OsStr) -> vfs::Result<Stat> {
        let stat = self.fs.lookup(to_num(parent)?, to_name(name)?)?;
        self.remember(parent, &stat);
        Ok(stat)
    }

    fn do_create(&mut self, parent: u64, name: &OsStr, mode: u32, owner: Owner) -> vfs::Result<Stat> {
        let stat = self
            .fs
            .create_at(to_num(parent)?, to_name(name)?, mode, owner)?;
        self.remember(parent, &stat);
        Ok(stat)
    }

    /// 删除后 inode 编号可能被复用，不能留下旧的上级
    fn do_remove(&mut self, parent: u64, name: &OsStr, kind: DirEntryType) -> vfs::Result<()> {
        let parent = to_num(parent)?;
        let name = to_name(name)?;
        let ino = to_ino(self.fs.lookup(parent, name)?.inode);

        match kind {
            DirEntryType::Directory => self.fs.rmdir_at(parent, name)?,
            DirEntryType::Regular => self.fs.unlink_at(parent, name)?,
        }
        self.parents.remove(&ino);
        Ok(())
    }

    fn do_setattr(
        &mut self,
        ino: u64,
        mode: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> vfs::Result<Stat> {
        let num = to_num(ino)?;
        if let Some(size) = size {
            self.fs.truncate_at(num, size)?;
        }
        if let Some(mode) = mode {
            self.fs.set_mode_at(num, mode)?;
        }
        if atime.is_some() || mtime.is_some() {
            self.fs
                .set_times_at(num, atime.map(from_time), mtime.map(from_time))?;
        }
        self.fs.stat(num)
    }

    fn do_readdir(&self, ino: u64) -> vfs::Result<Vec<vfs::DirEntry>> {
        let parent = self.parents.get(&ino).copied().unwrap_or(FUSE_ROOT_ID);
        self.fs.readdir_at(to_num(ino)?, to_num(parent)?)
    }
}

impl Filesystem for WfsFuse {
    fn destroy(&mut self) {
        match self.fs.flush() {
            Ok(()) => log::info!("volume flushed"),
            Err(e) => log::error!("failed to flush the volume: {e}"),
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.do_lookup(parent, name) {
            Ok(stat) => reply.entry(&TTL, &file_attr(&stat), 0),
            // 查找不存在的名字很常见，不记日志
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match to_num(ino).and_then(|num| self.fs.stat(num)) {
            Ok(stat) => reply.attr(&TTL, &file_attr(&stat)),
            Err(e) => reply.error(failed("getattr", e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.do_setattr(ino, mode, size, atime, mtime) {
            Ok(stat) => reply.attr(&TTL, &file_attr(&stat)),
            Err(e) => reply.error(failed("setattr", e)),
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        // 只支持普通文件
        let kind = mode & libc::S_IFMT;
        if kind != 0 && kind != libc::S_IFREG {
            reply.error(libc::EINVAL);
            return;
        }

        let mode = DirEntryType::Regular.mode_bits() | (mode & !umask & 0o7777);
        match self.do_create(parent, name, mode, owner(req)) {
            Ok(stat) => reply.entry(&TTL, &file_attr(&stat), 0),
            Err(e) => reply.error(failed("mknod", e)),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let mode = DirEntryType::Directory.mode_bits() | (mode & !umask & 0o7777);
        match self.do_create(parent, name, mode, owner(req)) {
            Ok(stat) => reply.entry(&TTL, &file_attr(&stat), 0),
            Err(e) => reply.error(failed("mkdir", e)),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let mode = DirEntryType::Regular.mode_bits() | (mode & !umask & 0o7777);
        match self.do_create(parent, name, mode, owner(req)) {
            Ok(stat) => reply.created(&TTL, &file_attr(&stat), 0, 0, 0),
            Err(e) => reply.error(failed("create", e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.do_remove(parent, name, DirEntryType::Regular) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(failed("unlink", e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.do_remove(parent, name, DirEntryType::Directory) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(failed("rmdir", e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        let mut buf = vec![0; size as usize];
        match to_num(ino).and_then(|num| self.fs.read_at(num, offset, &mut buf)) {
            Ok(len) => reply.data(&buf[..len]),
            Err(e) => reply.error(failed("read", e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        match to_num(ino).and_then(|num| self.fs.write_at(num, offset, data)) {
            Ok(len) => reply.written(len as u32),
            Err(e) => reply.error(failed("write", e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.do_readdir(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(failed("readdir", e));
                return;
            }
        };

        // 偏移即下一项的序号
        for (index, entry) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            let next = index as i64 + 1;
            if reply.add(to_ino(entry.inode), next, file_type(entry.ty), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match self.fs.statfs() {
            Ok(stat) => reply.statfs(
                stat.blocks,
                stat.free_blocks,
                stat.free_blocks,
                stat.inodes,
                stat.free_inodes,
                stat.block_size,
                stat.name_max,
                stat.block_size,
            ),
            Err(e) => reply.error(failed("statfs", e)),
        }
    }
}
