//! # 块设备层
//!
//! 每块磁盘都是一个磁盘镜像文件，挂载时整体映射进内存（共享、可读写），
//! 之后一切访问都以**字节偏移**寻址。
//!
//! [`Disk`] 把映射区当成一片 arena：按偏移取出类型化的视图，
//! 偏移、长度与对齐都会先检查，绝不越界。

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::{mem, slice};

use memmap2::MmapMut;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("disk image is empty")]
    Empty,

    #[error("{len} bytes at offset {offset:#x} exceed the image size {size:#x}")]
    OutOfBounds { offset: u64, len: usize, size: usize },

    #[error("offset {offset:#x} is not aligned to {align} bytes")]
    Misaligned { offset: u64, align: usize },
}

/// 能直接由磁盘字节解释出来的类型
///
/// # Safety
///
/// 实现者只能是原生整数，或仅由它们组成的 `#[repr(C)]` 结构体：
/// 任意位模式都是合法值，且不含指针。
pub unsafe trait Plain: Copy + 'static {}

unsafe impl Plain for u8 {}
unsafe impl Plain for u32 {}
unsafe impl Plain for u64 {}
unsafe impl Plain for i64 {}

/// 被映射进内存的磁盘镜像
#[derive(Debug)]
pub struct Disk {
    path: PathBuf,
    map: MmapMut,
    /// 映射存续期间一直持有文件
    _file: File,
}

impl Disk {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            return Err(Error::Empty);
        }

        // SAFETY: 挂载期间磁盘镜像归本进程独占
        let map = unsafe { MmapMut::map_mut(&file)? };
        log::debug!("mapped {} ({} bytes)", path.display(), map.len());

        Ok(Self {
            path,
            map,
            _file: file,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get<T: Plain>(&self, offset: u64) -> Result<&T> {
        let start = self.check::<T>(offset, 1)?;
        // SAFETY: 范围与对齐已检查，`T: Plain` 接受任意位模式
        Ok(unsafe { &*self.map.as_ptr().add(start).cast() })
    }

    pub fn get_mut<T: Plain>(&mut self, offset: u64) -> Result<&mut T> {
        let start = self.check::<T>(offset, 1)?;
        // SAFETY: 同上，且 `&mut self` 保证独占
        Ok(unsafe { &mut *self.map.as_mut_ptr().add(start).cast() })
    }

    #[inline]
    pub fn map<T: Plain, V>(&self, offset: u64, f: impl FnOnce(&T) -> V) -> Result<V> {
        self.get(offset).map(f)
    }

    #[inline]
    pub fn map_mut<T: Plain, V>(&mut self, offset: u64, f: impl FnOnce(&mut T) -> V) -> Result<V> {
        self.get_mut(offset).map(f)
    }

    /// 从`offset`起连续的`count`个`T`
    pub fn slice<T: Plain>(&self, offset: u64, count: usize) -> Result<&[T]> {
        let start = self.check::<T>(offset, count)?;
        // SAFETY: 见 `get`
        Ok(unsafe { slice::from_raw_parts(self.map.as_ptr().add(start).cast(), count) })
    }

    pub fn slice_mut<T: Plain>(&mut self, offset: u64, count: usize) -> Result<&mut [T]> {
        let start = self.check::<T>(offset, count)?;
        // SAFETY: 见 `get_mut`
        Ok(unsafe { slice::from_raw_parts_mut(self.map.as_mut_ptr().add(start).cast(), count) })
    }

    #[inline]
    pub fn fill(&mut self, offset: u64, len: usize, byte: u8) -> Result<()> {
        self.slice_mut::<u8>(offset, len)?.fill(byte);
        Ok(())
    }

    /// 整块镜像的原始字节
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    pub fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }
}

impl Disk {
    /// 检查`[offset, offset + count * size_of::<T>())`落在镜像内且按`T`对齐，
    /// 返回映射区内的起始下标
    fn check<T>(&self, offset: u64, count: usize) -> Result<usize> {
        let size = self.map.len();
        let len = mem::size_of::<T>().saturating_mul(count);
        let out_of_bounds = || Error::OutOfBounds { offset, len, size };

        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
        if end > size {
            return Err(out_of_bounds());
        }

        let align = mem::align_of::<T>();
        if (self.map.as_ptr() as usize + start) % align != 0 {
            return Err(Error::Misaligned { offset, align });
        }

        Ok(start)
    }
}

impl Drop for Disk {
    fn drop(&mut self) {
        if let Err(e) = self.map.flush() {
            log::warn!("failed to flush {}: {e}", self.path.display());
        }
    }
}
