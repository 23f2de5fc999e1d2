use block_dev::Plain;

use crate::MAX_NAME;

/// 目录中的一项，名字不足 28 字节时以 `\0` 补齐
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DirEntry {
    name: [u8; MAX_NAME],
    /// 0 号 inode 是根目录，不会出现在目录项中，因此 0 表示空槽
    num: u32,
}

unsafe impl Plain for DirEntry {}

impl DirEntry {
    /// 目录项大小恒为32字节
    pub const SIZE: usize = 32;

    /// `name`须先经过 [`DirEntry::check_name`]
    pub fn new(name: &str, num: u32) -> Self {
        let bytes = name.as_bytes();
        let mut buf = [0; MAX_NAME];
        buf[..bytes.len()].copy_from_slice(bytes);

        Self { name: buf, num }
    }

    /// 去掉补齐的 `\0`
    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_NAME);
        &self.name[..len]
    }

    #[inline]
    pub fn name_string(&self) -> String {
        String::from_utf8_lossy(self.name()).into_owned()
    }

    #[inline]
    pub fn num(&self) -> u32 {
        self.num
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.num == 0
    }

    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        !self.is_free() && self.name() == name.as_bytes()
    }

    /// 名字不能为空，不能含 `/` 与 `\0`，且不超过 28 字节
    pub fn check_name(name: &str) -> vfs::Result<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(vfs::Error::InvalidArgument);
        }
        if name.len() > MAX_NAME {
            return Err(vfs::Error::NameTooLong);
        }
        Ok(())
    }
}
