#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number
    pub inode: u64,
    pub ty: DirEntryType,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirEntryType {
    Directory,
    #[default]
    Regular,
}

impl DirEntryType {
    /// 由 inode 的 `mode` 字段推断类型
    #[inline]
    pub fn from_mode(mode: u32) -> Self {
        if mode & libc::S_IFMT == libc::S_IFDIR {
            Self::Directory
        } else {
            Self::Regular
        }
    }

    /// 写入 `mode` 字段的类型位
    #[inline]
    pub fn mode_bits(self) -> u32 {
        match self {
            Self::Directory => libc::S_IFDIR,
            Self::Regular => libc::S_IFREG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trip() {
        assert_eq!(DirEntryType::from_mode(libc::S_IFDIR | 0o755), DirEntryType::Directory);
        assert_eq!(DirEntryType::from_mode(libc::S_IFREG | 0o644), DirEntryType::Regular);
        assert_eq!(DirEntryType::Directory.mode_bits() | 0o755, 0o040755);
    }
}
