pub type Result<T> = core::result::Result<T, Error>;

/// 一次文件系统调用失败的原因，在内核桥接处转换为 errno
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("no such file or directory")]
    NotFound,
    #[error("file exists")]
    AlreadyExists,
    #[error("no space left on device")]
    NoSpace,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("input/output error")]
    Io,
    #[error("is a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("file name too long")]
    NameTooLong,
}

impl Error {
    /// 对应的（正值）errno
    pub fn errno(self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::AlreadyExists => libc::EEXIST,
            Self::NoSpace => libc::ENOSPC,
            Self::InvalidArgument => libc::EINVAL,
            Self::Io => libc::EIO,
            Self::IsADirectory => libc::EISDIR,
            Self::NotADirectory => libc::ENOTDIR,
            Self::DirectoryNotEmpty => libc::ENOTEMPTY,
            Self::NameTooLong => libc::ENAMETOOLONG,
        }
    }
}

/// 越界或未对齐的访问只可能来自损坏的元数据
impl From<block_dev::Error> for Error {
    fn from(e: block_dev::Error) -> Self {
        log::error!("disk access failed: {e}");
        Self::Io
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno() {
        assert_eq!(Error::NotFound.errno(), libc::ENOENT);
        assert_eq!(Error::NoSpace.errno(), libc::ENOSPC);
        assert_eq!(Error::from(block_dev::Error::Empty), Error::Io);
    }
}
