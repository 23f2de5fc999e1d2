use std::ffi::OsStr;

use fuser::MountOption;

/// 从第一个以`-`开头的参数起，其余都交给 FUSE 处理。
/// 返回（磁盘镜像，FUSE 参数）。
pub fn split_disks<S: AsRef<OsStr>>(args: &[S]) -> (&[S], &[S]) {
    let at = args
        .iter()
        .position(|arg| arg.as_ref().as_encoded_bytes().starts_with(b"-"))
        .unwrap_or(args.len());
    args.split_at(at)
}

/// `-o`的单个选项
pub fn mount_option(option: &str) -> MountOption {
    match option {
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        "default_permissions" => MountOption::DefaultPermissions,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        "dirsync" => MountOption::DirSync,
        option => match option.split_once('=') {
            Some(("fsname", name)) => MountOption::FSName(name.to_owned()),
            Some(("subtype", name)) => MountOption::Subtype(name.to_owned()),
            _ => MountOption::CUSTOM(option.to_owned()),
        },
    }
}
