use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use block_dev::Disk;
use fuser::MountOption;
use tempfile::NamedTempFile;
use vfs::{DirEntryType, Error, Stat};
use wfs::{FormatOptions, RaidMode};

use super::*;

const OWNER: Owner = Owner { uid: 1000, gid: 1000 };

/// 两块 1 MiB 镜像组成的镜像卷
fn volume() -> (Vec<NamedTempFile>, WfsFuse) {
    let files: Vec<NamedTempFile> = (0..2)
        .map(|_| {
            let file = NamedTempFile::new().unwrap();
            file.as_file().set_len(1 << 20).unwrap();
            file
        })
        .collect();
    let mut disks: Vec<Disk> = files.iter().map(|file| Disk::open(file.path()).unwrap()).collect();
    Wfs::format(&mut disks, &FormatOptions::new(RaidMode::Raid1, 32, 32)).unwrap();

    (files, WfsFuse::new(Wfs::mount(disks).unwrap()))
}

fn args(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

#[test]
fn disks_come_first() {
    let all = args(&["d0.img", "d1.img", "-f", "-s", "mnt"]);
    let (disks, rest) = split_disks(&all);
    assert_eq!(disks, ["d0.img", "d1.img"]);
    assert_eq!(rest, ["-f", "-s", "mnt"]);

    // 磁盘之后的位置参数不再算作磁盘
    let all = args(&["a", "-o", "ro", "b"]);
    let (disks, rest) = split_disks(&all);
    assert_eq!(disks, ["a"]);
    assert_eq!(rest.len(), 3);

    let all = args(&["a", "b"]);
    assert_eq!(split_disks(&all).1.len(), 0);

    // 镜像路径不必是 UTF-8
    let all = [
        OsStr::from_bytes(b"d\xff.img").to_owned(),
        OsString::from("d1.img"),
        OsString::from("-f"),
        OsString::from("mnt"),
    ];
    let (disks, rest) = split_disks(&all);
    assert_eq!(disks.len(), 2);
    assert_eq!(rest, ["-f", "mnt"]);
}

#[test]
fn options() {
    assert_eq!(mount_option("ro"), MountOption::RO);
    assert_eq!(mount_option("allow_other"), MountOption::AllowOther);
    assert_eq!(mount_option("fsname=raid"), MountOption::FSName("raid".to_owned()));
    assert_eq!(mount_option("max_read=4096"), MountOption::CUSTOM("max_read=4096".to_owned()));
}

#[test]
fn inode_numbers() {
    assert_eq!(to_ino(0), FUSE_ROOT_ID);
    assert_eq!(to_num(FUSE_ROOT_ID), Ok(0));
    assert_eq!(to_num(0), Err(Error::NotFound));
    assert_eq!(to_num(u64::MAX), Err(Error::NotFound));
    assert_eq!(to_name(OsStr::new("a")), Ok("a"));
}

#[test]
fn attributes() {
    let stat = Stat {
        inode: 4,
        kind: DirEntryType::Regular,
        mode: libc::S_IFREG | 0o640,
        uid: 1,
        gid: 2,
        size: 513,
        links: 1,
        atime: 10,
        mtime: 20,
        ctime: 30,
    };

    let attr = file_attr(&stat);
    assert_eq!(attr.ino, 5);
    assert_eq!(attr.kind, FileType::RegularFile);
    assert_eq!(attr.perm, 0o640);
    assert_eq!(attr.blocks, 2);
    assert_eq!(attr.mtime, UNIX_EPOCH + Duration::from_secs(20));
    assert_eq!(from_time(TimeOrNow::SpecificTime(attr.ctime)), 30);
}

#[test]
fn parents_follow_the_tree() {
    let (_files, mut fuse) = volume();
    let dir = fuse
        .do_create(FUSE_ROOT_ID, OsStr::new("d"), libc::S_IFDIR | 0o755, OWNER)
        .unwrap();
    let sub = fuse
        .do_create(to_ino(dir.inode), OsStr::new("e"), libc::S_IFDIR | 0o755, OWNER)
        .unwrap();
    assert_eq!(fuse.parents.get(&to_ino(sub.inode)), Some(&to_ino(dir.inode)));

    let entries = fuse.do_readdir(to_ino(sub.inode)).unwrap();
    assert_eq!(entries[1].name, "..");
    assert_eq!(entries[1].inode, dir.inode);

    fuse.do_remove(to_ino(dir.inode), OsStr::new("e"), DirEntryType::Directory)
        .unwrap();
    assert!(!fuse.parents.contains_key(&to_ino(sub.inode)));
    assert_eq!(
        fuse.do_remove(to_ino(dir.inode), OsStr::new("e"), DirEntryType::Directory),
        Err(Error::NotFound)
    );
}

#[test]
fn reused_inode_gets_its_new_parent() {
    let (_files, mut fuse) = volume();
    let a = fuse
        .do_create(FUSE_ROOT_ID, OsStr::new("a"), libc::S_IFDIR | 0o755, OWNER)
        .unwrap();
    let old = fuse
        .do_create(to_ino(a.inode), OsStr::new("b"), libc::S_IFDIR | 0o755, OWNER)
        .unwrap();
    fuse.do_remove(to_ino(a.inode), OsStr::new("b"), DirEntryType::Directory)
        .unwrap();

    // 最低的空闲编号被复用
    let new = fuse.fs.create_at(0, "c", libc::S_IFDIR | 0o755, OWNER).unwrap();
    assert_eq!(new.inode, old.inode);

    let entries = fuse.do_readdir(to_ino(new.inode)).unwrap();
    assert_eq!(entries[1].inode, 0);
}

#[test]
fn unlink_keeps_files_apart_from_directories() {
    let (_files, mut fuse) = volume();
    fuse.do_create(FUSE_ROOT_ID, OsStr::new("f"), libc::S_IFREG | 0o644, OWNER)
        .unwrap();
    fuse.do_create(FUSE_ROOT_ID, OsStr::new("d"), libc::S_IFDIR | 0o755, OWNER)
        .unwrap();

    assert_eq!(
        fuse.do_remove(FUSE_ROOT_ID, OsStr::new("d"), DirEntryType::Regular),
        Err(Error::IsADirectory)
    );
    fuse.do_remove(FUSE_ROOT_ID, OsStr::new("f"), DirEntryType::Regular)
        .unwrap();
    assert_eq!(
        fuse.do_lookup(FUSE_ROOT_ID, OsStr::new("f")),
        Err(Error::NotFound)
    );
}
