mod common;

use common::{OWNER, volume};
use vfs::{DirEntryType, Error};
use wfs::{BLOCK_SIZE, RaidMode, ROOT_INODE};

fn names(wfs: &wfs::Wfs, path: &str) -> Vec<String> {
    wfs.readdir(path).unwrap().into_iter().map(|entry| entry.name).collect()
}

#[test]
fn directory_growth_reuses_slots() {
    let (_images, mut wfs) = volume(RaidMode::Raid1, 2, 1, 32, 64);

    for i in 0..16 {
        wfs.mknod(&format!("/f{i}"), 0o644, OWNER).unwrap();
    }
    let root = wfs.getattr("/").unwrap();
    assert_eq!(root.size, BLOCK_SIZE as u64);
    assert_eq!(root.links, 1 + 16);

    for i in (0..16).step_by(2) {
        wfs.unlink(&format!("/f{i}")).unwrap();
    }
    let root = wfs.getattr("/").unwrap();
    assert_eq!(root.size, BLOCK_SIZE as u64);
    assert_eq!(root.links, 1 + 8);

    let free_blocks = wfs.statfs().unwrap().free_blocks;
    for i in 0..8 {
        wfs.mknod(&format!("/g{i}"), 0o644, OWNER).unwrap();
    }
    // 空槽被复用，没有新分配数据块
    assert_eq!(wfs.getattr("/").unwrap().size, BLOCK_SIZE as u64);
    assert_eq!(wfs.statfs().unwrap().free_blocks, free_blocks);
    assert_eq!(&names(&wfs, "/")[2..6], ["g0", "f1", "g1", "f3"]);

    // 槽位用尽后目录增大一整块
    wfs.mknod("/h", 0o644, OWNER).unwrap();
    let root = wfs.getattr("/").unwrap();
    assert_eq!(root.size, 2 * BLOCK_SIZE as u64);
    assert_eq!(root.size % BLOCK_SIZE as u64, 0);
    assert_eq!(root.links, 1 + 17);
    assert_eq!(wfs.statfs().unwrap().free_blocks, free_blocks - 1);
}

#[test]
fn directory_is_capped_at_direct_blocks() {
    let (_images, mut wfs) = volume(RaidMode::Raid1, 2, 1, 128, 32);

    for i in 0..112 {
        wfs.mknod(&format!("/f{i}"), 0o644, OWNER).unwrap();
    }
    assert_eq!(wfs.getattr("/").unwrap().size, 7 * BLOCK_SIZE as u64);

    let free_inodes = wfs.statfs().unwrap().free_inodes;
    assert_eq!(wfs.mknod("/full", 0o644, OWNER).unwrap_err(), Error::NoSpace);
    // 新分配的 inode 已被收回
    assert_eq!(wfs.statfs().unwrap().free_inodes, free_inodes);
    assert_eq!(wfs.getattr("/full").unwrap_err(), Error::NotFound);
    common::assert_allocated_inodes_have_mode(&wfs);
}

#[test]
fn nested_directories() {
    let (_images, mut wfs) = volume(RaidMode::Raid0, 3, 1, 32, 64);

    let stat = wfs.mkdir("/a", 0o755, OWNER).unwrap();
    assert_eq!(stat.kind, DirEntryType::Directory);
    assert_eq!(stat.mode, libc::S_IFDIR | 0o755);
    wfs.mkdir("/a/b", 0o700, OWNER).unwrap();
    wfs.mknod("/a/b/file", 0o644, OWNER).unwrap();
    wfs.write("/a/b/file", 0, b"deep").unwrap();

    let mut buf = [0; 4];
    wfs.read("/a/b/file", 0, &mut buf).unwrap();
    assert_eq!(&buf, b"deep");

    let a = wfs.resolve("/a").unwrap();
    let b = wfs.resolve("/a/b").unwrap();
    let listing = wfs.readdir("/a/b").unwrap();
    assert_eq!(listing[0].name, ".");
    assert_eq!(listing[0].inode, u64::from(b));
    assert_eq!(listing[1].name, "..");
    assert_eq!(listing[1].inode, u64::from(a));
    assert_eq!(listing[2].name, "file");
    assert_eq!(listing[2].ty, DirEntryType::Regular);

    let root = wfs.readdir("/").unwrap();
    assert_eq!(root[1].inode, u64::from(ROOT_INODE));
    assert_eq!(root[2].ty, DirEntryType::Directory);

    assert_eq!(wfs.lookup(a, "b").unwrap().inode, u64::from(b));
    assert_eq!(wfs.lookup(a, "c").unwrap_err(), Error::NotFound);
    assert_eq!(wfs.lookup(b, &"x".repeat(40)).unwrap_err(), Error::NameTooLong);
}

#[test]
fn rmdir_is_strict() {
    let (_images, mut wfs) = volume(RaidMode::Raid1, 2, 1, 32, 32);
    wfs.mkdir("/d", 0o755, OWNER).unwrap();
    wfs.mknod("/d/f", 0o644, OWNER).unwrap();

    assert_eq!(wfs.rmdir("/d").unwrap_err(), Error::DirectoryNotEmpty);
    assert_eq!(wfs.unlink("/d").unwrap_err(), Error::IsADirectory);
    assert_eq!(wfs.rmdir("/d/f").unwrap_err(), Error::NotADirectory);
    assert_eq!(wfs.rmdir("/").unwrap_err(), Error::InvalidArgument);

    wfs.unlink("/d/f").unwrap();
    // 删空后目录仍保留着它的块
    assert_eq!(wfs.getattr("/d").unwrap().size, BLOCK_SIZE as u64);
    assert_eq!(wfs.getattr("/d").unwrap().links, 1);

    let before = wfs.statfs().unwrap();
    wfs.rmdir("/d").unwrap();
    let after = wfs.statfs().unwrap();
    assert_eq!(after.free_blocks, before.free_blocks + 1);
    assert_eq!(after.free_inodes, before.free_inodes + 1);
    assert_eq!(names(&wfs, "/"), [".", ".."]);
    assert_eq!(wfs.getattr("/").unwrap().links, 1);
}

#[test]
fn names_are_exact() {
    let (_images, mut wfs) = volume(RaidMode::Raid1, 2, 1, 32, 32);
    let longest = "n".repeat(28);

    wfs.mknod(&format!("/{longest}"), 0o644, OWNER).unwrap();
    wfs.mknod("/ab", 0o644, OWNER).unwrap();

    assert!(wfs.getattr(&format!("/{longest}")).is_ok());
    assert_eq!(wfs.getattr("/a").unwrap_err(), Error::NotFound);
    assert_eq!(wfs.getattr("/abc").unwrap_err(), Error::NotFound);
    assert_eq!(names(&wfs, "/")[2..], [longest.as_str(), "ab"]);
}
