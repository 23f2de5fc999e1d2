#![allow(dead_code)]

use std::fs;

use block_dev::Disk;
use tempfile::NamedTempFile;
use typed_bytesize::ByteSizeIec;
use wfs::{FormatOptions, Layout, Owner, RaidMode, Wfs};

pub const OWNER: Owner = Owner { uid: 1000, gid: 1000 };
pub const FS_ID: u32 = 0x5eed;

/// 一组稀疏的磁盘镜像
pub struct Images {
    files: Vec<NamedTempFile>,
}

impl Images {
    pub fn new(count: usize, size: u64) -> Self {
        let files = (0..count)
            .map(|_| {
                let file = NamedTempFile::new().unwrap();
                file.as_file().set_len(size).unwrap();
                file
            })
            .collect();

        Self { files }
    }

    pub fn mib(count: usize, mib: u64) -> Self {
        Self::new(count, ByteSizeIec::mib(mib).0)
    }

    pub fn open(&self) -> Vec<Disk> {
        self.files.iter().map(|file| Disk::open(file.path()).unwrap()).collect()
    }

    pub fn open_one(&self, index: usize) -> Disk {
        Disk::open(self.files[index].path()).unwrap()
    }

    pub fn path(&self, index: usize) -> &std::path::Path {
        self.files[index].path()
    }

    pub fn bytes(&self, index: usize) -> Vec<u8> {
        fs::read(self.files[index].path()).unwrap()
    }

    pub fn format(&self, options: &FormatOptions) -> Layout {
        Wfs::format(&mut self.open(), options).unwrap()
    }

    pub fn mount(&self) -> Wfs {
        Wfs::mount(self.open()).unwrap()
    }
}

pub fn options(mode: RaidMode, inodes: u64, blocks: u64) -> FormatOptions {
    FormatOptions {
        mode,
        inodes,
        blocks,
        fs_identifier: FS_ID,
        owner: OWNER,
        time: 1_700_000_000,
    }
}

/// 格式化并挂载
pub fn volume(mode: RaidMode, disks: usize, mib: u64, inodes: u64, blocks: u64) -> (Images, Wfs) {
    let images = Images::mib(disks, mib);
    images.format(&options(mode, inodes, blocks));
    let wfs = images.mount();
    (images, wfs)
}

/// 每个已分配的 inode 在每块盘上都有非零的 mode
pub fn assert_allocated_inodes_have_mode(wfs: &Wfs) {
    let layout = wfs.layout();
    let bitmap = layout.inode_bitmap();
    for (index, disk) in wfs.disks().iter().enumerate() {
        for num in 0..layout.num_inodes as u32 {
            if bitmap.contains(disk, num).unwrap() {
                let inode = wfs.inode_on(index, num).unwrap();
                assert_ne!(inode.mode, 0, "inode {num} on disk {index}");
            }
        }
    }
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
