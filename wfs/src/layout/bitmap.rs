use block_dev::Disk;

/// 位图以 32 位字为单位存放
type Word = u32;

const WORD_BITS: usize = Word::BITS as usize;

/// 位图区域，记录其指示区域的分配情况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitmap {
    /// 位图在镜像内的起始偏移
    start: u64,
    /// 位图占用的字数
    words: usize,
}

impl Bitmap {
    #[inline]
    pub fn new(start: u64, words: usize) -> Self {
        Self { start, words }
    }

    pub fn contains(&self, disk: &Disk, pos: u32) -> block_dev::Result<bool> {
        let (word, bit) = split(pos);
        if word >= self.words {
            return Ok(false);
        }
        Ok(self.bits(disk)?[word] & (1 << bit) != 0)
    }

    /// 在单块盘上分配最低的空闲位，返回其编号。
    /// 若位图已满，则返回空。
    pub fn alloc(&self, disk: &mut Disk) -> block_dev::Result<Option<u32>> {
        let bits = self.bits_mut(disk)?;
        let Some((word, bit)) = bits
            .iter()
            .enumerate()
            .find_map(|(word, &bits)| (bits != Word::MAX).then_some((word, bits.trailing_ones())))
        else {
            return Ok(None);
        };

        bits[word] |= 1 << bit;
        Ok(Some(join(word, bit as usize)))
    }

    /// 在所有盘上同时分配同一个位：取各盘都空闲的最低位
    pub fn alloc_all(&self, disks: &mut [Disk]) -> block_dev::Result<Option<u32>> {
        let mut found = None;
        for word in 0..self.words {
            let mut union = 0;
            for disk in disks.iter() {
                union |= self.bits(disk)?[word];
            }
            if union != Word::MAX {
                found = Some((word, union.trailing_ones() as usize));
                break;
            }
        }

        let Some((word, bit)) = found else {
            return Ok(None);
        };
        for disk in disks.iter_mut() {
            self.bits_mut(disk)?[word] |= 1 << bit;
        }

        Ok(Some(join(word, bit)))
    }

    pub fn dealloc(&self, disk: &mut Disk, pos: u32) -> block_dev::Result<()> {
        let (word, bit) = split(pos);
        let Some(bits) = self.bits_mut(disk)?.get_mut(word) else {
            log::warn!("bit {pos} is outside the bitmap");
            return Ok(());
        };

        if *bits & (1 << bit) == 0 {
            log::warn!("bit {pos} was already free");
        }
        *bits &= !(1 << bit);

        Ok(())
    }

    /// 已分配的项数
    pub fn count_used(&self, disk: &Disk) -> block_dev::Result<usize> {
        Ok(self
            .bits(disk)?
            .iter()
            .map(|bits| bits.count_ones() as usize)
            .sum())
    }

    #[inline]
    fn bits<'a>(&self, disk: &'a Disk) -> block_dev::Result<&'a [Word]> {
        disk.slice(self.start, self.words)
    }

    #[inline]
    fn bits_mut<'a>(&self, disk: &'a mut Disk) -> block_dev::Result<&'a mut [Word]> {
        disk.slice_mut(self.start, self.words)
    }
}

#[inline]
fn split(pos: u32) -> (usize, usize) {
    let pos = pos as usize;
    (pos / WORD_BITS, pos % WORD_BITS)
}

#[inline]
fn join(word: usize, bit: usize) -> u32 {
    (word * WORD_BITS + bit) as u32
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use super::*;

    fn disk() -> (NamedTempFile, Disk) {
        let file = NamedTempFile::new().unwrap();
        file.as_file().set_len(1024).unwrap();
        let disk = Disk::open(file.path()).unwrap();
        (file, disk)
    }

    #[test]
    fn alloc_lowest_free() {
        let (_file, mut disk) = disk();
        let bitmap = Bitmap::new(64, 2);

        for expected in 0..40 {
            assert_eq!(bitmap.alloc(&mut disk).unwrap(), Some(expected));
        }
        assert_eq!(bitmap.count_used(&disk).unwrap(), 40);

        bitmap.dealloc(&mut disk, 3).unwrap();
        assert!(!bitmap.contains(&disk, 3).unwrap());
        assert_eq!(bitmap.alloc(&mut disk).unwrap(), Some(3));
        assert!(bitmap.contains(&disk, 39).unwrap());
        assert!(!bitmap.contains(&disk, 64).unwrap());
    }

    #[test]
    fn exhausted() {
        let (_file, mut disk) = disk();
        let bitmap = Bitmap::new(0, 1);
        for _ in 0..32 {
            assert!(bitmap.alloc(&mut disk).unwrap().is_some());
        }
        assert_eq!(bitmap.alloc(&mut disk).unwrap(), None);
        // 位图之后的字节未被触碰
        assert_eq!(*disk.get::<u32>(4).unwrap(), 0);
    }

    #[test]
    fn alloc_on_every_disk() {
        let (_a, a) = disk();
        let (_b, b) = disk();
        let mut disks = [a, b];
        let bitmap = Bitmap::new(64, 2);

        bitmap.alloc(&mut disks[0]).unwrap();
        bitmap.alloc(&mut disks[1]).unwrap();
        bitmap.alloc(&mut disks[1]).unwrap();

        // 0 号盘用了 0，1 号盘用了 0、1，共同空闲的最低位是 2
        assert_eq!(bitmap.alloc_all(&mut disks).unwrap(), Some(2));
        assert!(bitmap.contains(&disks[0], 2).unwrap());
        assert!(bitmap.contains(&disks[1], 2).unwrap());
        assert!(!bitmap.contains(&disks[0], 1).unwrap());
    }
}
