//! A flat in-memory filesystem persisted as a TAR image.
//!
//! The whole disk image is read into a fixed number of file slots at boot. Every update writes
//! the whole table back, so the on-disk archive is always a snapshot of the in-memory state.

use core::fmt;

use heapless::{String, Vec};
use kmm::Align;
use static_assertions::const_assert_eq;

use crate::{
    config::{FILES_MAX, FILE_DATA_MAX, SECTOR_SIZE},
    drivers::block::{BlockDevice, BlockError, Sector},
};

pub mod tar;

use tar::{TarHeader, HEADER_SIZE, NAME_MAX};

/// Size of the disk image holding the file table.
pub const DISK_SIZE: usize = FILES_MAX * (HEADER_SIZE + FILE_DATA_MAX);

const_assert_eq!(DISK_SIZE % SECTOR_SIZE, 0);

/// The global file table.
pub static FILES: spin::Mutex<FileTable> = spin::Mutex::new(FileTable::new());

/// The error type for filesystem operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// A header at the given image offset is not a ustar header.
    InvalidHeader {
        /// Byte offset of the header in the image.
        offset: usize,
    },
    /// The block device failed a transfer.
    Io(BlockError),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::InvalidHeader { offset } => write!(f, "invalid tar header at {:#x}", offset),
            FsError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl From<BlockError> for FsError {
    fn from(e: BlockError) -> Self {
        FsError::Io(e)
    }
}

/// A file with a fixed-capacity data buffer.
#[derive(Debug, Clone)]
pub struct File {
    name: String<NAME_MAX>,
    data: [u8; FILE_DATA_MAX],
    size: usize,
}

impl File {
    fn new(name: &str, data: &[u8]) -> Option<Self> {
        let mut file = Self {
            name: String::new(),
            data: [0; FILE_DATA_MAX],
            size: 0,
        };
        file.name.push_str(name).ok()?;
        file.write(data);

        Some(file)
    }

    /// Returns the name of the file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current contents of the file.
    pub fn contents(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Returns the size of the file, in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Copies the beginning of the file into `buf`, returning the number of bytes copied.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let len = buf.len().min(self.size);
        buf[..len].copy_from_slice(&self.data[..len]);
        len
    }

    /// Replaces the contents of the file with the first [`FILE_DATA_MAX`] bytes of `data`,
    /// returning the new size.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(FILE_DATA_MAX);
        self.data[..len].copy_from_slice(&data[..len]);
        self.size = len;
        len
    }
}

/// The in-memory file table and its disk image.
#[derive(Debug)]
pub struct FileTable {
    files: Vec<File, FILES_MAX>,
    disk: [u8; DISK_SIZE],
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTable {
    /// Creates an empty file table.
    pub const fn new() -> Self {
        Self {
            files: Vec::new(),
            disk: [0; DISK_SIZE],
        }
    }

    /// Replaces the table with the archive stored at the beginning of `dev`.
    ///
    /// Sectors that cannot be read are treated as empty. Returns the number of files loaded.
    pub fn load(&mut self, dev: &mut dyn BlockDevice) -> Result<usize, FsError> {
        self.files.clear();

        let mut sector: Sector = [0; SECTOR_SIZE];
        for (i, chunk) in self.disk.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            match dev.read_sector(i as u64, &mut sector) {
                Ok(()) => chunk.copy_from_slice(&sector),
                Err(e) => {
                    kwarn!("fs: cannot read sector {}: {}", i, e);
                    chunk.fill(0);
                }
            }
        }

        let mut off = 0;
        while off + HEADER_SIZE <= DISK_SIZE {
            let Ok(block) = <&[u8; HEADER_SIZE]>::try_from(&self.disk[off..off + HEADER_SIZE])
            else {
                break;
            };
            let hdr = TarHeader::from_bytes(block);

            if hdr.name().is_empty() {
                break;
            }
            if !hdr.is_ustar() {
                return Err(FsError::InvalidHeader { offset: off });
            }

            let raw_size = hdr.size();

            // Entries reaching past the image end the walk
            let next = raw_size
                .checked_add(HEADER_SIZE as u64)
                .map(|span| span.div_ceil(SECTOR_SIZE as u64))
                .and_then(|sectors| sectors.checked_mul(SECTOR_SIZE as u64))
                .and_then(|span| span.checked_add(off as u64))
                .map_or(DISK_SIZE, |next| next.min(DISK_SIZE as u64) as usize);

            let size = if raw_size > FILE_DATA_MAX as u64 {
                kwarn!("fs: file too large ({} bytes), truncated", raw_size);
                FILE_DATA_MAX
            } else {
                raw_size as usize
            };
            let data_start = off + HEADER_SIZE;
            let data_end = (data_start + size).min(DISK_SIZE);

            match core::str::from_utf8(hdr.name()) {
                Ok(name) if self.files.is_full() => {
                    kwarn!("fs: too many files, skipping {}", name);
                    break;
                }
                Ok(name) => {
                    if let Some(file) = File::new(name, &self.disk[data_start..data_end]) {
                        kinfo!("fs: file={}, size={}", file.name(), file.size());
                        // Capacity was checked above
                        let _ = self.files.push(file);
                    }
                }
                Err(_) => kwarn!("fs: skipping entry with a non UTF-8 name"),
            }

            off = next;
        }

        Ok(self.files.len())
    }

    /// Writes the whole table back to `dev`.
    ///
    /// Every sector is attempted; the first failure is reported.
    pub fn flush(&mut self, dev: &mut dyn BlockDevice) -> Result<(), FsError> {
        self.disk.fill(0);

        let mut off = 0;
        for file in &self.files {
            let hdr = TarHeader::regular(file.name().as_bytes(), file.size());
            self.disk[off..off + HEADER_SIZE].copy_from_slice(hdr.as_bytes());
            off += HEADER_SIZE;

            self.disk[off..off + file.size()].copy_from_slice(file.contents());
            off += file.size().align_up(SECTOR_SIZE);
        }

        let mut result = Ok(());
        let mut sector: Sector = [0; SECTOR_SIZE];
        for (i, chunk) in self.disk.chunks_exact(SECTOR_SIZE).enumerate() {
            sector.copy_from_slice(chunk);
            if let Err(e) = dev.write_sector(i as u64, &sector) {
                kerr!("fs: cannot write sector {}: {}", i, e);
                if result.is_ok() {
                    result = Err(FsError::Io(e));
                }
            }
        }

        result
    }

    /// Finds a file by its exact name.
    pub fn lookup(&self, name: &[u8]) -> Option<&File> {
        self.files.iter().find(|f| f.name().as_bytes() == name)
    }

    /// Finds a file by its exact name, for modification.
    pub fn lookup_mut(&mut self, name: &[u8]) -> Option<&mut File> {
        self.files.iter_mut().find(|f| f.name().as_bytes() == name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::vec::Vec as StdVec;

    use super::*;
    use crate::drivers::block::RamDisk;

    /// Builds a disk holding a tar archive of the given files.
    pub(crate) fn disk_with(files: &[(&str, &str)]) -> RamDisk {
        let mut image = StdVec::new();
        for (name, data) in files {
            image.extend_from_slice(TarHeader::regular(name.as_bytes(), data.len()).as_bytes());
            image.extend_from_slice(data.as_bytes());
            image.resize(image.len().align_up(SECTOR_SIZE), 0);
        }
        image.resize(DISK_SIZE, 0);

        let mut disk = RamDisk::new(DISK_SIZE / SECTOR_SIZE);
        for (i, chunk) in image.chunks_exact(SECTOR_SIZE).enumerate() {
            let sector: Sector = chunk.try_into().unwrap();
            disk.write_sector(i as u64, &sector).unwrap();
        }
        disk
    }

    #[test]
    fn load_archive() {
        let mut disk = disk_with(&[("hello.txt", "Hello world!\n"), ("meow.txt", "meow")]);
        let mut table = FileTable::new();

        assert_eq!(table.load(&mut disk), Ok(2));

        let hello = table.lookup(b"hello.txt").unwrap();
        assert_eq!(hello.contents(), b"Hello world!\n");
        assert_eq!(table.lookup(b"meow.txt").unwrap().size(), 4);
        assert!(table.lookup(b"hello").is_none());
        assert!(table.lookup(b"hello.txt\0").is_none());
    }

    #[test]
    fn blank_disk_is_empty() {
        let mut disk = RamDisk::new(DISK_SIZE / SECTOR_SIZE);
        let mut table = FileTable::new();

        assert_eq!(table.load(&mut disk), Ok(0));
        assert!(table.files.is_empty());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut disk = RamDisk::new(DISK_SIZE / SECTOR_SIZE);
        let mut garbage = [0u8; SECTOR_SIZE];
        garbage[..8].copy_from_slice(b"not-tar!");
        disk.write_sector(0, &garbage).unwrap();

        let mut table = FileTable::new();
        assert_eq!(
            table.load(&mut disk),
            Err(FsError::InvalidHeader { offset: 0 })
        );
    }

    #[test]
    fn oversized_entries_are_truncated() {
        let big = [b'x'; FILE_DATA_MAX + 100];
        let mut disk = disk_with(&[]);
        let mut image = StdVec::new();
        image.extend_from_slice(TarHeader::regular(b"big.bin", big.len()).as_bytes());
        image.extend_from_slice(&big);
        image.resize(DISK_SIZE, 0);
        for (i, chunk) in image.chunks_exact(SECTOR_SIZE).enumerate() {
            disk.write_sector(i as u64, chunk.try_into().unwrap()).unwrap();
        }

        let mut table = FileTable::new();
        table.load(&mut disk).unwrap();

        assert_eq!(table.lookup(b"big.bin").unwrap().size(), FILE_DATA_MAX);
    }

    #[test]
    fn huge_size_field_ends_the_walk() {
        let mut disk = disk_with(&[("huge.bin", "data"), ("meow.txt", "meow")]);

        // 0o77777777000 bytes, far past the end of the image
        let mut sector: Sector = [0; SECTOR_SIZE];
        disk.read_sector(0, &mut sector).unwrap();
        sector[124..136].copy_from_slice(b"77777777000\0");
        disk.write_sector(0, &sector).unwrap();

        let mut table = FileTable::new();
        assert_eq!(table.load(&mut disk), Ok(1));

        let huge = table.lookup(b"huge.bin").unwrap();
        assert_eq!(huge.size(), FILE_DATA_MAX);
        assert_eq!(&huge.contents()[..4], b"data");
        assert!(table.lookup(b"meow.txt").is_none());
    }

    #[test]
    fn flush_then_reload() {
        let mut disk = disk_with(&[("hello.txt", "old"), ("meow.txt", "meow")]);
        let mut table = FileTable::new();
        table.load(&mut disk).unwrap();

        let file = table.lookup_mut(b"hello.txt").unwrap();
        assert_eq!(file.write(b"Hello from shell!\n"), 18);
        table.flush(&mut disk).unwrap();

        let mut reloaded = FileTable::new();
        assert_eq!(reloaded.load(&mut disk), Ok(2));
        assert_eq!(
            reloaded.lookup(b"hello.txt").unwrap().contents(),
            b"Hello from shell!\n"
        );
        assert_eq!(reloaded.lookup(b"meow.txt").unwrap().contents(), b"meow");
    }

    #[test]
    fn flushed_headers_are_valid() {
        let mut disk = disk_with(&[("hello.txt", "hi")]);
        let mut table = FileTable::new();
        table.load(&mut disk).unwrap();
        table.flush(&mut disk).unwrap();

        let image = disk.image();
        let hdr = TarHeader::from_bytes(image[..HEADER_SIZE].try_into().unwrap());
        assert!(hdr.is_ustar());
        assert_eq!(hdr.stored_checksum(), hdr.checksum());
        assert_eq!(&image[HEADER_SIZE..HEADER_SIZE + 2], b"hi");
        // Stale bytes past the file are cleared
        assert!(image[HEADER_SIZE + 2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn read_and_write_clamp() {
        let mut disk = disk_with(&[("a", "0123456789")]);
        let mut table = FileTable::new();
        table.load(&mut disk).unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(table.lookup(b"a").unwrap().read(&mut buf), 10);
        assert_eq!(table.lookup(b"a").unwrap().read(&mut buf[..4]), 4);
        assert_eq!(&buf[..4], b"0123");

        let big = [b'y'; FILE_DATA_MAX + 1];
        assert_eq!(table.lookup_mut(b"a").unwrap().write(&big), FILE_DATA_MAX);
    }

    #[test]
    fn short_device_reports_flush_errors() {
        let mut disk = RamDisk::new(2);
        let mut table = FileTable::new();
        assert_eq!(table.load(&mut disk), Ok(0));

        assert_eq!(
            table.flush(&mut disk),
            Err(FsError::Io(BlockError::OutOfRange {
                sector: 2,
                capacity: 2
            }))
        );
    }
}
