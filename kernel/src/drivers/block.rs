//! Block device interface.

use core::fmt;

use crate::config::SECTOR_SIZE;

/// A sector-sized transfer buffer.
pub type Sector = [u8; SECTOR_SIZE];

/// The error type returned by block device operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// The sector lies beyond the end of the device.
    OutOfRange {
        /// Requested sector.
        sector: u64,
        /// Device capacity, in sectors.
        capacity: u64,
    },
    /// The device completed the request with a non-zero status.
    Device(u8),
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::OutOfRange { sector, capacity } => write!(
                f,
                "sector {} out of range (capacity {} sectors)",
                sector, capacity
            ),
            BlockError::Device(status) => write!(f, "device error, status {}", status),
        }
    }
}

/// A device transferring data one fixed-size sector at a time.
pub trait BlockDevice {
    /// Returns the device capacity, in sectors.
    fn capacity(&self) -> u64;

    /// Reads sector `sector` into `buf`.
    fn read_sector(&mut self, sector: u64, buf: &mut Sector) -> Result<(), BlockError>;

    /// Writes `buf` to sector `sector`.
    fn write_sector(&mut self, sector: u64, buf: &Sector) -> Result<(), BlockError>;
}

/// A block device backed by kernel memory.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct RamDisk {
    sectors: std::vec::Vec<Sector>,
}

#[cfg(test)]
impl RamDisk {
    /// Creates a zeroed disk of `capacity` sectors.
    pub fn new(capacity: usize) -> Self {
        Self {
            sectors: vec![[0; SECTOR_SIZE]; capacity],
        }
    }

    /// Returns the raw disk image.
    pub fn image(&self) -> std::vec::Vec<u8> {
        self.sectors.concat()
    }
}

#[cfg(test)]
impl BlockDevice for RamDisk {
    fn capacity(&self) -> u64 {
        self.sectors.len() as u64
    }

    fn read_sector(&mut self, sector: u64, buf: &mut Sector) -> Result<(), BlockError> {
        let capacity = self.capacity();
        let data = self
            .sectors
            .get(sector as usize)
            .ok_or(BlockError::OutOfRange { sector, capacity })?;
        buf.copy_from_slice(data);
        Ok(())
    }

    fn write_sector(&mut self, sector: u64, buf: &Sector) -> Result<(), BlockError> {
        let capacity = self.capacity();
        let data = self
            .sectors
            .get_mut(sector as usize)
            .ok_or(BlockError::OutOfRange { sector, capacity })?;
        data.copy_from_slice(buf);
        Ok(())
    }
}
