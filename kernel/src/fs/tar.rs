//! USTAR archive headers.

use core::mem::size_of;

use static_assertions::const_assert_eq;

/// Size of an archive header block.
pub const HEADER_SIZE: usize = 512;

/// Capacity of the name field.
pub const NAME_MAX: usize = 100;

/// A USTAR header block.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)] // fields only reached through `as_bytes`
pub struct TarHeader {
    name: [u8; NAME_MAX],
    mode: [u8; 8],
    uid: [u8; 8],
    gid: [u8; 8],
    size: [u8; 12],
    mtime: [u8; 12],
    checksum: [u8; 8],
    typeflag: u8,
    linkname: [u8; 100],
    magic: [u8; 6],
    version: [u8; 2],
    uname: [u8; 32],
    gname: [u8; 32],
    devmajor: [u8; 8],
    devminor: [u8; 8],
    prefix: [u8; 155],
    padding: [u8; 12],
}

const_assert_eq!(size_of::<TarHeader>(), HEADER_SIZE);

/// Regular file entry type.
const TYPE_REGULAR: u8 = b'0';

impl TarHeader {
    const EMPTY: Self = Self {
        name: [0; NAME_MAX],
        mode: [0; 8],
        uid: [0; 8],
        gid: [0; 8],
        size: [0; 12],
        mtime: [0; 12],
        checksum: [0; 8],
        typeflag: 0,
        linkname: [0; 100],
        magic: [0; 6],
        version: [0; 2],
        uname: [0; 32],
        gname: [0; 32],
        devmajor: [0; 8],
        devminor: [0; 8],
        prefix: [0; 155],
        padding: [0; 12],
    };

    /// Builds the header of a regular file. Names longer than [`NAME_MAX`] are truncated.
    pub fn regular(name: &[u8], size: usize) -> Self {
        let mut hdr = Self::EMPTY;

        let len = name.len().min(NAME_MAX);
        hdr.name[..len].copy_from_slice(&name[..len]);
        hdr.mode[..6].copy_from_slice(b"000644");
        hdr.magic[..5].copy_from_slice(b"ustar");
        hdr.version.copy_from_slice(b"00");
        hdr.typeflag = TYPE_REGULAR;
        write_octal(&mut hdr.size[..11], size as u64);

        let sum = hdr.checksum();
        write_octal(&mut hdr.checksum[..6], sum);
        hdr.checksum[6] = 0;
        hdr.checksum[7] = b' ';

        hdr
    }

    /// Reinterprets a raw header block.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> &Self {
        // SAFETY: the header is made of byte arrays only, so it has alignment 1 and every bit
        // pattern is valid; the sizes match.
        unsafe { &*(bytes.as_ptr() as *const Self) }
    }

    /// Returns the raw bytes of this header.
    pub fn as_bytes(&self) -> &[u8; HEADER_SIZE] {
        // SAFETY: see `from_bytes`
        unsafe { &*(self as *const Self as *const [u8; HEADER_SIZE]) }
    }

    /// Returns the entry name, without the trailing NULs.
    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        &self.name[..len]
    }

    /// Returns whether the magic field identifies a POSIX or GNU ustar archive.
    pub fn is_ustar(&self) -> bool {
        &self.magic[..5] == b"ustar" && matches!(self.magic[5], 0 | b' ')
    }

    /// Returns the size of the entry's data. The field holds up to 33 bits.
    pub fn size(&self) -> u64 {
        parse_octal(&self.size)
    }

    /// Computes the header checksum, treating the checksum field as blanks.
    pub fn checksum(&self) -> u64 {
        let blanks = self.checksum.len() as u64 * b' ' as u64;
        let total: u64 = self.as_bytes().iter().map(|&b| b as u64).sum();
        let stored: u64 = self.checksum.iter().map(|&b| b as u64).sum();

        total - stored + blanks
    }

    /// Returns the checksum stored in the header.
    pub fn stored_checksum(&self) -> u64 {
        parse_octal(&self.checksum)
    }
}

/// Parses an octal number, skipping leading blanks and stopping at the first non-digit.
///
/// Values that do not fit a `u64` saturate.
pub fn parse_octal(field: &[u8]) -> u64 {
    field
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|b| (b'0'..=b'7').contains(*b))
        .fold(0u64, |acc, &b| {
            acc.checked_mul(8)
                .and_then(|v| v.checked_add((b - b'0') as u64))
                .unwrap_or(u64::MAX)
        })
}

/// Writes `value` as zero-padded octal digits filling the whole of `field`.
fn write_octal(field: &mut [u8], mut value: u64) {
    for b in field.iter_mut().rev() {
        *b = b'0' + (value % 8) as u8;
        value /= 8;
    }
}
