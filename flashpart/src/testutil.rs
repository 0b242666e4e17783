// SPDX-License-Identifier: MIT

use std::io::Write;

use flashimg::{DiskImage, FlatImage};
use tempfile::NamedTempFile;

/// Writes `bytes` to a temp file and opens it as a flat image.
pub(crate) fn flat_from_bytes(bytes: &[u8]) -> DiskImage {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(bytes).unwrap();
    tmp.flush().unwrap();
    DiskImage::Flat(FlatImage::open(tmp.path()).unwrap())
}

/// Builds a boot sector with the given `(type, first_lba, num_sectors)`
/// entries and a valid trailing signature.
pub(crate) fn mbr_sector(entries: &[(u8, u32, u32)]) -> [u8; 512] {
    let mut raw = [0u8; 512];
    raw[440..444].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
    for (i, &(part_type, first_lba, num_sectors)) in entries.iter().enumerate() {
        let base = 446 + i * 16;
        raw[base + 4] = part_type;
        raw[base + 8..base + 12].copy_from_slice(&first_lba.to_le_bytes());
        raw[base + 12..base + 16].copy_from_slice(&num_sectors.to_le_bytes());
    }
    raw[510] = 0x55;
    raw[511] = 0xAA;
    raw
}
