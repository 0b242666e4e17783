// SPDX-License-Identifier: MIT

use std::io::Write;

use tempfile::NamedTempFile;

use crate::{DiskImage, FlatImage};

/// Writes `bytes` to a temp file and opens it as a flat image.
///
/// The temp file handle is dropped on purpose: on the platforms we test on,
/// the memory map outlives the directory entry.
pub(crate) fn flat_from_bytes(bytes: &[u8]) -> DiskImage {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(bytes).unwrap();
    tmp.flush().unwrap();
    DiskImage::Flat(FlatImage::open(tmp.path()).unwrap())
}
