// SPDX-License-Identifier: MIT

//! MBR and GPT partition tables: parse, validate, rewrite.
//!
//! [`PartitionTable::detect`] classifies a disk image, trying GPT before
//! falling back to plain MBR. Either variant exposes the partition extents
//! the copy plan must cover and can serialize a fresh table sized to the
//! destination device, which usually differs from the source image length.

mod error;
mod gpt;
mod mbr;

pub use error::{PartError, PartResult};
pub use gpt::{GPT_ENTRY_SIZE, GPT_HEADER_SIZE, GPT_REVISION, GPT_SIGNATURE, GptEntry, GptHeader, GptInfo};
pub use mbr::{MBR_SIGNATURE, Mbr, MbrEntry, MbrInfo, PROTECTIVE_GPT};

#[cfg(test)]
mod testutil;

use flashimg::{DiskImage, Extent};
use flashio::BlockIO;

/// A recognized partition table, MBR or GPT.
///
/// Closed union on purpose: callers match exhaustively, and a new scheme is a
/// deliberate API change rather than a silently registered trait object.
#[derive(Clone)]
pub enum PartitionTable {
    Mbr(MbrInfo),
    Gpt(GptInfo),
}

impl PartitionTable {
    /// Classifies `image`, GPT first.
    ///
    /// `Ok(None)` means no table at all. A protective MBR with a broken GPT
    /// behind it is an error, never a fallback to the MBR view.
    pub fn detect(image: &DiskImage) -> PartResult<Option<Self>> {
        if let Some(gpt) = GptInfo::try_parse(image)? {
            return Ok(Some(Self::Gpt(gpt)));
        }
        Ok(MbrInfo::try_parse(image)?.map(Self::Mbr))
    }

    /// Sector-aligned extents that must reach the destination.
    pub fn partitions(&self) -> &[Extent] {
        match self {
            Self::Mbr(info) => info.partitions(),
            Self::Gpt(info) => info.partitions(),
        }
    }

    /// Serializes a fresh table sized to `dest_len` bytes.
    pub fn write_table<IO: BlockIO + ?Sized>(&self, io: &mut IO, dest_len: u64) -> PartResult {
        match self {
            Self::Mbr(info) => info.write_table(io, dest_len),
            Self::Gpt(info) => info.write_table(io, dest_len),
        }
    }

    pub fn scheme_name(&self) -> &'static str {
        match self {
            Self::Mbr(_) => "MBR",
            Self::Gpt(_) => "GPT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{flat_from_bytes, mbr_sector};

    #[test]
    fn detect_prefers_gpt_and_falls_back_to_mbr() {
        let mut plain = vec![0u8; 4096];
        plain[..512].copy_from_slice(&mbr_sector(&[(0x07, 2048, 1024)]));
        let table = PartitionTable::detect(&flat_from_bytes(&plain))
            .unwrap()
            .unwrap();
        assert!(matches!(table, PartitionTable::Mbr(_)));
    }

    #[test]
    fn detect_finds_nothing_on_blank_disk() {
        let table = PartitionTable::detect(&flat_from_bytes(&[0u8; 4096])).unwrap();
        assert!(table.is_none());
    }

    #[test]
    fn broken_gpt_behind_protective_mbr_is_fatal() {
        // Protective entry present but LBA 1 holds no GPT header.
        let mut disk = vec![0u8; 8192];
        disk[..512].copy_from_slice(&mbr_sector(&[(PROTECTIVE_GPT, 1, 15)]));
        assert!(matches!(
            PartitionTable::detect(&flat_from_bytes(&disk)),
            Err(PartError::BadSignature)
        ));
    }
}
