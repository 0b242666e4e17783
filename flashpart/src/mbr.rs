// SPDX-License-Identifier: MIT

//! Master Boot Record parsing and protective-entry rewriting.

use flashimg::{DiskImage, Extent, SECTOR_SIZE};
use flashio::{BlockIO, BlockIOStructExt};
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{PartError, PartResult};

pub const MBR_SIGNATURE: u16 = 0xAA55;
pub const PROTECTIVE_GPT: u8 = 0xEE;

/// One of the four primary partition entries.
#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
pub struct MbrEntry {
    pub status: u8,
    pub first_chs: [u8; 3],
    pub part_type: u8,
    pub last_chs: [u8; 3],
    pub first_lba: U32<LittleEndian>,
    pub num_sectors: U32<LittleEndian>,
}

impl MbrEntry {
    #[inline]
    pub fn is_protective(&self) -> bool {
        self.part_type == PROTECTIVE_GPT
    }
}

/// The full 512-byte boot sector.
///
/// Multi-byte fields use unaligned little-endian wrappers because the entry
/// array starts at offset 446, which leaves the LBA fields 2-byte aligned.
#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone)]
pub struct Mbr {
    pub bootstrap1: [u8; 218],
    pub zeros1: [u8; 2],
    pub original_physical_drive: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub bootstrap2: [u8; 216],
    pub disk_signature: U32<LittleEndian>,
    pub zeros2: [u8; 2],
    pub entries: [MbrEntry; 4],
    pub boot_signature: U16<LittleEndian>,
}

/// A recognized MBR, held verbatim for later rewriting.
#[derive(Clone)]
pub struct MbrInfo {
    sector: Mbr,
    partitions: Vec<Extent>,
    has_protective: bool,
}

impl MbrInfo {
    /// Parses the boot sector of `image`.
    ///
    /// Returns `Ok(None)` when there is no MBR signature; anything after the
    /// signature check is taken at face value. The reported partition list is
    /// the single extent covering everything past sector 0, because boot
    /// loaders routinely live outside the formal partition entries and must
    /// be copied too.
    pub fn try_parse(image: &DiskImage) -> PartResult<Option<Self>> {
        if image.len() < SECTOR_SIZE {
            return Ok(None);
        }
        let mut raw = [0u8; SECTOR_SIZE as usize];
        image.read_at(0, &mut raw)?;
        let sector = Mbr::read_from_bytes(&raw).map_err(|_| PartError::BadSignature)?;

        if sector.boot_signature.get() != MBR_SIGNATURE {
            return Ok(None);
        }

        let has_protective = sector.entries.iter().any(MbrEntry::is_protective);

        let partitions = if image.len() > SECTOR_SIZE {
            vec![Extent::new(SECTOR_SIZE, image.len() - SECTOR_SIZE)?]
        } else {
            Vec::new()
        };

        Ok(Some(Self {
            sector,
            partitions,
            has_protective,
        }))
    }

    /// Whether any entry carries the GPT-protective type byte.
    #[inline]
    pub fn has_gpt(&self) -> bool {
        self.has_protective
    }

    /// Sector-aligned extents the copy plan must cover.
    pub fn partitions(&self) -> &[Extent] {
        &self.partitions
    }

    /// Rewrites the boot sector sized to `dest_len` bytes.
    ///
    /// Protective entries are stretched to cover the whole destination,
    /// saturating at the 32-bit sector-count field. Every other byte of the
    /// source sector is written back unchanged.
    pub fn write_table<IO: BlockIO + ?Sized>(&self, io: &mut IO, dest_len: u64) -> PartResult {
        let mut sector = self.sector;
        let last_lba = (dest_len / SECTOR_SIZE)
            .checked_sub(1)
            .ok_or(PartError::DestinationTooSmall(dest_len))?;
        for entry in sector.entries.iter_mut().filter(|e| e.is_protective()) {
            let sectors = last_lba.saturating_sub(entry.first_lba.get() as u64);
            entry.num_sectors = U32::new(sectors.min(u32::MAX as u64) as u32);
        }
        io.write_struct(0, &sector)?;
        io.flush()?;
        Ok(())
    }
}
