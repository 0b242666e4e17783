// SPDX-License-Identifier: MIT

//! GUID Partition Table parsing, validation and destination-sized rewriting.
//!
//! Parsing is strict: a disk that advertises a GPT through its protective MBR
//! but fails any consistency check is rejected outright instead of falling
//! back to the MBR view. Rewriting recomputes the whole geometry for the
//! destination capacity, so an image written to a larger disk ends up with
//! its backup structures at the real end of that disk.

use flashimg::{DiskImage, Extent, SECTOR_SIZE};
use flashio::{BlockIO, BlockIOLbaExt};
use uuid::Uuid;
use zerocopy::byteorder::{LittleEndian, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::mbr::MbrInfo;
use crate::{PartError, PartResult};

pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
pub const GPT_REVISION: u32 = 0x0001_0000;
pub const GPT_HEADER_SIZE: u32 = 92;
pub const GPT_ENTRY_SIZE: u64 = 128;

const PRIMARY_HEADER_LBA: u64 = 1;
const PRIMARY_ENTRIES_LBA: u64 = 2;

// Minimum byte size of each entries area per the UEFI spec.
const MIN_ENTRIES_AREA: u64 = 16384;

const MAX_ENTRIES: u32 = 16384;

#[inline]
fn align_up(v: u64, a: u64) -> u64 {
    v.div_ceil(a) * a
}

#[inline]
fn align_down(v: u64, a: u64) -> u64 {
    v - (v % a)
}

/// The 92-byte GPT header. Serialized into a zero-padded sector on disk.
#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
pub struct GptHeader {
    pub signature: [u8; 8],
    pub revision: U32<LittleEndian>,
    pub header_size: U32<LittleEndian>,
    pub header_crc: U32<LittleEndian>,
    pub reserved: U32<LittleEndian>,
    pub current_lba: U64<LittleEndian>,
    pub backup_lba: U64<LittleEndian>,
    pub first_usable_lba: U64<LittleEndian>,
    pub last_usable_lba: U64<LittleEndian>,
    pub disk_guid: [u8; 16],
    pub entries_lba: U64<LittleEndian>,
    pub num_entries: U32<LittleEndian>,
    pub entry_size: U32<LittleEndian>,
    pub entries_crc: U32<LittleEndian>,
}

/// One 128-byte partition entry. The name is raw UTF-16LE code units.
#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
pub struct GptEntry {
    pub type_guid: [u8; 16],
    pub unique_guid: [u8; 16],
    pub first_lba: U64<LittleEndian>,
    pub last_lba: U64<LittleEndian>,
    pub attributes: U64<LittleEndian>,
    pub name: [u8; 72],
}

impl GptEntry {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.type_guid == [0u8; 16]
    }

    /// Decoded partition name, truncated at the first NUL.
    pub fn name(&self) -> String {
        let units: Vec<u16> = self
            .name
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        String::from_utf16_lossy(&units)
    }
}

/// CRC32 of the header with its own CRC field zeroed.
fn header_crc(header: &GptHeader) -> u32 {
    let mut tmp = *header;
    tmp.header_crc = U32::new(0);
    crc32fast::hash(tmp.as_bytes())
}

/// A validated GPT, with the protective MBR it sits behind.
#[derive(Clone)]
pub struct GptInfo {
    protective: MbrInfo,
    header: GptHeader,
    entries: Vec<GptEntry>,
    partitions: Vec<Extent>,
}

impl GptInfo {
    /// Parses and fully validates the GPT of `image`.
    ///
    /// Returns `Ok(None)` only when the disk carries no protective MBR at
    /// all. Once the protective entry is seen, every further inconsistency
    /// is a hard error: a half-valid GPT must never be silently treated as a
    /// plain MBR disk.
    pub fn try_parse(image: &DiskImage) -> PartResult<Option<Self>> {
        let Some(protective) = MbrInfo::try_parse(image)? else {
            return Ok(None);
        };
        if !protective.has_gpt() {
            return Ok(None);
        }

        let len = image.len();
        let primary = load_header(image, SECTOR_SIZE)?;
        let backup = load_header(image, len - SECTOR_SIZE)?;

        // The two headers must point at each other.
        if primary.backup_lba.get() != len / SECTOR_SIZE - 1 {
            return Err(PartError::BackupMismatch("the backup header location"));
        }
        if backup.backup_lba.get() != PRIMARY_HEADER_LBA {
            return Err(PartError::BackupMismatch("the primary header location"));
        }
        if primary.num_entries.get() != backup.num_entries.get() {
            return Err(PartError::BackupMismatch("the partition entry count"));
        }
        if primary.first_usable_lba.get() != backup.first_usable_lba.get()
            || primary.last_usable_lba.get() != backup.last_usable_lba.get()
        {
            return Err(PartError::BackupMismatch("the usable lba range"));
        }
        if primary.disk_guid != backup.disk_guid {
            return Err(PartError::BackupMismatch("the disk guid"));
        }

        // Both entries areas must have their minimum reservation: two extra
        // sectors in front for the protective MBR and primary header, one at
        // the back for the backup header.
        let min_entry_lbas = align_up(MIN_ENTRIES_AREA, SECTOR_SIZE) / SECTOR_SIZE;
        if primary.first_usable_lba.get() < min_entry_lbas + 2 {
            return Err(PartError::InsufficientEntrySpace("primary"));
        }
        let backup_reserve = len
            .checked_sub(MIN_ENTRIES_AREA + SECTOR_SIZE)
            .ok_or(PartError::InsufficientEntrySpace("backup"))?;
        if primary.last_usable_lba.get() >= align_down(backup_reserve, SECTOR_SIZE) / SECTOR_SIZE {
            return Err(PartError::InsufficientEntrySpace("backup"));
        }

        let num_entries = primary.num_entries.get();
        if num_entries == 0 || num_entries > MAX_ENTRIES {
            return Err(PartError::BadEntryCount(num_entries));
        }

        let mut raw = vec![0u8; num_entries as usize * GPT_ENTRY_SIZE as usize];
        let entries_loc = primary
            .entries_lba
            .get()
            .checked_mul(SECTOR_SIZE)
            .ok_or(PartError::EntryOutOfBounds)?;
        image.read_at(entries_loc, &mut raw)?;
        let computed = crc32fast::hash(&raw);
        if computed != primary.entries_crc.get() {
            return Err(PartError::EntriesCrcMismatch {
                stored: primary.entries_crc.get(),
                computed,
            });
        }

        let mut entries = Vec::new();
        for slot in raw.chunks_exact(GPT_ENTRY_SIZE as usize) {
            let entry =
                GptEntry::read_from_bytes(slot).map_err(|_| PartError::EntryOutOfBounds)?;
            if entry.is_empty() {
                continue;
            }
            let (first, last) = (entry.first_lba.get(), entry.last_lba.get());
            if last < first
                || first < primary.first_usable_lba.get()
                || last > primary.last_usable_lba.get()
            {
                return Err(PartError::EntryOutOfBounds);
            }
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.first_lba.get());

        let partitions = entries
            .iter()
            .map(|e| {
                Extent::new(
                    e.first_lba.get() * SECTOR_SIZE,
                    (e.last_lba.get() - e.first_lba.get() + 1) * SECTOR_SIZE,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Self {
            protective,
            header: primary,
            entries,
            partitions,
        }))
    }

    /// The validated primary header.
    pub fn header(&self) -> &GptHeader {
        &self.header
    }

    /// Non-empty entries, sorted by first LBA.
    pub fn entries(&self) -> &[GptEntry] {
        &self.entries
    }

    /// Sector-aligned extents the copy plan must cover, one per entry.
    pub fn partitions(&self) -> &[Extent] {
        &self.partitions
    }

    /// Writes a fresh pair of GPT copies sized to `dest_len` bytes.
    ///
    /// The backup entries and header are committed and flushed before any
    /// primary structure is touched, so an interruption mid-write leaves a
    /// recoverable backup on the destination. A new disk GUID is generated:
    /// the destination is a distinct disk and must not impersonate the
    /// source. Finishes by rewriting the protective MBR for the same length.
    pub fn write_table<IO: BlockIO + ?Sized>(&self, io: &mut IO, dest_len: u64) -> PartResult {
        let entries_len = align_up(
            MIN_ENTRIES_AREA.max(self.entries.len() as u64 * GPT_ENTRY_SIZE),
            SECTOR_SIZE,
        );

        let mut raw = vec![0u8; entries_len as usize];
        for (slot, entry) in raw
            .chunks_exact_mut(GPT_ENTRY_SIZE as usize)
            .zip(&self.entries)
        {
            slot.copy_from_slice(entry.as_bytes());
        }
        let entries_crc = crc32fast::hash(&raw);

        let backup_loc = dest_len
            .checked_sub(SECTOR_SIZE)
            .ok_or(PartError::DestinationTooSmall(dest_len))?;
        let backup_lba = backup_loc / SECTOR_SIZE;
        let backup_entries_loc = backup_loc
            .checked_sub(entries_len)
            .ok_or(PartError::DestinationTooSmall(dest_len))?;
        let backup_entries_lba = backup_entries_loc / SECTOR_SIZE;

        let first_usable_lba =
            (PRIMARY_ENTRIES_LBA * SECTOR_SIZE + entries_len) / SECTOR_SIZE;
        let last_usable_lba = backup_entries_lba
            .checked_sub(1)
            .filter(|&last| last >= first_usable_lba)
            .ok_or(PartError::DestinationTooSmall(dest_len))?;

        let disk_guid = *Uuid::new_v4().as_bytes();
        let num_entries = (entries_len / GPT_ENTRY_SIZE) as u32;

        let make_header = |current_lba: u64, other_lba: u64, entries_lba: u64| {
            let mut header = GptHeader {
                signature: *GPT_SIGNATURE,
                revision: U32::new(GPT_REVISION),
                header_size: U32::new(GPT_HEADER_SIZE),
                header_crc: U32::new(0),
                reserved: U32::new(0),
                current_lba: U64::new(current_lba),
                backup_lba: U64::new(other_lba),
                first_usable_lba: U64::new(first_usable_lba),
                last_usable_lba: U64::new(last_usable_lba),
                disk_guid,
                entries_lba: U64::new(entries_lba),
                num_entries: U32::new(num_entries),
                entry_size: U32::new(GPT_ENTRY_SIZE as u32),
                entries_crc: U32::new(entries_crc),
            };
            header.header_crc = U32::new(header_crc(&header));
            header_sector(&header)
        };

        let backup_sector = make_header(backup_lba, PRIMARY_HEADER_LBA, backup_entries_lba);
        let primary_sector = make_header(PRIMARY_HEADER_LBA, backup_lba, PRIMARY_ENTRIES_LBA);

        // Backup copy first, fully flushed, then the primary.
        io.write_at(backup_entries_loc, &raw)?;
        io.write_at(backup_loc, &backup_sector)?;
        io.flush()?;
        io.write_at_lba(PRIMARY_ENTRIES_LBA, SECTOR_SIZE, &raw)?;
        io.flush()?;
        io.write_at_lba(PRIMARY_HEADER_LBA, SECTOR_SIZE, &primary_sector)?;
        io.flush()?;

        self.protective.write_table(io, dest_len)
    }
}

fn header_sector(header: &GptHeader) -> [u8; SECTOR_SIZE as usize] {
    let mut sector = [0u8; SECTOR_SIZE as usize];
    sector[..GPT_HEADER_SIZE as usize].copy_from_slice(header.as_bytes());
    sector
}

/// Reads and validates one header in isolation.
fn load_header(image: &DiskImage, offset: u64) -> PartResult<GptHeader> {
    let mut raw = [0u8; GPT_HEADER_SIZE as usize];
    image.read_at(offset, &mut raw)?;
    let header = GptHeader::read_from_bytes(&raw).map_err(|_| PartError::BadSignature)?;

    if &header.signature != GPT_SIGNATURE {
        return Err(PartError::BadSignature);
    }
    if header.revision.get() != GPT_REVISION {
        return Err(PartError::BadRevision(header.revision.get()));
    }
    if header.header_size.get() < GPT_HEADER_SIZE {
        return Err(PartError::BadHeaderSize(header.header_size.get()));
    }
    if header.current_lba.get() != offset / SECTOR_SIZE {
        return Err(PartError::MisplacedHeader {
            claimed: header.current_lba.get(),
            found: offset / SECTOR_SIZE,
        });
    }
    if header.first_usable_lba.get() > header.last_usable_lba.get() {
        return Err(PartError::InvertedUsableRange);
    }
    let computed = header_crc(&header);
    if computed != header.header_crc.get() {
        return Err(PartError::HeaderCrcMismatch {
            stored: header.header_crc.get(),
            computed,
        });
    }
    if header.entry_size.get() as u64 != GPT_ENTRY_SIZE {
        return Err(PartError::BadEntrySize(header.entry_size.get()));
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{flat_from_bytes, mbr_sector};
    use flashio::MemBlockIO;

    const ENTRIES_LBAS: u64 = MIN_ENTRIES_AREA / SECTOR_SIZE; // 32

    /// Builds a fully valid GPT disk with a 16 KiB entries area per copy.
    fn gpt_disk(total_len: u64, parts: &[(u64, u64)]) -> Vec<u8> {
        let total_sectors = total_len / SECTOR_SIZE;
        let backup_entries_lba = total_sectors - 1 - ENTRIES_LBAS;
        let first_usable = 2 + ENTRIES_LBAS;
        let last_usable = backup_entries_lba - 1;

        let mut raw = vec![0u8; MIN_ENTRIES_AREA as usize];
        for (i, &(first, last)) in parts.iter().enumerate() {
            let entry = GptEntry {
                type_guid: [0x11; 16],
                unique_guid: [i as u8 + 1; 16],
                first_lba: U64::new(first),
                last_lba: U64::new(last),
                attributes: U64::new(0),
                name: [0; 72],
            };
            raw[i * 128..(i + 1) * 128].copy_from_slice(entry.as_bytes());
        }
        let entries_crc = crc32fast::hash(&raw);

        let make = |current: u64, other: u64, entries_lba: u64| {
            let mut header = GptHeader {
                signature: *GPT_SIGNATURE,
                revision: U32::new(GPT_REVISION),
                header_size: U32::new(GPT_HEADER_SIZE),
                header_crc: U32::new(0),
                reserved: U32::new(0),
                current_lba: U64::new(current),
                backup_lba: U64::new(other),
                first_usable_lba: U64::new(first_usable),
                last_usable_lba: U64::new(last_usable),
                disk_guid: [0x5A; 16],
                entries_lba: U64::new(entries_lba),
                num_entries: U32::new((MIN_ENTRIES_AREA / GPT_ENTRY_SIZE) as u32),
                entry_size: U32::new(GPT_ENTRY_SIZE as u32),
                entries_crc: U32::new(entries_crc),
            };
            header.header_crc = U32::new(header_crc(&header));
            header_sector(&header)
        };

        let mut disk = vec![0u8; total_len as usize];
        disk[..512].copy_from_slice(&mbr_sector(&[(0xEE, 1, 0xFFFF)]));
        disk[512..1024].copy_from_slice(&make(1, total_sectors - 1, 2));
        disk[1024..1024 + raw.len()].copy_from_slice(&raw);

        let bel = (backup_entries_lba * SECTOR_SIZE) as usize;
        disk[bel..bel + raw.len()].copy_from_slice(&raw);
        let bl = ((total_sectors - 1) * SECTOR_SIZE) as usize;
        disk[bl..bl + 512].copy_from_slice(&make(total_sectors - 1, 1, backup_entries_lba));
        disk
    }

    #[test]
    fn struct_sizes_match_on_disk_layout() {
        assert_eq!(core::mem::size_of::<GptHeader>(), 92);
        assert_eq!(core::mem::size_of::<GptEntry>(), 128);
    }

    #[test]
    fn parse_valid_disk_sorts_partitions() {
        // 8 MiB disk, two entries deliberately out of order.
        let disk = gpt_disk(8 << 20, &[(2048, 4095), (40, 1063)]);
        let info = GptInfo::try_parse(&flat_from_bytes(&disk)).unwrap().unwrap();

        assert_eq!(info.entries().len(), 2);
        assert_eq!(info.entries()[0].first_lba.get(), 40);
        assert_eq!(
            info.partitions(),
            &[
                Extent::new(40 * 512, 1024 * 512).unwrap(),
                Extent::new(2048 * 512, 2048 * 512).unwrap(),
            ]
        );
    }

    #[test]
    fn no_protective_entry_means_no_gpt() {
        let mut disk = gpt_disk(8 << 20, &[(2048, 4095)]);
        // Same valid GPT structures, but an MBR without the 0xEE entry.
        disk[..512].copy_from_slice(&mbr_sector(&[(0x07, 1, 0xFFFF)]));
        assert!(GptInfo::try_parse(&flat_from_bytes(&disk)).unwrap().is_none());
    }

    #[test]
    fn header_corruption_fails_crc() {
        let mut disk = gpt_disk(8 << 20, &[(2048, 4095)]);
        disk[512 + 56] ^= 1; // disk_guid byte of the primary header
        assert!(matches!(
            GptInfo::try_parse(&flat_from_bytes(&disk)),
            Err(PartError::HeaderCrcMismatch { .. })
        ));
    }

    #[test]
    fn entries_corruption_fails_crc() {
        let mut disk = gpt_disk(8 << 20, &[(2048, 4095)]);
        disk[1024 + 40] ^= 1; // first_lba byte of the first primary entry
        assert!(matches!(
            GptInfo::try_parse(&flat_from_bytes(&disk)),
            Err(PartError::EntriesCrcMismatch { .. })
        ));
    }

    #[test]
    fn backup_disagreement_is_fatal() {
        let mut disk = gpt_disk(8 << 20, &[(2048, 4095)]);
        // Re-seal the backup header with a different disk GUID so both CRCs
        // pass but the cross-check fails.
        let bl = disk.len() - 512;
        let mut backup = GptHeader::read_from_bytes(&disk[bl..bl + 92]).unwrap();
        backup.disk_guid = [0xA7; 16];
        backup.header_crc = U32::new(header_crc(&backup));
        disk[bl..bl + 92].copy_from_slice(backup.as_bytes());

        assert!(matches!(
            GptInfo::try_parse(&flat_from_bytes(&disk)),
            Err(PartError::BackupMismatch("the disk guid"))
        ));
    }

    #[test]
    fn entry_outside_usable_range_is_fatal() {
        let total_sectors = (8 << 20) / 512u64;
        // last_lba collides with the backup entries area.
        let disk = gpt_disk(8 << 20, &[(2048, total_sectors - 2)]);
        assert!(matches!(
            GptInfo::try_parse(&flat_from_bytes(&disk)),
            Err(PartError::EntryOutOfBounds)
        ));
    }

    #[test]
    fn write_table_relocates_backup_to_destination_end() {
        let src_len = 8u64 << 20;
        let dest_len = 16u64 << 20;
        let disk = gpt_disk(src_len, &[(2048, 4095)]);
        let info = GptInfo::try_parse(&flat_from_bytes(&disk)).unwrap().unwrap();

        let mut dest = vec![0u8; dest_len as usize];
        {
            let mut io = MemBlockIO::new(&mut dest);
            info.write_table(&mut io, dest_len).unwrap();
        }

        let reparsed = GptInfo::try_parse(&flat_from_bytes(&dest)).unwrap().unwrap();
        assert_eq!(reparsed.entries(), info.entries());
        assert_eq!(
            reparsed.header().backup_lba.get(),
            dest_len / SECTOR_SIZE - 1
        );
        assert!(
            reparsed.header().last_usable_lba.get() > info.header().last_usable_lba.get()
        );
        // The destination is a new disk, not a clone of the source identity.
        assert_ne!(reparsed.header().disk_guid, info.header().disk_guid);

        // The backup header really sits in the last sector.
        let bl = dest.len() - 512;
        let backup = GptHeader::read_from_bytes(&dest[bl..bl + 92]).unwrap();
        assert_eq!(backup.current_lba.get(), dest_len / SECTOR_SIZE - 1);

        // And the protective MBR was stretched to the new capacity.
        let first_lba = u32::from_le_bytes(dest[446 + 8..446 + 12].try_into().unwrap());
        let sectors = u32::from_le_bytes(dest[446 + 12..446 + 16].try_into().unwrap());
        assert_eq!(first_lba, 1);
        assert_eq!(sectors as u64, dest_len / 512 - 2);
    }

    #[test]
    fn write_table_rejects_tiny_destination() {
        let disk = gpt_disk(8 << 20, &[(2048, 4095)]);
        let info = GptInfo::try_parse(&flat_from_bytes(&disk)).unwrap().unwrap();

        let mut dest = vec![0u8; 4096];
        let mut io = MemBlockIO::new(&mut dest);
        assert!(matches!(
            info.write_table(&mut io, 4096),
            Err(PartError::DestinationTooSmall(4096))
        ));
    }
}
