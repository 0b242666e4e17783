// SPDX-License-Identifier: MIT

//! VHD container support.
//!
//! A fixed VHD is the raw disk followed by a 512-byte footer, so it opens as
//! an offset view `[0, current_size)`. A dynamic VHD stores data in
//! fixed-size blocks addressed through a Block Allocation Table, which maps
//! directly onto [`BlockMapImage`]: BAT entry `0xFFFF_FFFF` is an absent
//! block, anything else points at the block's sector bitmap followed by its
//! data.
//!
//! Imaging reads whole blocks, so per-sector bitmaps of present blocks are
//! treated as fully set; sectors a guest never touched read back as whatever
//! the creating tool put there, which for every mainstream tool is zeros.

use std::path::Path;

use zerocopy::byteorder::{BigEndian, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{BlockMapImage, DiskImage, FlatImage, ImageError, ImgResult, SECTOR_SIZE};

const FOOTER_COOKIE: &[u8; 8] = b"conectix";
const DYNAMIC_COOKIE: &[u8; 8] = b"cxsparse";

const DISK_TYPE_FIXED: u32 = 2;
const DISK_TYPE_DYNAMIC: u32 = 3;

// Upper bound on the BAT allocation accepted from an image file.
const MAX_BAT_BYTES: u64 = 128 * 1024 * 1024;

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Clone, Copy)]
pub(crate) struct VhdFooter {
    pub cookie: [u8; 8],
    pub features: U32<BigEndian>,
    pub file_format_ver: U32<BigEndian>,
    pub data_offset: U64<BigEndian>,
    pub timestamp: U32<BigEndian>,
    pub creator_app: [u8; 4],
    pub creator_ver: U32<BigEndian>,
    pub creator_os: [u8; 4],
    pub orig_size: U64<BigEndian>,
    pub curr_size: U64<BigEndian>,
    pub geometry_cyls: [u8; 2],
    pub geometry_heads: u8,
    pub geometry_sects: u8,
    pub disk_type: U32<BigEndian>,
    pub checksum: U32<BigEndian>,
    pub unique_id: [u8; 16],
    pub saved_state: u8,
    pub reserved: [u8; 427],
}

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Clone, Copy)]
pub(crate) struct VhdDynamicHeader {
    pub cookie: [u8; 8],
    pub data_offset: U64<BigEndian>,
    pub table_offset: U64<BigEndian>,
    pub header_version: U32<BigEndian>,
    pub max_table_entries: U32<BigEndian>,
    pub block_size: U32<BigEndian>,
    pub checksum: U32<BigEndian>,
    pub parent_unique_id: [u8; 16],
    pub parent_timestamp: U32<BigEndian>,
    pub reserved: U32<BigEndian>,
    pub parent_unicode_name: [u8; 512],
    pub parent_locators: [u8; 192],
    pub reserved2: [u8; 256],
}

/// Ones' complement of the byte sum with the checksum field zeroed.
pub(crate) fn footer_checksum(footer: &VhdFooter) -> u32 {
    let mut tmp = *footer;
    tmp.checksum = U32::new(0);
    let sum = tmp
        .as_bytes()
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(b as u32));
    !sum
}

#[inline]
fn align_up(v: u64, a: u64) -> u64 {
    v.div_ceil(a) * a
}

/// Opens `path` as a VHD container.
pub fn open(path: &Path) -> ImgResult<DiskImage> {
    open_image(DiskImage::Flat(FlatImage::open(path)?))
}

pub(crate) fn open_image(image: DiskImage) -> ImgResult<DiskImage> {
    let file_len = image.len();
    if file_len < SECTOR_SIZE {
        return Err(ImageError::CorruptImage("vhd file too small"));
    }
    if !file_len.is_multiple_of(SECTOR_SIZE) {
        return Err(ImageError::CorruptImage("vhd file length misaligned"));
    }
    let footer_offset = file_len - SECTOR_SIZE;

    let mut raw = [0u8; SECTOR_SIZE as usize];
    image.read_at(footer_offset, &mut raw)?;
    let footer = VhdFooter::read_from_bytes(&raw)
        .map_err(|_| ImageError::CorruptImage("vhd footer unreadable"))?;

    if &footer.cookie != FOOTER_COOKIE {
        return Err(ImageError::CorruptImage("vhd footer cookie mismatch"));
    }
    if footer_checksum(&footer) != footer.checksum.get() {
        return Err(ImageError::CorruptImage("vhd footer checksum mismatch"));
    }

    let current_size = footer.curr_size.get();
    if current_size == 0 || !current_size.is_multiple_of(SECTOR_SIZE) {
        return Err(ImageError::CorruptImage("vhd current_size invalid"));
    }

    match footer.disk_type.get() {
        DISK_TYPE_FIXED => {
            if file_len < current_size + SECTOR_SIZE {
                return Err(ImageError::CorruptImage("vhd fixed disk truncated"));
            }
            image.with_offset(0, current_size)
        }
        DISK_TYPE_DYNAMIC => open_dynamic(image, &footer, current_size, footer_offset),
        _ => Err(ImageError::Unsupported("vhd disk type")),
    }
}

fn open_dynamic(
    image: DiskImage,
    footer: &VhdFooter,
    current_size: u64,
    footer_offset: u64,
) -> ImgResult<DiskImage> {
    let header_offset = footer.data_offset.get();
    if header_offset == u64::MAX || !header_offset.is_multiple_of(SECTOR_SIZE) {
        return Err(ImageError::CorruptImage("vhd dynamic header offset invalid"));
    }
    let header_end = header_offset
        .checked_add(1024)
        .ok_or(ImageError::OffsetOverflow)?;
    if header_end > footer_offset {
        return Err(ImageError::CorruptImage("vhd dynamic header truncated"));
    }

    let mut raw = [0u8; 1024];
    image.read_at(header_offset, &mut raw)?;
    let header = VhdDynamicHeader::read_from_bytes(&raw)
        .map_err(|_| ImageError::CorruptImage("vhd dynamic header unreadable"))?;

    if &header.cookie != DYNAMIC_COOKIE {
        return Err(ImageError::CorruptImage("vhd dynamic header cookie mismatch"));
    }
    let table_offset = header.table_offset.get();
    let max_table_entries = header.max_table_entries.get() as u64;
    let block_size = header.block_size.get() as u64;

    if !table_offset.is_multiple_of(SECTOR_SIZE) {
        return Err(ImageError::CorruptImage("vhd bat offset misaligned"));
    }
    if max_table_entries == 0 {
        return Err(ImageError::CorruptImage("vhd max_table_entries is zero"));
    }
    if block_size == 0 || !block_size.is_multiple_of(SECTOR_SIZE) {
        return Err(ImageError::CorruptImage("vhd block_size invalid"));
    }

    let required_entries = current_size.div_ceil(block_size);
    if required_entries > max_table_entries {
        return Err(ImageError::CorruptImage("vhd bat too small"));
    }

    // Only the entries covering the advertised virtual size are read; a
    // sparse or truncated BAT tail past that point is irrelevant.
    let bat_bytes = required_entries
        .checked_mul(4)
        .ok_or(ImageError::OffsetOverflow)?;
    if bat_bytes > MAX_BAT_BYTES {
        return Err(ImageError::Unsupported("vhd bat too large"));
    }
    let bat_end = table_offset
        .checked_add(bat_bytes)
        .ok_or(ImageError::OffsetOverflow)?;
    if bat_end > footer_offset {
        return Err(ImageError::CorruptImage("vhd bat truncated"));
    }

    let mut bat_buf = vec![0u8; bat_bytes as usize];
    image.read_at(table_offset, &mut bat_buf)?;

    let sectors_per_block = block_size / SECTOR_SIZE;
    let bitmap_size = align_up(sectors_per_block.div_ceil(8), SECTOR_SIZE);

    let mut blocks = Vec::with_capacity(required_entries as usize);
    for chunk in bat_buf.chunks_exact(4) {
        let entry = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if entry == u32::MAX {
            blocks.push(None);
            continue;
        }
        let block_start = (entry as u64)
            .checked_mul(SECTOR_SIZE)
            .ok_or(ImageError::OffsetOverflow)?;
        let data_start = block_start
            .checked_add(bitmap_size)
            .ok_or(ImageError::OffsetOverflow)?;
        let data_end = data_start
            .checked_add(block_size)
            .ok_or(ImageError::OffsetOverflow)?;
        if data_end > footer_offset {
            return Err(ImageError::CorruptImage("vhd block overlaps footer"));
        }
        blocks.push(Some(data_start));
    }

    Ok(DiskImage::BlockMap(BlockMapImage::new(
        image,
        block_size,
        blocks,
        current_size,
    )?))
}
