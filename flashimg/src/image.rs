// SPDX-License-Identifier: MIT

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::{Extent, ImageError, ImgResult, SECTOR_SIZE};

/// Bounds check shared by every image variant.
///
/// Zero-length reads are rejected on purpose: every caller in the imaging
/// pipeline reads a concrete number of bytes, so an empty read is a logic
/// error upstream.
#[inline]
fn check_range(offset: u64, len: usize, image_len: u64) -> ImgResult {
    let end = offset
        .checked_add(len as u64)
        .ok_or(ImageError::OffsetOverflow)?;
    if len == 0 || end > image_len {
        return Err(ImageError::OutOfRange {
            offset,
            len: len as u64,
            image_len,
        });
    }
    Ok(())
}

/// A read-only, byte-addressed disk image.
///
/// Closed union: the set of containers is fixed, and every call site is
/// expected to match exhaustively when it cares about the variant.
#[derive(Debug)]
pub enum DiskImage {
    Flat(FlatImage),
    Offset(OffsetImage),
    BlockMap(BlockMapImage),
}

impl DiskImage {
    /// Total length of the image in bytes.
    pub fn len(&self) -> u64 {
        match self {
            DiskImage::Flat(img) => img.len(),
            DiskImage::Offset(img) => img.size,
            DiskImage::BlockMap(img) => img.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `buf.len()` bytes starting at `offset`.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> ImgResult {
        check_range(offset, buf.len(), self.len())?;
        match self {
            DiskImage::Flat(img) => img.read_unchecked(offset, buf),
            DiskImage::Offset(img) => img.base.read_at(img.offset + offset, buf),
            DiskImage::BlockMap(img) => img.read_unchecked(offset, buf),
        }
    }

    /// Sector-aligned extents of the image that contain meaningful data.
    ///
    /// Everything outside the returned extents reads as zeros.
    pub fn file_map(&self) -> ImgResult<Vec<Extent>> {
        match self {
            DiskImage::BlockMap(img) => img.file_map(),
            _ => {
                let len = self.len();
                if !len.is_multiple_of(SECTOR_SIZE) {
                    return Err(ImageError::UnalignedLength(len));
                }
                Ok(vec![Extent::new(0, len)?])
            }
        }
    }

    /// Wraps the image in a window `[offset, offset + size)`.
    ///
    /// A window over a window collapses into a single level by composing
    /// offsets, so read dispatch depth stays bounded no matter how a
    /// container format stacks its views.
    pub fn with_offset(self, offset: u64, size: u64) -> ImgResult<DiskImage> {
        let (base, offset) = match self {
            DiskImage::Offset(view) => (
                view.base,
                view.offset
                    .checked_add(offset)
                    .ok_or(ImageError::OffsetOverflow)?,
            ),
            other => (Box::new(other), offset),
        };
        let end = offset
            .checked_add(size)
            .ok_or(ImageError::OffsetOverflow)?;
        if end > base.len() {
            return Err(ImageError::OutOfRange {
                offset,
                len: size,
                image_len: base.len(),
            });
        }
        Ok(DiskImage::Offset(OffsetImage { base, offset, size }))
    }
}

/// Raw image backed by a read-only memory map of the whole file.
#[derive(Debug)]
pub struct FlatImage {
    map: Mmap,
    len: u64,
}

impl FlatImage {
    /// Memory-maps `path` read-only.
    pub fn open(path: &Path) -> ImgResult<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        if file_len == 0 {
            return Err(ImageError::CorruptImage("image file is empty"));
        }
        let map = unsafe { Mmap::map(&file)? };
        // Mapping granularity can round the view; trust the smaller of the
        // two lengths.
        let len = file_len.min(map.len() as u64);
        Ok(Self { map, len })
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn read_unchecked(&self, offset: u64, buf: &mut [u8]) -> ImgResult {
        let start = offset as usize;
        buf.copy_from_slice(&self.map[start..start + buf.len()]);
        Ok(())
    }
}

/// A window `[offset, offset + size)` into another image.
#[derive(Debug)]
pub struct OffsetImage {
    pub(crate) base: Box<DiskImage>,
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

/// Block-indirected image: logical blocks map through a table into an
/// underlying image, absent blocks read as zeros.
#[derive(Debug)]
pub struct BlockMapImage {
    base: Box<DiskImage>,
    block_size: u64,
    blocks: Vec<Option<u64>>,
    len: u64,
}

impl BlockMapImage {
    /// Builds a block-indirected image over `base`.
    ///
    /// `blocks[i]` is the byte offset of logical block `i` inside `base`, or
    /// `None` for an absent (all-zero) block. `len` may fall short of
    /// `blocks.len() * block_size` when the final block is partial.
    pub fn new(
        base: DiskImage,
        block_size: u64,
        blocks: Vec<Option<u64>>,
        len: u64,
    ) -> ImgResult<Self> {
        if block_size == 0 {
            return Err(ImageError::CorruptImage("block size is zero"));
        }
        let table_len = (blocks.len() as u64)
            .checked_mul(block_size)
            .ok_or(ImageError::OffsetOverflow)?;
        if len > table_len {
            return Err(ImageError::CorruptImage(
                "image length exceeds the block table coverage",
            ));
        }
        Ok(Self {
            base: Box::new(base),
            block_size,
            blocks,
            len,
        })
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Strided scatter read across the block table.
    fn read_unchecked(&self, offset: u64, buf: &mut [u8]) -> ImgResult {
        let bs = self.block_size;
        let first_block = offset / bs;
        let touched = ((offset + buf.len() as u64).div_ceil(bs) * bs - (offset - offset % bs)) / bs;

        let mut cursor = 0usize;
        let mut off = offset;
        for i in 0..touched {
            let within = off % bs;
            let take = ((bs - within) as usize).min(buf.len() - cursor);
            let dest = &mut buf[cursor..cursor + take];
            match self.blocks[(first_block + i) as usize] {
                None => dest.fill(0),
                Some(block_off) => {
                    let src = block_off
                        .checked_add(within)
                        .ok_or(ImageError::OffsetOverflow)?;
                    self.base.read_at(src, dest)?;
                }
            }
            cursor += take;
            off += take as u64;
        }
        debug_assert_eq!(cursor, buf.len());
        Ok(())
    }

    /// One extent per present block, the final one clipped to `len`.
    ///
    /// Length and block size must both be sector multiples so every extent
    /// stays sector-aligned for the copy planner.
    fn file_map(&self) -> ImgResult<Vec<Extent>> {
        if !self.len.is_multiple_of(SECTOR_SIZE) {
            return Err(ImageError::UnalignedLength(self.len));
        }
        if !self.block_size.is_multiple_of(SECTOR_SIZE) {
            return Err(ImageError::UnalignedBlockSize(self.block_size));
        }

        let mut out = Vec::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if block.is_some() {
                let start = i as u64 * self.block_size;
                let end = (start + self.block_size).min(self.len);
                if end > start {
                    out.push(Extent::new(start, end - start)?);
                }
            }
        }
        Ok(out)
    }
}
