// SPDX-License-Identifier: MIT

use crate::{ImageError, ImgResult};

/// A contiguous byte range `(offset, length)`.
///
/// Raw byte ranges everywhere; sector-aligned by convention when part of a
/// file map or a copy plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    offset: u64,
    length: u64,
}

impl Extent {
    /// Creates an extent; fails when `length == 0`.
    #[inline]
    pub fn new(offset: u64, length: u64) -> ImgResult<Self> {
        if length == 0 {
            return Err(ImageError::EmptyExtent);
        }
        offset.checked_add(length).ok_or(ImageError::OffsetOverflow)?;
        Ok(Self { offset, length })
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Exclusive end offset.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}
