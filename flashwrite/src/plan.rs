// SPDX-License-Identifier: MIT

//! Copy plan construction.
//!
//! The plan is the ordered list of sector-aligned extents that actually get
//! transferred. Sectors outside every partition extent are skipped on the
//! assumption that the destination was zeroed by the clean step; if a
//! platform's clean does not zero, stale bytes may survive in skipped
//! regions. That trade-off is accepted, not hidden.

use flashimg::{Extent, ImgResult, SECTOR_SIZE};

/// Largest single transfer, and therefore the scratch buffer size.
pub const MAX_CHUNK_BYTES: u64 = 1 << 20;
pub const MAX_CHUNK_SECTORS: u64 = MAX_CHUNK_BYTES / SECTOR_SIZE;

/// Dense bit-per-sector coverage map.
pub struct SectorBitmap {
    words: Vec<u64>,
    len: u64,
}

impl SectorBitmap {
    pub fn empty(len: u64) -> Self {
        Self {
            words: vec![0; len.div_ceil(64) as usize],
            len,
        }
    }

    /// All sectors covered. Trailing bits past `len` are set too; callers
    /// never index beyond `len`.
    pub fn full(len: u64) -> Self {
        Self {
            words: vec![u64::MAX; len.div_ceil(64) as usize],
            len,
        }
    }

    /// Marks the sectors covered by `extents`, clipped to the map length.
    pub fn from_extents(len: u64, extents: &[Extent]) -> Self {
        let mut map = Self::empty(len);
        for extent in extents {
            let first = extent.offset() / SECTOR_SIZE;
            let last = extent.end().div_ceil(SECTOR_SIZE).min(len);
            for lba in first..last {
                map.set(lba);
            }
        }
        map
    }

    #[inline]
    pub fn get(&self, lba: u64) -> bool {
        self.words[(lba / 64) as usize] & (1 << (lba % 64)) != 0
    }

    #[inline]
    pub fn set(&mut self, lba: u64) {
        debug_assert!(lba < self.len);
        self.words[(lba / 64) as usize] |= 1 << (lba % 64);
    }

    /// Intersects in place. Both maps must cover the same sector count.
    pub fn and(&mut self, other: &SectorBitmap) {
        debug_assert_eq!(self.len, other.len);
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w &= o;
        }
    }
}

/// Builds the copy plan for an image of `image_len` bytes.
///
/// Coverage starts dense (every sector) and is intersected with the
/// partition extents. Sparse image regions inside a partition stay covered:
/// they read as zeros and those zeros are written out, so a dirty
/// destination cannot leak stale bytes into partitioned space. Consecutive
/// covered sectors coalesce into runs, split so no extent exceeds
/// [`MAX_CHUNK_BYTES`]. `image_len` must be a sector multiple; the writer
/// validates that before planning.
pub fn build_copy_plan(image_len: u64, partitions: &[Extent]) -> ImgResult<Vec<Extent>> {
    let sectors = image_len / SECTOR_SIZE;
    let mut coverage = SectorBitmap::full(sectors);
    coverage.and(&SectorBitmap::from_extents(sectors, partitions));

    let mut plan = Vec::new();
    let mut start: Option<u64> = None;
    for lba in 0..sectors {
        if let Some(s) = start
            && lba - s >= MAX_CHUNK_SECTORS
        {
            plan.push(run_extent(s, lba)?);
            start = None;
        }
        if coverage.get(lba) {
            if start.is_none() {
                start = Some(lba);
            }
        } else if let Some(s) = start.take() {
            plan.push(run_extent(s, lba)?);
        }
    }
    if let Some(s) = start {
        // Final run reaches the image end by construction.
        let offset = s * SECTOR_SIZE;
        plan.push(Extent::new(offset, image_len - offset)?);
    }
    Ok(plan)
}

fn run_extent(start_lba: u64, end_lba: u64) -> ImgResult<Extent> {
    Extent::new(start_lba * SECTOR_SIZE, (end_lba - start_lba) * SECTOR_SIZE)
}
