// SPDX-License-Identifier: MIT

//! Property tests comparing image reads against a flat reference buffer.

use proptest::prelude::*;

use crate::image::BlockMapImage;
use crate::testutil::flat_from_bytes;
use crate::{DiskImage, SECTOR_SIZE};

const BLOCK_SIZE: u64 = SECTOR_SIZE;
const MAX_BLOCKS: usize = 16;

/// A block table plus the fully materialized bytes it should read as.
fn block_map_strategy() -> impl Strategy<Value = (Vec<Option<Vec<u8>>>, u64)> {
    let block = proptest::option::of(proptest::collection::vec(
        any::<u8>(),
        BLOCK_SIZE as usize..=BLOCK_SIZE as usize,
    ));
    (
        proptest::collection::vec(block, 1..=MAX_BLOCKS),
        1u64..=BLOCK_SIZE,
    )
        .prop_map(|(blocks, tail)| {
            // Clip the logical length into the last block so partial final
            // blocks get exercised too.
            let len = (blocks.len() as u64 - 1) * BLOCK_SIZE + tail;
            (blocks, len)
        })
}

fn build_fixture(blocks: &[Option<Vec<u8>>], len: u64) -> (DiskImage, Vec<u8>) {
    // Pack the present blocks back to back into the base image and record
    // each one's offset in the table.
    let mut base_bytes = Vec::new();
    let mut table = Vec::with_capacity(blocks.len());
    let mut reference = Vec::with_capacity(blocks.len() * BLOCK_SIZE as usize);
    for block in blocks {
        match block {
            None => {
                table.push(None);
                reference.extend_from_slice(&[0u8; BLOCK_SIZE as usize]);
            }
            Some(data) => {
                table.push(Some(base_bytes.len() as u64));
                base_bytes.extend_from_slice(data);
                reference.extend_from_slice(data);
            }
        }
    }
    if base_bytes.is_empty() {
        // FlatImage rejects empty files; an all-absent table never reads the
        // base anyway.
        base_bytes.push(0);
    }
    reference.truncate(len as usize);

    let base = flat_from_bytes(&base_bytes);
    let img =
        DiskImage::BlockMap(BlockMapImage::new(base, BLOCK_SIZE, table, len).unwrap());
    (img, reference)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_block_map_reads_match_reference(
        (blocks, len) in block_map_strategy(),
        reads in proptest::collection::vec((any::<u64>(), 1usize..=1024), 1..24),
    ) {
        let (img, reference) = build_fixture(&blocks, len);
        prop_assert_eq!(img.len(), len);

        for (raw_offset, raw_len) in reads {
            let offset = raw_offset % len;
            let take = raw_len.min((len - offset) as usize);
            let mut buf = vec![0u8; take];
            img.read_at(offset, &mut buf).unwrap();
            prop_assert_eq!(
                &buf[..],
                &reference[offset as usize..offset as usize + take]
            );
        }
    }

    #[test]
    fn prop_file_map_covers_exactly_the_nonzero_bytes(
        (blocks, tail) in block_map_strategy(),
    ) {
        // Sector-align the length so file_map is defined.
        let _ = tail;
        let len = blocks.len() as u64 * BLOCK_SIZE;
        let (img, reference) = build_fixture(&blocks, len);

        let map = img.file_map().unwrap();
        let mut covered = vec![false; len as usize];
        for extent in &map {
            prop_assert_eq!(extent.offset() % SECTOR_SIZE, 0);
            prop_assert_eq!(extent.length() % SECTOR_SIZE, 0);
            for i in extent.offset()..extent.end() {
                covered[i as usize] = true;
            }
        }
        for (i, &byte) in reference.iter().enumerate() {
            if byte != 0 {
                prop_assert!(covered[i], "nonzero byte at {} not covered", i);
            }
        }
    }
}
