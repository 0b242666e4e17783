// SPDX-License-Identifier: MIT

//! The imaging state machine.
//!
//! `Validating -> Cleaning -> Copying -> RewritingTable -> Flushing ->
//! Ejected`, strictly forward. Any failure aborts in place: there is no
//! retry and no rollback, and an aborted run leaves the destination in an
//! indeterminate partially-written state.

use flashimg::{DiskImage, SECTOR_SIZE};
use flashio::{BlockIO, FileBlockIO};
use flashpart::PartitionTable;
use thiserror::Error;

use crate::disk::Disk;
use crate::plan::build_copy_plan;
use crate::progress::ProgressSink;

/// Error type for the imaging operation. Every variant is fatal.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("image of {image_len} bytes exceeds the device capacity of {capacity}")]
    ImageTooLarge { image_len: u64, capacity: u64 },

    #[error("device capacity {capacity} is not a multiple of the sector size")]
    BadGeometry { capacity: u64 },

    #[error(
        "no partition table found in the image; \
         a general-purpose imaging tool fits non-partitioned images better"
    )]
    PartitionInfoMissing,

    #[error(
        "partition table found but image length {image_len} is not a sector \
         multiple; the source file may have been truncated in transit"
    )]
    TruncatedImage { image_len: u64 },

    #[error("cannot open the device for writing (busy, or missing permissions)")]
    DeviceOpenFailed(#[source] std::io::Error),

    #[error(transparent)]
    Image(#[from] flashimg::ImageError),

    #[error(transparent)]
    Table(#[from] flashpart::PartError),

    #[error(transparent)]
    Io(#[from] flashio::IoError),
}

pub type WriteResult<T = ()> = Result<T, WriteError>;

/// Images `image` onto `disk`, reporting percentages into `progress`.
///
/// The partition table is not copied verbatim: after the data extents land,
/// the matched codec writes a fresh table sized to the device's real
/// capacity, so a 2 GiB image on an 8 GiB stick still gets its backup GPT in
/// the last sectors of the stick.
pub fn write_image_to_disk<D, P>(
    disk: &mut D,
    image: &DiskImage,
    progress: &mut P,
) -> WriteResult
where
    D: Disk + ?Sized,
    P: ProgressSink + ?Sized,
{
    // Validating
    let image_len = image.len();
    let capacity = disk.capacity();
    if image_len > capacity {
        return Err(WriteError::ImageTooLarge {
            image_len,
            capacity,
        });
    }
    if !capacity.is_multiple_of(SECTOR_SIZE) {
        return Err(WriteError::BadGeometry { capacity });
    }

    let table = PartitionTable::detect(image)?;
    if !image_len.is_multiple_of(SECTOR_SIZE) {
        return Err(match table {
            Some(_) => WriteError::TruncatedImage { image_len },
            None => WriteError::PartitionInfoMissing,
        });
    }
    let Some(table) = table else {
        return Err(WriteError::PartitionInfoMissing);
    };
    crate::log_verbose!("detected {} partition table", table.scheme_name());

    let plan = build_copy_plan(image_len, table.partitions())?;
    crate::log_verbose!("copy plan has {} extents", plan.len());

    // Cleaning
    disk.clean().map_err(flashio::IoError::from)?;

    // Copying
    let mut dev =
        FileBlockIO::open_rw(disk.device_path()).map_err(WriteError::DeviceOpenFailed)?;

    let scratch_len = plan.iter().map(|e| e.length()).max().unwrap_or(0);
    let mut scratch = vec![0u8; scratch_len as usize];
    for (i, extent) in plan.iter().enumerate() {
        let buf = &mut scratch[..extent.length() as usize];
        image.read_at(extent.offset(), buf)?;
        dev.write_at(extent.offset(), buf)?;
        progress.report((i as u64 * 100 / plan.len() as u64) as u8);
    }

    // RewritingTable
    table.write_table(&mut dev, capacity)?;

    // Flushing
    dev.flush()?;
    dev.sync_to_media()?;
    drop(dev);

    // The loop above tops out below 100; the final report is unconditional.
    progress.report(100);

    // Ejected
    disk.eject();
    Ok(())
}
