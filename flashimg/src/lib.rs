// SPDX-License-Identifier: MIT

//! Random-access disk image abstraction.
//!
//! A [`DiskImage`] is a read-only, byte-addressed view of a disk image file.
//! Three variants cover every supported container:
//!
//! - [`FlatImage`]: a raw image mapped 1:1 from a file (`.img`, `.usb`,
//!   ISO-hybrid `.iso`).
//! - offset view: a window into another image, used for containers that pad
//!   or append metadata around the raw disk bytes.
//! - [`BlockMapImage`]: a block-indirected image whose logical blocks map
//!   through a table into an underlying image; absent blocks read as zeros
//!   (dynamic VHD).
//!
//! Besides `read_at`, every image reports a *file map*: the sector-aligned
//! extents that actually carry data. The imaging planner uses it to skip
//! regions that are implicitly zero.

mod error;
mod extent;
mod image;
mod registry;
mod vhd;

pub use error::{ImageError, ImgResult};
pub use extent::Extent;
pub use image::{BlockMapImage, DiskImage, FlatImage, OffsetImage};
pub use registry::{FormatRegistry, ImageFormat};

#[cfg(test)]
mod proptests;
#[cfg(test)]
mod testutil;

/// Fixed sector size of every supported disk and disk image.
pub const SECTOR_SIZE: u64 = 512;
