// SPDX-License-Identifier: MIT

//! Random-access block IO over files, raw devices and memory buffers.
//!
//! Everything that writes sectors in this workspace goes through [`BlockIO`]:
//! the imaging writer, the partition-table codecs and the tests all share the
//! same `read_at`/`write_at` surface, so a codec exercised against
//! [`MemBlockIO`] in a unit test behaves identically against a physical
//! device.

mod error;
mod file;
mod mem;
mod std_io;

pub use error::{IoError, IoResult};
pub use file::FileBlockIO;
pub use mem::MemBlockIO;
pub use std_io::StdBlockIO;

/// Block IO abstraction trait.
///
/// Allows read/write/flush at arbitrary absolute byte offsets.
pub trait BlockIO {
    /// Reads `buf.len()` bytes into `buf` from `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult;

    /// Writes `data` at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> IoResult;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&mut self) -> IoResult;

    /// Forces buffered data out to the physical media.
    ///
    /// Backends without a stronger guarantee fall back to [`BlockIO::flush`].
    fn sync_to_media(&mut self) -> IoResult {
        self.flush()
    }
}

/// Reading and writing fixed-layout structs through a `BlockIO`.
pub trait BlockIOStructExt: BlockIO {
    /// Reads a struct of type `T` from the given offset.
    fn read_struct<T>(&mut self, offset: u64) -> IoResult<T>
    where
        T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable,
    {
        let mut buf = vec![0u8; core::mem::size_of::<T>()];
        self.read_at(offset, &mut buf)?;
        T::read_from_bytes(&buf).map_err(|_| IoError::Decode("struct read failed"))
    }

    /// Writes a struct of type `T` at the given offset.
    fn write_struct<T>(&mut self, offset: u64, val: &T) -> IoResult
    where
        T: zerocopy::IntoBytes + zerocopy::KnownLayout + zerocopy::Immutable,
    {
        self.write_at(offset, val.as_bytes())
    }
}

impl<T: BlockIO + ?Sized> BlockIOStructExt for T {}

/// Offset = LBA * sector_size (with overflow check).
#[inline]
fn lba_offset(lba: u64, sector_size: u64) -> IoResult<u64> {
    lba.checked_mul(sector_size).ok_or(IoError::OffsetOverflow)
}

/// LBA-addressed helpers, to avoid `* sector_size` at every call site.
pub trait BlockIOLbaExt: BlockIO {
    /// Reads `buf.len()` bytes starting at an LBA (offset = lba * sector_size).
    #[inline]
    fn read_at_lba(&mut self, lba: u64, sector_size: u64, buf: &mut [u8]) -> IoResult {
        let off = lba_offset(lba, sector_size)?;
        self.read_at(off, buf)
    }

    /// Writes `data` starting at an LBA.
    #[inline]
    fn write_at_lba(&mut self, lba: u64, sector_size: u64, data: &[u8]) -> IoResult {
        let off = lba_offset(lba, sector_size)?;
        self.write_at(off, data)
    }

    /// Reads a struct `T` starting at an LBA.
    #[inline]
    fn read_struct_lba<T>(&mut self, lba: u64, sector_size: u64) -> IoResult<T>
    where
        T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable,
    {
        let off = lba_offset(lba, sector_size)?;
        self.read_struct::<T>(off)
    }

    /// Writes a struct `T` starting at an LBA.
    #[inline]
    fn write_struct_lba<T>(&mut self, lba: u64, sector_size: u64, val: &T) -> IoResult
    where
        T: zerocopy::IntoBytes + zerocopy::KnownLayout + zerocopy::Immutable,
    {
        let off = lba_offset(lba, sector_size)?;
        self.write_struct::<T>(off, val)
    }
}

impl<T: BlockIO + ?Sized> BlockIOLbaExt for T {}
