// SPDX-License-Identifier: MIT

use crate::{BlockIO, IoError, IoResult};

/// In-memory implementation of `BlockIO`.
///
/// Useful for tests and for assembling partition tables in a scratch buffer.
#[derive(Debug)]
pub struct MemBlockIO<'a> {
    buffer: &'a mut [u8],
}

impl<'a> MemBlockIO<'a> {
    #[inline]
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer }
    }

    #[inline]
    fn check_bounds(&self, offset: u64, len: usize) -> IoResult {
        let end = offset
            .checked_add(len as u64)
            .ok_or(IoError::OffsetOverflow)?;
        if end > self.buffer.len() as u64 {
            return Err(IoError::OutOfBounds {
                offset,
                len,
                capacity: self.buffer.len() as u64,
            });
        }
        Ok(())
    }
}

impl<'a> BlockIO for MemBlockIO<'a> {
    #[inline]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult {
        self.check_bounds(offset, buf.len())?;
        let src = &self.buffer[offset as usize..offset as usize + buf.len()];
        buf.copy_from_slice(src);
        Ok(())
    }

    #[inline]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> IoResult {
        self.check_bounds(offset, data.len())?;
        let dst = &mut self.buffer[offset as usize..offset as usize + data.len()];
        dst.copy_from_slice(data);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> IoResult {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::BlockIOStructExt;

    #[test]
    fn test_rw() {
        let mut buf = [0u8; 256];
        let mut io = MemBlockIO::new(&mut buf);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut buf = [0u8; 16];
        let mut io = MemBlockIO::new(&mut buf);

        assert!(io.write_at(15, &[0xAB, 0xCD]).is_err());
        let mut out = [0u8; 4];
        assert!(io.read_at(14, &mut out).is_err());
    }

    #[test]
    fn test_struct_rw() {
        use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

        #[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Debug, PartialEq)]
        #[repr(C)]
        struct Pair {
            a: u32,
            b: u32,
        }

        let mut buf = [0u8; 64];
        let mut io = MemBlockIO::new(&mut buf);

        let val = Pair { a: 7, b: 13 };
        io.write_struct(8, &val).unwrap();
        let back: Pair = io.read_struct(8).unwrap();
        assert_eq!(back, val);
    }
}
