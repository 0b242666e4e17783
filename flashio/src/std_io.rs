// SPDX-License-Identifier: MIT

use std::io::{Read, Seek, SeekFrom, Write};

use crate::{BlockIO, IoResult};

/// `BlockIO` over any seekable reader/writer.
#[derive(Debug)]
pub struct StdBlockIO<'a, T: Read + Write + Seek> {
    io: &'a mut T,
}

impl<'a, T: Read + Write + Seek> StdBlockIO<'a, T> {
    #[inline]
    pub fn new(io: &'a mut T) -> Self {
        Self { io }
    }
}

impl<'a, T: Read + Write + Seek> BlockIO for StdBlockIO<'a, T> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult {
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> IoResult {
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> IoResult {
        self.io.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_rw() {
        let mut cur = Cursor::new(vec![0u8; 64]);
        let mut io = StdBlockIO::new(&mut cur);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut cur = Cursor::new(vec![0u8; 8]);
        let mut io = StdBlockIO::new(&mut cur);

        let mut output = [0u8; 4];
        assert!(io.read_at(6, &mut output).is_err());
    }
}
