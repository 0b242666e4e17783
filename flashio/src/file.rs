// SPDX-License-Identifier: MIT

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{BlockIO, IoResult};

/// `BlockIO` over an owned file handle, typically a raw block device.
///
/// Unlike [`crate::StdBlockIO`] this backend can force written data out to
/// the physical media via `File::sync_all`.
#[derive(Debug)]
pub struct FileBlockIO {
    file: File,
}

impl FileBlockIO {
    /// Opens `path` for reading and writing.
    pub fn open_rw(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }
}

impl BlockIO for FileBlockIO {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> IoResult {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> IoResult {
        self.file.flush()?;
        Ok(())
    }

    fn sync_to_media(&mut self) -> IoResult {
        self.file.sync_all()?;
        Ok(())
    }
}
