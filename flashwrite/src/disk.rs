// SPDX-License-Identifier: MIT

//! The destination device boundary.
//!
//! Enumeration, cleaning and ejection belong to the platform's disk
//! management service; the writer only needs this narrow capability.

use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A writable block device the image lands on.
pub trait Disk {
    /// Total capacity in bytes.
    fn capacity(&self) -> u64;

    /// Platform path of the raw device node.
    fn device_path(&self) -> &Path;

    /// Removes existing partitions and zeroes the visible disk surface.
    ///
    /// The copy plan skips unpartitioned sectors on the strength of this
    /// call; it may block while the platform service does the work.
    fn clean(&mut self) -> io::Result<()>;

    /// Best-effort eject after a finished write. No-op by default.
    fn eject(&mut self) {}
}

/// A device addressed by filesystem path: a raw block node, or a plain file
/// standing in for one in tests.
pub struct FileDisk {
    path: PathBuf,
    capacity: u64,
}

impl FileDisk {
    /// Probes `path` for its capacity.
    ///
    /// Block device nodes report a zero metadata length on most platforms,
    /// so the size is taken by seeking to the end instead.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let capacity = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            path: path.to_path_buf(),
            capacity,
        })
    }
}

impl Disk for FileDisk {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn device_path(&self) -> &Path {
        &self.path
    }

    /// `FileDisk` has no partition service behind it; callers are expected
    /// to hand over an already-cleaned device.
    fn clean(&mut self) -> io::Result<()> {
        crate::log_verbose!("no clean service for {}, skipping", self.path.display());
        Ok(())
    }
}
