// SPDX-License-Identifier: MIT

//! Maps image file extensions to container openers.
//!
//! The registry is a plain value the caller constructs and owns, so tests and
//! embedders can carry differently configured registries side by side.

use std::collections::HashMap;
use std::path::Path;

use crate::{DiskImage, FlatImage, ImageError, ImgResult, vhd};

/// Supported disk image containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Raw sector-for-sector image.
    Flat,
    /// Virtual Hard Disk, fixed or dynamic.
    Vhd,
}

/// Extension-based image format registry.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    by_extension: HashMap<String, ImageFormat>,
}

impl FormatRegistry {
    /// Empty registry with no formats registered.
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Registers `format` for `extension` (without the dot, any case).
    pub fn register(&mut self, extension: &str, format: ImageFormat) {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), format);
    }

    /// Resolves the format for `path` from its extension, case-insensitive.
    pub fn format_for(&self, path: &Path) -> ImgResult<ImageFormat> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        self.by_extension
            .get(&ext)
            .copied()
            .ok_or(ImageError::UnknownFormat(ext))
    }

    /// Opens `path` with the container its extension selects.
    pub fn open(&self, path: &Path) -> ImgResult<DiskImage> {
        match self.format_for(path)? {
            ImageFormat::Flat => Ok(DiskImage::Flat(FlatImage::open(path)?)),
            ImageFormat::Vhd => vhd::open(path),
        }
    }
}

impl Default for FormatRegistry {
    /// The stock registry: `.img`, `.usb` and `.iso` open flat, `.vhd` goes
    /// through the VHD container.
    fn default() -> Self {
        let mut reg = Self::empty();
        reg.register("img", ImageFormat::Flat);
        reg.register("usb", ImageFormat::Flat);
        reg.register("iso", ImageFormat::Flat);
        reg.register("vhd", ImageFormat::Vhd);
        reg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn default_extensions_resolve() {
        let reg = FormatRegistry::default();
        assert_eq!(
            reg.format_for(Path::new("a/disk.img")).unwrap(),
            ImageFormat::Flat
        );
        assert_eq!(
            reg.format_for(Path::new("DISK.VHD")).unwrap(),
            ImageFormat::Vhd
        );
        assert_eq!(
            reg.format_for(Path::new("live.ISO")).unwrap(),
            ImageFormat::Flat
        );
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let reg = FormatRegistry::default();
        assert!(matches!(
            reg.format_for(Path::new("disk.qcow2")),
            Err(ImageError::UnknownFormat(ext)) if ext == "qcow2"
        ));
        assert!(matches!(
            reg.format_for(Path::new("no_extension")),
            Err(ImageError::UnknownFormat(ext)) if ext.is_empty()
        ));
    }

    #[test]
    fn open_flat_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.img");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0x5A; 1024]).unwrap();

        let img = FormatRegistry::default().open(&path).unwrap();
        assert_eq!(img.len(), 1024);
        assert!(matches!(img, DiskImage::Flat(_)));
    }
}
