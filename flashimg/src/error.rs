// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Result type for disk image operations.
pub type ImgResult<T = ()> = core::result::Result<T, ImageError>;

/// Error type for disk image operations.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("out of range: offset={offset} len={len} image_len={image_len}")]
    OutOfRange {
        offset: u64,
        len: u64,
        image_len: u64,
    },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("extent length must be positive")]
    EmptyExtent,

    #[error("image length {0} is not a multiple of the sector size")]
    UnalignedLength(u64),

    #[error("block size {0} is not a multiple of the sector size")]
    UnalignedBlockSize(u64),

    #[error("corrupt disk image: {0}")]
    CorruptImage(&'static str),

    #[error("unsupported disk image feature: {0}")]
    Unsupported(&'static str),

    #[error("unsupported image file extension: {0:?}")]
    UnknownFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
