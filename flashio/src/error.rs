// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Result type for BlockIO operations.
pub type IoResult<T = ()> = core::result::Result<T, IoError>;

/// Error type for BlockIO operations.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("out of bounds: offset={offset} len={len} capacity={capacity}")]
    OutOfBounds {
        offset: u64,
        len: usize,
        capacity: u64,
    },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("decode failed: {0}")]
    Decode(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
