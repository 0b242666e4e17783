// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Result type for partition table operations.
pub type PartResult<T = ()> = core::result::Result<T, PartError>;

/// Error type for partition table operations.
///
/// Every variant is fatal: a table that is present but inconsistent is
/// rejected, never repaired.
#[derive(Debug, Error)]
pub enum PartError {
    #[error("gpt: invalid header signature")]
    BadSignature,

    #[error("gpt: unsupported revision {0:#010x}")]
    BadRevision(u32),

    #[error("gpt: header size {0} below the minimum of 92")]
    BadHeaderSize(u32),

    #[error("gpt: entry size {0} is not 128")]
    BadEntrySize(u32),

    #[error("gpt: entry count {0} out of range")]
    BadEntryCount(u32),

    #[error("gpt: header at lba {found} claims to live at lba {claimed}")]
    MisplacedHeader { claimed: u64, found: u64 },

    #[error("gpt: usable lba range is inverted")]
    InvertedUsableRange,

    #[error("gpt: header crc mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    HeaderCrcMismatch { stored: u32, computed: u32 },

    #[error("gpt: entries crc mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    EntriesCrcMismatch { stored: u32, computed: u32 },

    #[error("gpt: primary and backup headers disagree on {0}")]
    BackupMismatch(&'static str),

    #[error("gpt: not enough space reserved for the {0} entries area")]
    InsufficientEntrySpace(&'static str),

    #[error("gpt: partition entry lies outside the usable lba range")]
    EntryOutOfBounds,

    #[error("destination of {0} bytes cannot hold the partition table")]
    DestinationTooSmall(u64),

    #[error(transparent)]
    Image(#[from] flashimg::ImageError),

    #[error(transparent)]
    Io(#[from] flashio::IoError),
}
