//! Error types for the scenario kernel.
//!
//! Only recoverable failures live here: data that came from outside the
//! kernel (record streams, metadata, replays) and was found to be invalid.
//! Expected gameplay outcomes are plain `bool`/`Option` results, and broken
//! caller invariants panic.

use thiserror::Error;

/// Result type alias using [`KernelError`].
pub type Result<T> = std::result::Result<T, KernelError>;

/// Top-level error type for the kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A record did not start with the expected magic marker.
    #[error("Bad record magic at offset {offset}: expected {expected:?}, found {found:?}")]
    BadMagic {
        /// Byte offset of the record.
        offset: usize,
        /// Expected marker.
        expected: [u8; 2],
        /// Marker actually read.
        found: [u8; 2],
    },

    /// A record type tag is not known to the kernel.
    #[error("Unknown record tag {tag} at offset {offset}")]
    UnknownRecord {
        /// Byte offset of the record.
        offset: usize,
        /// Tag read from the stream.
        tag: u8,
    },

    /// A record carries a format ID this build cannot read.
    #[error("Unsupported format {format_id} for record tag {tag}")]
    UnsupportedFormat {
        /// Record type tag.
        tag: u8,
        /// Format ID read from the stream.
        format_id: u16,
    },

    /// The stream ended in the middle of a record.
    #[error("Record stream truncated at offset {offset}: needed {needed} more bytes")]
    Truncated {
        /// Byte offset where reading stopped.
        offset: usize,
        /// Number of bytes that were missing.
        needed: usize,
    },

    /// A length-prefixed string was not valid UTF-8.
    #[error("Invalid string at offset {offset}")]
    InvalidString {
        /// Byte offset of the string payload.
        offset: usize,
    },

    /// The record stream is structurally valid but describes an invalid map.
    #[error("Invalid map: {0}")]
    InvalidMap(String),

    /// An element violates placement constraints.
    #[error("Placement violation: {0}")]
    Placement(String),

    /// Metadata descriptors reference each other inconsistently.
    #[error("Invalid metadata: {0}")]
    Metadata(String),

    /// Replay (de)serialization failed.
    #[error("Replay error: {0}")]
    Replay(String),

    /// A replayed run did not reproduce the recorded state digest.
    #[error("Desync detected at frame {frame}: expected digest {expected:#018x}, got {actual:#018x}")]
    DesyncDetected {
        /// Frame at which the digests were compared.
        frame: u64,
        /// Recorded digest.
        expected: u64,
        /// Digest of the replayed run.
        actual: u64,
    },
}
