//! Error type for the tools.

use thiserror::Error;

use rts_kernel::error::KernelError;

/// Result type alias using [`ToolError`].
pub type Result<T> = std::result::Result<T, ToolError>;

/// Anything that can go wrong while loading or processing a data file.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Input file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),
    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse a RON file.
    #[error("Failed to parse RON: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Failed to write RON.
    #[error("Failed to write RON: {0}")]
    Format(#[from] ron::Error),
    /// The kernel rejected the data.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}
