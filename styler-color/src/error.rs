//! Error types for color operations.

use thiserror::Error;

/// Result type for color operations.
pub type ColorResult<T> = Result<T, ColorError>;

/// Errors that can occur when parsing or converting colors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    /// A hex string was not six hex digits (with optional `#` prefix).
    #[error("invalid hex color: {0}")]
    InvalidColorFormat(String),

    /// A color string matched none of the supported textual forms.
    #[error("unsupported color format: {0}")]
    UnsupportedColorFormat(String),
}
