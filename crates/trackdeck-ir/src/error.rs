//! Error taxonomy shared by every format loader.
//!
//! Kept `no_std`-compatible (no `thiserror`) since this crate may be built
//! without `std`; a manual `Display` impl is provided instead.

use core::fmt;

/// Kinds of errors a loader or a player entry point can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// Signature/magic did not match any supported format.
    FormatMismatch,
    /// Signature matched but a structural invariant failed (bad pointer,
    /// chunk overrun, inconsistent length).
    Corrupt,
    /// Recognized format, but a mandatory variant is not implemented.
    UnsupportedVariant,
    /// Allocation failure during parse.
    OutOfMemory,
    /// Caller passed an argument outside the valid domain.
    InvalidArgument,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            LoadError::FormatMismatch => "file signature did not match any supported format",
            LoadError::Corrupt => "file matched a known signature but failed structural validation",
            LoadError::UnsupportedVariant => "recognized format variant is not implemented",
            LoadError::OutOfMemory => "allocation failed while parsing",
            LoadError::InvalidArgument => "argument out of valid range",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LoadError {}

pub type LoadResult<T> = Result<T, LoadError>;
