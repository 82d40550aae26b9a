//! # Error Handling for spatialcalc
//!
//! This module defines the error types used throughout the workspace. A single
//! error enum ([`Error`]) represents every recoverable failure mode, which keeps
//! the workspace API uniform: every fallible operation returns [`Result<T>`].
//!
//! ## Rust Pattern: thiserror
//!
//! We use the `thiserror` crate to derive `std::error::Error` implementations.
//! This provides:
//! - Automatic `Display` implementation from the `#[error(...)]` attributes
//! - Automatic `From` implementations from the `#[from]` attributes
//! - Proper error source chaining via `#[source]`
//!
//! ## Error Categories
//!
//! | Category | Examples | Typical Response |
//! |----------|----------|------------------|
//! | Init | Engine open, metadata init | Fatal to workspace construction |
//! | Decode | Bad class marker, truncated blob | Reject the blob, never coerce |
//! | Parse | Malformed WKT/WKB | Fix the input, not retried |
//! | Internal | SQLite error, I/O error | Log and investigate |
//!
//! ## What Is NOT an Error
//!
//! - Lookups against a missing handle return `None` / `false`.
//! - Usage errors (re-entrant batch, ending an idle batch) are programmer
//!   errors and panic. Using a stale handle is unspecified but memory safe.

use thiserror::Error;

// Must match the `#[error]` formats below.
const PARSE_PREFIX: &str = "parse error: ";
const DECODE_PREFIX: &str = "decode error: ";

// =============================================================================
// Error Type
// =============================================================================

/// All recoverable errors that can occur in workspace operations.
///
/// # Example
///
/// ```rust
/// use spatialcalc::{Error, WorkspaceBuilder};
///
/// let mut ws = WorkspaceBuilder::new().in_memory().build()?;
/// let err = ws.create_geometry_from_wkt("POLYGON((0 0, 1").unwrap_err();
/// assert!(matches!(err, Error::Parse(_)));
/// # Ok::<(), spatialcalc::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Initialization Errors (fatal to workspace construction)
    // =========================================================================

    /// The backing engine could not be opened or its spatial metadata could
    /// not be initialized.
    ///
    /// # When This Happens
    ///
    /// - The backing file cannot be created in the runtime temp directory
    /// - Registering the spatial SQL functions fails
    /// - Creating the `Calculator` table or the geometry column metadata fails
    ///
    /// # Recovery
    ///
    /// None internally. The caller may retry with an in-memory workspace.
    #[error("initialization failed: {0}")]
    Init(String),

    // =========================================================================
    // Format Errors (reject the input)
    // =========================================================================

    /// A geometry blob failed validation during decode.
    ///
    /// # When This Happens
    ///
    /// - The leading block marker is not `0x00`
    /// - The endianness marker is neither `0x00` nor `0x01`
    /// - The MBR terminator, child marker or geometry terminator is missing
    /// - The class type is unknown, or does not match the requested shape
    /// - The blob is truncated
    #[error("decode error: {0}")]
    Decode(String),

    /// Malformed WKT or WKB supplied to a text/binary constructor.
    ///
    /// Raised by the backing engine's ingestion functions and surfaced
    /// unchanged through the workspace.
    #[error("parse error: {0}")]
    Parse(String),

    // =========================================================================
    // Internal Errors (investigate and fix)
    // =========================================================================

    /// SQLite operation failed.
    ///
    /// # Rust Pattern: #[from]
    ///
    /// The `#[from]` attribute generates `From<rusqlite::Error>`, which lets
    /// `?` convert engine errors automatically. Errors raised inside our own
    /// spatial SQL functions travel through SQLite as
    /// `rusqlite::Error::UserFunctionError`; [`Error::from_engine`] unwraps
    /// them back into the variant that was raised.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File system operation failed (temp directories, backing files).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Converts an engine error, recovering crate errors raised inside the
    /// spatial SQL functions.
    ///
    /// # Why Not Just `From`?
    ///
    /// A `Parse` error raised by `GeomFromText` crosses the SQLite C boundary
    /// as a plain error message. Callers should see `Error::Parse`, not an
    /// opaque SQLite failure, so the workspace converts at its boundary.
    pub fn from_engine(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::UserFunctionError(inner) => match inner.downcast::<Error>() {
                Ok(ours) => *ours,
                Err(other) => Error::Sqlite(rusqlite::Error::UserFunctionError(other)),
            },
            rusqlite::Error::SqliteFailure(code, Some(msg)) => {
                if let Some(rest) = msg.strip_prefix(PARSE_PREFIX) {
                    Error::Parse(rest.to_string())
                } else if let Some(rest) = msg.strip_prefix(DECODE_PREFIX) {
                    Error::Decode(rest.to_string())
                } else {
                    Error::Sqlite(rusqlite::Error::SqliteFailure(code, Some(msg)))
                }
            }
            other => Error::Sqlite(other),
        }
    }

    /// Boxes this error so it can be raised from inside a SQL function.
    pub(crate) fn into_engine(self) -> rusqlite::Error {
        rusqlite::Error::UserFunctionError(Box::new(self))
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
