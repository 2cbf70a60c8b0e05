//! Shared diagnostic types.
//!
//! The verifier reports malformed output through `ParseError`, which carries
//! a source location (line, column, byte offset) into the captured text so
//! a failing run can point at the exact offending construct.

use std::fmt;

use thiserror::Error;

/// Source location within captured serializer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
    /// 0-based byte offset from the start of the text.
    pub byte_offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The error type returned when the verifier's parse step fails.
///
/// Any parse error is terminal for the run that produced the output; the
/// verifier never attempts partial recovery.
#[derive(Debug, Clone, Error)]
#[error("parse error at {location}: {message}")]
pub struct ParseError {
    /// The primary error message.
    pub message: String,
    /// Where in the decoded text the error occurred.
    pub location: SourceLocation,
}
