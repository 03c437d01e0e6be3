//! Error types for file access and conversion operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the sandboxed file layer (path guard + store)
#[derive(Debug, Error)]
pub enum FileError {
    /// The path resolves outside every allowed root
    #[error("Access denied: {} is outside allowed directories", path.display())]
    AccessDenied { path: PathBuf },
    /// The path cannot name a file (empty, NUL byte, nothing left after sanitizing)
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
    /// Read target does not exist
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },
    /// Target exists but is not a regular file
    #[error("Not a file: {}", path.display())]
    NotAFile { path: PathBuf },
    /// Read target exceeds the configured size cap
    #[error("File too large: {} is {size} bytes (max {limit} bytes)", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
    /// Create target already exists
    #[error("File already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },
    /// File content is not valid UTF-8
    #[error("File is not valid UTF-8: {}", path.display())]
    Decode { path: PathBuf },
    /// Any other filesystem failure (permissions, disk full, ...)
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FileError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            FileError::AccessDenied { .. } => "access_denied",
            FileError::InvalidPath { .. } => "invalid_path",
            FileError::NotFound { .. } => "not_found",
            FileError::NotAFile { .. } => "not_a_file",
            FileError::TooLarge { .. } => "too_large",
            FileError::AlreadyExists { .. } => "already_exists",
            FileError::Decode { .. } => "decode",
            FileError::Io { .. } => "io",
        }
    }
}

/// Errors that can occur during markdown/HTML/PDF conversion
#[derive(Debug, Error)]
pub enum ConversionError {
    /// HTML parsing failed
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Character encoding error
    #[error("Encoding error: {0}")]
    EncodingError(String),
    /// Conversion timeout exceeded
    #[error("Conversion timeout exceeded")]
    Timeout,
    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Rendering engine unavailable or failed
    #[error("Render error: {0}")]
    RenderError(String),
    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ConversionError {
    /// Get numeric error code
    pub fn code(&self) -> u32 {
        match self {
            ConversionError::ParseError(_) => 1,
            ConversionError::EncodingError(_) => 2,
            ConversionError::Timeout => 3,
            ConversionError::InvalidInput(_) => 5,
            ConversionError::RenderError(_) => 6,
            ConversionError::InternalError(_) => 99,
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::ParseError(_) => "parse",
            ConversionError::EncodingError(_) => "encoding",
            ConversionError::Timeout => "timeout",
            ConversionError::InvalidInput(_) => "invalid_input",
            ConversionError::RenderError(_) => "render",
            ConversionError::InternalError(_) => "internal",
        }
    }
}

/// Top-level error seen by the operation layer
#[derive(Debug, Error)]
pub enum WorkbenchError {
    #[error(transparent)]
    File(#[from] FileError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl WorkbenchError {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkbenchError::File(e) => e.kind(),
            WorkbenchError::Conversion(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_message_names_path() {
        let err = FileError::AccessDenied {
            path: PathBuf::from("/etc/passwd"),
        };
        assert_eq!(
            err.to_string(),
            "Access denied: /etc/passwd is outside allowed directories"
        );
        assert_eq!(err.kind(), "access_denied");
    }

    #[test]
    fn test_conversion_codes_are_distinct() {
        let errors = [
            ConversionError::ParseError(String::new()),
            ConversionError::EncodingError(String::new()),
            ConversionError::Timeout,
            ConversionError::InvalidInput(String::new()),
            ConversionError::RenderError(String::new()),
            ConversionError::InternalError(String::new()),
        ];
        let mut codes: Vec<u32> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_workbench_error_is_transparent() {
        let err: WorkbenchError = FileError::NotFound {
            path: PathBuf::from("/tmp/missing.md"),
        }
        .into();
        assert_eq!(err.to_string(), "File not found: /tmp/missing.md");
        assert_eq!(err.kind(), "not_found");
    }
}
