//! Errors raised by storage and configuration
//!
//! Every [`Error`] carries a numeric [`ErrorCode`] (`E2xxx` file system,
//! `E3xxx` configuration, `E4xxx` key-value store), an optional context line
//! and, where the caller can act on it, a suggestion.

use std::fmt;
use thiserror::Error;

/// Numeric error codes, grouped by the thousands digit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ErrorCode {
    // File system (2xxx)
    IoError = 2000,
    FileNotFound = 2001,
    PermissionDenied = 2002,

    // Configuration (3xxx)
    ConfigError = 3000,
    ConfigNotFound = 3001,
    ConfigParseError = 3002,

    // Key-value store (4xxx)
    StorageRead = 4001,
    StorageWrite = 4002,
    StorageCorrupted = 4003,
}

impl ErrorCode {
    /// Numeric value
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether the code belongs to the key-value store group
    #[must_use]
    pub fn is_storage(self) -> bool {
        self.code() / 1000 == 4
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Core error
#[derive(Error, Debug)]
pub struct Error {
    /// Code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// What was being done when the error occurred
    pub context: Option<String>,
    /// What the caller can do about it
    pub suggestion: Option<String>,
    /// Underlying error
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(context) = &self.context {
            write!(f, " ({context})")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "; {suggestion}")?;
        }
        Ok(())
    }
}

impl Error {
    /// Create an error with `code` and `message`
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            suggestion: None,
            source: None,
        }
    }

    /// Attach what was being done
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attach a recovery hint
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach the underlying error
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Configuration problem
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Configuration file that was explicitly requested but is missing
    pub fn config_not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(
            ErrorCode::ConfigNotFound,
            format!("Configuration file not found: {}", path.as_ref().display()),
        )
        .with_suggestion("create a .caltracker.toml file or pass an explicit path")
    }

    /// Store read failure for `key`
    pub fn storage_read(key: &str, cause: impl fmt::Display) -> Self {
        Self::new(ErrorCode::StorageRead, format!("Failed to read '{key}': {cause}"))
    }

    /// Store write failure for `key`
    pub fn storage_write(key: &str, cause: impl fmt::Display) -> Self {
        Self::new(ErrorCode::StorageWrite, format!("Failed to write '{key}': {cause}"))
            .with_suggestion("check free disk space and permissions on the storage directory")
    }

    /// Stored value for `key` no longer parses
    pub fn storage_corrupted(key: &str) -> Self {
        Self::new(
            ErrorCode::StorageCorrupted,
            format!("Stored value for '{key}' is corrupted"),
        )
    }
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            _ => ErrorCode::IoError,
        };
        Error::new(code, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorCode::StorageCorrupted, format!("JSON error: {err}")).with_source(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::new(ErrorCode::ConfigParseError, format!("TOML parse error: {err}"))
            .with_source(err)
    }
}
