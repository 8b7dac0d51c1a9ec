//! Error types for weir.
//!
//! One enum covers the whole core: buffer lifecycle failures, the stable
//! protocol sentinels readers and writers observe, and configuration /
//! datasource errors. Protocol sentinels are plain variants so callers can
//! match on them by identity.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for weir operations.
#[derive(Error, Debug)]
pub enum WeirError {
    // =========================================================================
    // Buffer lifecycle errors (E001-E009)
    // =========================================================================
    /// Failed to create the buffer's backing file.
    #[error("E001: Failed to create buffer file in {dir}: {cause}")]
    BufferCreate {
        /// Directory the backing file was created in.
        dir: PathBuf,
        /// Reason for the failure, including any suppressed cleanup errors.
        cause: String,
    },

    /// Failed to memory-map the backing file.
    #[error("E002: Failed to map buffer file {path}: {cause}")]
    BufferMap {
        /// Path of the backing file.
        path: PathBuf,
        /// Reason for the mmap failure.
        cause: String,
    },

    /// Failed to release the buffer's backing file at shutdown.
    #[error("E003: Failed to remove buffer file {path}: {cause}")]
    BufferRemove {
        /// Path of the backing file.
        path: PathBuf,
        /// Reason for the removal failure.
        cause: String,
    },

    // =========================================================================
    // Protocol sentinels (E010-E019)
    // =========================================================================
    /// The buffer was closed: a write after `Writer::close`, or a read on a
    /// reader that was itself closed or cancelled.
    #[error("E010: closed")]
    Closed,

    /// The entry a reader was pinned to was discarded by a forced shutdown.
    #[error("E011: discarded")]
    Discarded,

    /// The reader reached the end of a closed buffer.
    #[error("E012: end of stream")]
    EndOfStream,

    // =========================================================================
    // Configuration errors (E100-E199)
    // =========================================================================
    /// Failed to read the configuration file.
    #[error("E101: Failed to read config {path}: {cause}")]
    ConfigRead {
        /// Path of the config file.
        path: PathBuf,
        /// Reason for the read failure.
        cause: String,
    },

    /// Failed to parse the configuration file.
    #[error("E102: Failed to parse config {path}: {cause}")]
    ConfigParse {
        /// Path of the config file.
        path: PathBuf,
        /// Reason for the parse failure.
        cause: String,
    },

    // =========================================================================
    // Datasource errors (E200-E299)
    // =========================================================================
    /// No collection with the requested name exists in the config.
    #[error("E201: collection '{name}' not found")]
    CollectionNotFound {
        /// The requested collection name.
        name: String,
    },

    /// A collection references a datasource type that is not registered.
    #[error("E202: unknown datasource type '{kind}'")]
    UnknownDatasource {
        /// The unrecognised `type` value.
        kind: String,
    },

    /// A collection's options failed to deserialize for its datasource.
    #[error("E203: invalid options for collection '{collection}': {cause}")]
    CollectionOptions {
        /// The collection whose options are invalid.
        collection: String,
        /// Reason the options were rejected.
        cause: String,
    },

    /// Failed to spawn an external collector command.
    #[error("E204: failed to spawn '{program}': {cause}")]
    Spawn {
        /// The program that could not be spawned.
        program: String,
        /// Reason for the spawn failure.
        cause: String,
    },

    /// The stdin datasource was requested but the process was not started
    /// in stdin mode.
    #[error("E205: stdin collection unavailable (start with --stdin)")]
    StdinUnavailable,

    // =========================================================================
    // Record adapter errors (E300-E399)
    // =========================================================================
    /// The record source failed mid-stream.
    #[error("E301: record source error: {cause}")]
    RecordRead {
        /// The underlying source error.
        cause: String,
    },

    // =========================================================================
    // I/O errors (E900-E999)
    // =========================================================================
    /// General I/O failure.
    #[error("E901: I/O error at {path}: {cause}")]
    Io {
        /// The path (or address) where the I/O error occurred.
        path: PathBuf,
        /// Description of the I/O error.
        cause: String,
    },
}

impl WeirError {
    /// Get the error code (e.g., "E001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BufferCreate { .. } => "E001",
            Self::BufferMap { .. } => "E002",
            Self::BufferRemove { .. } => "E003",
            Self::Closed => "E010",
            Self::Discarded => "E011",
            Self::EndOfStream => "E012",
            Self::ConfigRead { .. } => "E101",
            Self::ConfigParse { .. } => "E102",
            Self::CollectionNotFound { .. } => "E201",
            Self::UnknownDatasource { .. } => "E202",
            Self::CollectionOptions { .. } => "E203",
            Self::Spawn { .. } => "E204",
            Self::StdinUnavailable => "E205",
            Self::RecordRead { .. } => "E301",
            Self::Io { .. } => "E901",
        }
    }

    /// Check whether this is a protocol sentinel rather than a fault.
    ///
    /// Sentinels are part of the buffer's normal vocabulary: callers branch
    /// on them instead of propagating them as failures.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Closed | Self::Discarded | Self::EndOfStream)
    }
}

/// Result type alias using `WeirError`.
pub type Result<T> = std::result::Result<T, WeirError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(WeirError::Closed.code(), "E010");
        assert_eq!(WeirError::Discarded.code(), "E011");
        assert_eq!(WeirError::EndOfStream.code(), "E012");

        let err = WeirError::CollectionNotFound {
            name: "default".to_string(),
        };
        assert_eq!(err.code(), "E201");
    }

    #[test]
    fn sentinels() {
        assert!(WeirError::Closed.is_sentinel());
        assert!(WeirError::EndOfStream.is_sentinel());
        assert!(
            !WeirError::Spawn {
                program: "journalctl".to_string(),
                cause: "not found".to_string()
            }
            .is_sentinel()
        );
    }

    #[test]
    fn error_display() {
        let err = WeirError::UnknownDatasource {
            kind: "syslog".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("E202"));
        assert!(msg.contains("syslog"));
    }
}
