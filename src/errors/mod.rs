//! Error type definitions for the shifter application
//!
//! Layered error enums built with `thiserror`: startup configuration errors,
//! site-settings errors, storage errors, and a top-level application error
//! that the web layer maps onto HTTP status codes.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Site-settings errors (unknown key, invalid override value)
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// File storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Startup configuration errors
///
/// `Invalid` carries every problem found during the validation pass so an
/// operator can fix a broken environment in one round trip instead of
/// replaying the service once per missing variable.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration:\n  - {}", .issues.join("\n  - "))]
    Invalid { issues: Vec<String> },
}

/// Site-settings errors
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Lookup of a key that is not part of the settings schema. This is a
    /// programmer error, not something an admin can trigger from the UI.
    #[error("Unknown site setting key: {key}")]
    UnknownKey { key: String },

    /// An override value that does not match the setting's declared kind.
    /// The prior value is retained.
    #[error("Invalid value for site setting {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl SettingsError {
    pub fn unknown_key<K: Into<String>>(key: K) -> Self {
        Self::UnknownKey { key: key.into() }
    }

    pub fn invalid_value<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// File storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Upload exceeded the configured maximum file size
    #[error("File too large: {size} bytes (max: {max_size})")]
    TooLarge { size: u64, max_size: u64 },
}

impl StorageError {
    pub fn io<P: Into<String>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
