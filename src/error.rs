//! Error types for the profile store and the output renderer.
//!
//! Command code works in `anyhow` and attaches context; these variants are
//! what the core hands back so `main` can pick an exit code from the root
//! cause.

use thiserror::Error;

/// Errors raised by the profile store and the renderer.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad profile name, missing field, bad auth method, missing secret
    #[error("{0}")]
    Validation(String),

    /// Output format other than json, yaml, csv, or tsv
    #[error("unsupported output format {0:?}")]
    UnsupportedFormat(String),

    /// Referenced profile does not exist
    #[error("connection {0:?} not found")]
    NotFound(String),

    /// Disk failure, labelled with the operation that hit it
    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Existing config file could not be parsed
    #[error("{op}: {message}")]
    Parse { op: &'static str, message: String },

    /// Legacy config was read but the converted store could not be written
    #[error("write migrated config: {0}")]
    Migration(#[source] Box<Error>),

    /// Value could not be serialized into the requested encoding
    #[error("{op}: {message}")]
    Serialize { op: &'static str, message: String },

    /// Tabular output requested for data that is not record-shaped
    #[error("{0}")]
    Shape(String),
}

impl Error {
    pub fn io(op: &'static str, source: std::io::Error) -> Self {
        Error::Io { op, source }
    }

    pub fn parse(op: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Parse {
            op,
            message: err.to_string(),
        }
    }

    pub fn serialize(op: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Serialize {
            op,
            message: err.to_string(),
        }
    }

    /// True for errors caused by user input rather than the environment.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::UnsupportedFormat(_) | Error::Shape(_)
        )
    }
}
