//! Error types for the conversion pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a single file's conversion.
///
/// None of these cross [`crate::batch::convert_one`]; there they are logged
/// and downgraded to [`crate::batch::CompletionCode::Error`].
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Required header keys absent, ill-typed, or inconsistent.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// A body row cannot be reconciled with the column layout.
    #[error("malformed row at body line {line}: {message}")]
    MalformedRow { line: u64, message: String },

    /// Open or directory-creation failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Read or decompress failure on an already opened source.
    #[error("read error: {0}")]
    Read(#[from] std::io::Error),

    /// Tab-separated body could not be tokenized.
    #[error("body read error: {0}")]
    Csv(#[from] csv::Error),

    /// The NetCDF library rejected a write.
    #[error("netcdf error: {0}")]
    Netcdf(#[from] netcdf::Error),
}

impl ConvertError {
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub(crate) fn malformed(line: u64, message: impl Into<String>) -> Self {
        Self::MalformedRow {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
