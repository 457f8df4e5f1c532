use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub type Result<T, E = AnalyzerError> = std::result::Result<T, E>;

/// Various errors surfaced by the analyzer core.
///
/// Failed compilation and failed resolution are *not* represented here; both
/// are ordinary results carrying diagnostics or `exists: false`. This type is
/// reserved for faults the caller cannot act on, which the request dispatch
/// layer maps to JSON-RPC error code `-32000`.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Io(#[from] AnalyzerIoError),
    #[error("no document or on-disk content available for \"{0}\"")]
    MissingSource(PathBuf),
    #[error("unknown request method \"{0}\"")]
    UnknownMethod(String),
    #[error("invalid arguments for \"{method}\": {source}")]
    InvalidParams {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// General purpose message.
    #[error("{0}")]
    Message(String),
}

impl AnalyzerError {
    pub fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        AnalyzerIoError::new(err, path).into()
    }

    pub fn msg(msg: impl std::fmt::Display) -> Self {
        Self::Message(msg.to_string())
    }

    pub fn invalid_params(method: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidParams { method: method.into(), source }
    }
}

#[derive(Debug, Error)]
#[error("\"{}\": {io}", .path.display())]
pub struct AnalyzerIoError {
    io: io::Error,
    path: PathBuf,
}

impl AnalyzerIoError {
    pub fn new(io: io::Error, path: impl Into<PathBuf>) -> Self {
        Self { io, path: path.into() }
    }

    /// The path at which the error occurred.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying `io::Error`.
    pub fn source(&self) -> &io::Error {
        &self.io
    }
}

impl From<AnalyzerIoError> for io::Error {
    fn from(err: AnalyzerIoError) -> Self {
        err.io
    }
}
