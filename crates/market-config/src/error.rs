//! Errors raised while locating and loading client configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// No home directory to root `~/.marketplace` under
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Config file exists but could not be read
    #[error("Cannot read config file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`Config`](crate::Config)
    #[error("Malformed config file {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A client directory could not be created
    #[error("Cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `api_base_url` does not parse
    #[error("Invalid API base URL {url:?}: {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A setting holds a value the client cannot run with
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
