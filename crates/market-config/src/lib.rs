//! Configuration, paths, and logging setup shared by the marketplace session crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_CREDENTIALS_KEY, DEFAULT_LOG_LEVEL,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SESSION_KEY,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogFormat};
pub use paths::Paths;
