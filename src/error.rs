//! Unified error type.

use crate::config::ConfigError;
use crate::notify::MailError;

/// The error type returned by the server's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values or [`ApiError`](crate::ApiError)s,
/// not as `Error`s. This type surfaces startup and infrastructure failures:
/// loading configuration, binding to a port, accepting a connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("mail: {0}")]
    Mail(#[from] MailError),
}
