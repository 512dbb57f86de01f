//! Errors raised by the shared WFM types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Bootstrap TOML missing fields, unreadable or inconsistent with the profile
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inbound channel frame could not be parsed into a domain event
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Signed URL expired or tampered with
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
