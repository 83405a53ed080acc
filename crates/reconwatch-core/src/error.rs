//! Error types shared across the ReconWatch engine.

use thiserror::Error;

/// Errors raised by pure domain logic (normalization, scope evaluation).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid hostname `{0}`")]
    InvalidHostname(String),

    #[error("invalid ip address `{0}`")]
    InvalidIpAddress(String),

    #[error("ip address `{0}` is private/loopback and not explicitly allowed by scope")]
    PrivateIpNotAllowed(String),

    #[error("invalid url `{0}`: {1}")]
    InvalidUrl(String, String),

    #[error("invalid port `{0}`")]
    InvalidPort(i64),

    #[error("target string `{0}` denied by scope policy")]
    ScopeDenied(String),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
