use std::fmt;

use crate::parser::ParseError;
use crate::proxy::MessageState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Backend parse failure: {0}")]
    HttpParse(#[from] ParseError),

    #[error("Invalid message state transition: {from:?} -> {to:?}")]
    StateTransition { from: MessageState, to: MessageState },

    #[error("No backend connection attached")]
    NoBackend,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Frontend error: {0}")]
    Frontend(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_config<T: fmt::Display>(msg: T) -> Self {
        Error::InvalidConfig(msg.to_string())
    }

    pub fn backend<T: fmt::Display>(msg: T) -> Self {
        Error::Backend(msg.to_string())
    }

    pub fn frontend<T: fmt::Display>(msg: T) -> Self {
        Error::Frontend(msg.to_string())
    }

    pub fn internal<T: fmt::Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }

    /// Status the frontend should answer the client with, if any.
    pub fn http_status_code(&self) -> Option<u16> {
        match self {
            Error::HttpParse(_) | Error::NoBackend | Error::Backend(_) => Some(502),
            Error::StateTransition { .. } | Error::Internal(_) => Some(500),
            Error::Io(_) | Error::Config(_) | Error::InvalidConfig(_) | Error::Frontend(_) => None,
        }
    }
}
