pub mod config;
pub mod connection;
pub mod error;
pub mod parser;
pub mod proxy;

pub use config::Config;
pub use connection::{BackendConnection, BufferedConnection, ReadHandle, ReadInterest};
pub use error::{Error, Result};
pub use parser::{Http1ResponseParser, ParseError, ResponseParser};
pub use proxy::{Exchange, Frontend, Header, MessageState, PauseReason, Request, Response};
