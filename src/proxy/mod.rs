//! Per-exchange state of an HTTP/2 to HTTP/1.1 reverse proxy.
//!
//! The client-facing side (a [`Frontend`]) creates one [`Exchange`] per client
//! stream, fills in the request, hands it a backend connection, and is called
//! back as the backend response is parsed. Backpressure runs both ways: the
//! frontend checks [`Exchange::output_buffer_full`] before reading more request
//! data, and pauses backend reads while the staged response body is full.

mod adapter;
pub mod body;
pub mod exchange;
pub mod frontend;
pub mod headers;
pub mod ioctrl;
pub mod state;

pub use body::BodyBuffer;
pub use exchange::{Exchange, Request, Response, StreamId};
pub use frontend::Frontend;
pub use headers::{Header, HeaderAccumulator};
pub use ioctrl::{IoControl, PauseReason};
pub use state::MessageState;
