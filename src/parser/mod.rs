//! Backend response parsing.
//!
//! A [`ResponseParser`] is fed raw backend bytes and reports what it found to a
//! [`ParserEvents`] sink, synchronously and in wire order: header field and value
//! fragments, headers complete, body fragments, message complete. Engines are free
//! to split fields at any byte boundary; the sink reassembles them.

mod chunked;
pub mod http1;

use std::fmt;

use http::StatusCode;

pub use http1::Http1ResponseParser;

/// Response head as determined by the parser when the header block ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub major: u8,
    pub minor: u8,
    /// Whether the backend connection may be reused after this response.
    pub keep_alive: bool,
}

/// What the sink wants done with the body after the header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyDisposition {
    Read,
    Skip,
}

/// Receiver of parse events. Returning an error stops the parser, which then
/// reports [`ParseError::Callback`].
pub trait ParserEvents {
    fn on_header_field(&mut self, data: &[u8]) -> crate::Result<()>;
    fn on_header_value(&mut self, data: &[u8]) -> crate::Result<()>;
    fn on_headers_complete(&mut self, head: &ResponseHead) -> crate::Result<BodyDisposition>;
    fn on_body(&mut self, data: &[u8]) -> crate::Result<()>;
    fn on_message_complete(&mut self) -> crate::Result<()>;
}

/// An incremental response parser engine.
pub trait ResponseParser: fmt::Debug {
    /// Parse as much of `data` as possible and return the number of bytes consumed.
    /// Unconsumed bytes must be offered again, with more appended, on the next call.
    fn execute(&mut self, data: &[u8], events: &mut dyn ParserEvents) -> usize;

    /// Signal that the backend closed its side of the connection.
    fn finish(&mut self, events: &mut dyn ParserEvents);

    /// Terminal error, if parsing has failed.
    fn error(&self) -> Option<&ParseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    HeaderField,
    HeaderValue,
    HeadersComplete,
    Body,
    MessageComplete,
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Callback::HeaderField => "header field",
            Callback::HeaderValue => "header value",
            Callback::HeadersComplete => "headers complete",
            Callback::Body => "body",
            Callback::MessageComplete => "message complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid response head: {0}")]
    Head(#[from] httparse::Error),

    #[error("response head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    #[error("invalid Content-Length")]
    InvalidContentLength,

    #[error("invalid chunk size line")]
    InvalidChunkSize,

    #[error("missing CRLF after chunk data")]
    InvalidChunkTerminator,

    #[error("invalid chunked trailers: {0}")]
    Trailers(httparse::Error),

    #[error("data after message complete")]
    DataAfterMessage,

    #[error("connection closed before message complete")]
    UnexpectedEof,

    #[error("{0} callback failed")]
    Callback(Callback),
}

/// Statuses whose responses never carry a body, whatever their framing headers say.
pub fn status_has_no_body(status: u16) -> bool {
    match StatusCode::from_u16(status) {
        Ok(code) => {
            code.is_informational()
                || code == StatusCode::NO_CONTENT
                || code == StatusCode::NOT_MODIFIED
        }
        Err(_) => false,
    }
}

pub(crate) fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty()
        || haystack
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_ignore_ascii_case() {
        assert!(contains_ignore_ascii_case(b"gzip, Chunked", b"chunked"));
        assert!(!contains_ignore_ascii_case(b"chunk", b"chunked"));
        assert!(!contains_ignore_ascii_case(b"", b"close"));
    }

    #[test]
    fn test_bodyless_statuses() {
        for status in [100, 101, 103, 199, 204, 304] {
            assert!(status_has_no_body(status), "status {}", status);
        }
        for status in [200, 201, 205, 301, 404, 502] {
            assert!(!status_has_no_body(status), "status {}", status);
        }
    }

    #[test]
    fn test_callback_error_display() {
        let err = ParseError::Callback(Callback::HeadersComplete);
        assert_eq!(err.to_string(), "headers complete callback failed");
    }
}
