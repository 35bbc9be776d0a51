use crate::proxy::Exchange;
use crate::Result;

/// The client-facing (HTTP/2 or SPDY) side of the proxy, notified as the
/// backend response is parsed.
///
/// Any error returned aborts parsing of the current response; the exchange then
/// reports a backend parse failure and the frontend is expected to answer the
/// client with an error response or a stream reset.
#[cfg_attr(test, mockall::automock)]
pub trait Frontend {
    /// Status line and headers of the backend response are available.
    fn on_header_complete(&mut self, exchange: &mut Exchange) -> Result<()>;

    /// A piece of the response body. Returns how many bytes were accepted.
    fn on_body(&mut self, exchange: &mut Exchange, data: &[u8]) -> Result<usize>;

    fn on_body_complete(&mut self, exchange: &mut Exchange) -> Result<()>;
}
