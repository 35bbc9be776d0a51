//! State of one request/response cycle crossing the proxy.
//!
//! An [`Exchange`] is created when the client opens a stream and lives until the
//! response is complete or the stream is aborted. It owns the backend connection
//! while one is attached, accumulates both header lists, drives the response
//! through the backend parser, and coordinates backpressure in both directions.

use bytes::{Buf, Bytes, BytesMut};
use http::{Method, StatusCode};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::connection::BackendConnection;
use crate::parser::{status_has_no_body, Http1ResponseParser, ResponseParser};
use crate::proxy::adapter::{self, ResponseEvents};
use crate::proxy::body::BodyBuffer;
use crate::proxy::headers::{Header, HeaderAccumulator, Side};
use crate::proxy::ioctrl::{IoControl, PauseReason};
use crate::proxy::{Frontend, MessageState};
use crate::{Error, Result};

/// Stream identifier on either side of the proxy.
pub type StreamId = i32;

#[derive(Debug)]
pub struct Request {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) major: u8,
    pub(crate) minor: u8,
    pub(crate) headers: HeaderAccumulator,
    pub(crate) connection_close: bool,
    pub(crate) state: MessageState,
}

impl Request {
    fn new() -> Self {
        Self {
            method: String::new(),
            path: String::new(),
            major: 1,
            minor: 1,
            headers: HeaderAccumulator::new(Side::Request),
            connection_close: false,
            state: MessageState::Initial,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> (u8, u8) {
        (self.major, self.minor)
    }

    pub fn headers(&self) -> &[Header] {
        self.headers.headers()
    }

    pub fn is_chunked(&self) -> bool {
        self.headers.is_chunked()
    }

    pub fn connection_close(&self) -> bool {
        self.connection_close
    }

    pub fn expect_100_continue(&self) -> bool {
        self.headers.expect_100_continue()
    }

    pub fn state(&self) -> MessageState {
        self.state
    }
}

#[derive(Debug)]
pub struct Response {
    pub(crate) status: u16,
    pub(crate) major: u8,
    pub(crate) minor: u8,
    pub(crate) headers: HeaderAccumulator,
    pub(crate) connection_close: bool,
    pub(crate) state: MessageState,
    pub(crate) body: Option<BodyBuffer>,
}

impl Response {
    fn new() -> Self {
        Self {
            status: 0,
            major: 1,
            minor: 1,
            headers: HeaderAccumulator::new(Side::Response),
            connection_close: false,
            state: MessageState::Initial,
            body: None,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn version(&self) -> (u8, u8) {
        (self.major, self.minor)
    }

    pub fn headers(&self) -> &[Header] {
        self.headers.headers()
    }

    pub fn is_chunked(&self) -> bool {
        self.headers.is_chunked()
    }

    pub fn connection_close(&self) -> bool {
        self.connection_close
    }

    pub fn state(&self) -> MessageState {
        self.state
    }
}

#[derive(Debug)]
pub struct Exchange {
    client_stream_id: StreamId,
    backend_stream_id: Option<StreamId>,
    priority: i32,
    pub(crate) request: Request,
    pub(crate) response: Response,
    backend: Option<Box<dyn BackendConnection>>,
    ioctrl: IoControl,
    response_parser: Option<Box<dyn ResponseParser>>,
    recv_window_size: i32,
    output_upper_threshold: usize,
    body_buffer_upper_threshold: usize,
}

impl Exchange {
    pub fn new(client_stream_id: StreamId, priority: i32, config: &Config) -> Self {
        debug!(
            "Creating exchange for stream {} (priority {})",
            client_stream_id, priority
        );
        Self {
            client_stream_id,
            backend_stream_id: None,
            priority,
            request: Request::new(),
            response: Response::new(),
            backend: None,
            ioctrl: IoControl::new(),
            response_parser: Some(Box::new(Http1ResponseParser::from_config(config))),
            recv_window_size: 0,
            output_upper_threshold: config.output_upper_threshold,
            body_buffer_upper_threshold: config.body_buffer_upper_threshold,
        }
    }

    /// Replace the bundled HTTP/1.x parser with another engine.
    pub fn with_response_parser(mut self, parser: Box<dyn ResponseParser>) -> Self {
        self.response_parser = Some(parser);
        self
    }

    pub fn client_stream_id(&self) -> StreamId {
        self.client_stream_id
    }

    pub fn backend_stream_id(&self) -> Option<StreamId> {
        self.backend_stream_id
    }

    /// Record the stream id the backend assigned. Can only happen once.
    pub fn set_backend_stream_id(&mut self, stream_id: StreamId) -> Result<()> {
        if let Some(existing) = self.backend_stream_id {
            return Err(Error::internal(format!(
                "exchange {} already bound to backend stream {}",
                self.client_stream_id, existing
            )));
        }
        self.backend_stream_id = Some(stream_id);
        Ok(())
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    // Request

    pub fn set_request_method(&mut self, method: impl Into<String>) {
        self.request.method = method.into();
    }

    pub fn set_request_path(&mut self, path: impl Into<String>) {
        self.request.path = path.into();
    }

    pub fn append_request_path(&mut self, fragment: &str) {
        self.request.path.push_str(fragment);
    }

    pub fn set_request_version(&mut self, major: u8, minor: u8) {
        self.request.major = major;
        self.request.minor = minor;
    }

    /// Append a request header delivered as a whole field.
    pub fn add_request_header(&mut self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.request.headers.add(name, value);
    }

    pub fn set_last_request_header_value(&mut self, value: &[u8]) {
        self.request.headers.set_value(value);
    }

    /// A fragment of a request header name, as emitted by an incremental parser.
    pub fn on_request_header_field(&mut self, data: &[u8]) {
        adapter::header_field(&mut self.request.headers, data);
    }

    /// A fragment of a request header value, as emitted by an incremental parser.
    pub fn on_request_header_value(&mut self, data: &[u8]) {
        adapter::header_value(&mut self.request.headers, data);
    }

    pub fn set_request_connection_close(&mut self, close: bool) {
        self.request.connection_close = close;
    }

    pub fn advance_request_state(&mut self, to: MessageState) -> Result<()> {
        self.request.state.advance(to)
    }

    // Response

    /// True when the response must not carry a body whatever its framing
    /// headers announce: replies to HEAD, 1xx, 204 and 304.
    pub fn response_body_suppressed(&self) -> bool {
        self.request.method == Method::HEAD.as_str() || status_has_no_body(self.response.status)
    }

    /// A CONNECT request answered with 2xx: the stream now relays opaque bytes.
    pub fn tunnel_established(&self) -> bool {
        self.request.method == Method::CONNECT.as_str()
            && StatusCode::from_u16(self.response.status).map_or(false, |s| s.is_success())
    }

    // Backend connection

    /// Attach a backend connection, or detach with `None`. Returns the previous
    /// one. Read pausing follows the new connection's read handle.
    pub fn set_backend_connection(
        &mut self,
        backend: Option<Box<dyn BackendConnection>>,
    ) -> Option<Box<dyn BackendConnection>> {
        let handle = backend.as_ref().and_then(|backend| backend.read_handle());
        self.ioctrl.set_handle(handle);
        std::mem::replace(&mut self.backend, backend)
    }

    /// Abort path: release every pause and hand the connection back.
    pub fn detach_backend_connection(&mut self) -> Option<Box<dyn BackendConnection>> {
        self.ioctrl.force_resume_read();
        self.set_backend_connection(None)
    }

    pub fn backend_connection(&self) -> Option<&dyn BackendConnection> {
        self.backend.as_deref()
    }

    pub fn backend_connection_mut(&mut self) -> Option<&mut (dyn BackendConnection + 'static)> {
        self.backend.as_deref_mut()
    }

    pub fn pause_read(&mut self, reason: PauseReason) {
        trace!("Exchange {} pausing backend reads: {:?}", self.client_stream_id, reason);
        self.ioctrl.pause_read(reason);
    }

    pub fn resume_read(&mut self, reason: PauseReason) -> bool {
        self.ioctrl.resume_read(reason)
    }

    pub fn force_resume_read(&mut self) {
        self.ioctrl.force_resume_read();
    }

    pub fn is_read_paused(&self) -> bool {
        self.ioctrl.is_paused()
    }

    pub fn is_read_paused_for(&self, reason: PauseReason) -> bool {
        self.ioctrl.is_paused_for(reason)
    }

    /// Whether enough bytes are queued towards the backend that the frontend
    /// should stop reading request data from the client.
    pub fn output_buffer_full(&self) -> bool {
        self.backend
            .as_ref()
            .map_or(false, |backend| backend.output_len() >= self.output_upper_threshold)
    }

    /// # Panics
    ///
    /// Panics if no backend connection is attached.
    pub fn push_request_headers(&mut self) -> Result<()> {
        let backend = self
            .backend
            .as_mut()
            .expect("push_request_headers called without a backend connection");
        backend.push_request_headers(&self.request)
    }

    /// Forward request body bytes. Without a backend connection this is a
    /// logged no-op.
    pub fn push_upload_data_chunk(&mut self, data: &[u8]) -> Result<usize> {
        match self.backend.as_mut() {
            Some(backend) => backend.push_upload_data_chunk(&self.request, data),
            None => {
                warn!(
                    "Exchange {} dropped {} upload bytes: no backend connection",
                    self.client_stream_id,
                    data.len()
                );
                Ok(0)
            }
        }
    }

    /// # Panics
    ///
    /// Panics if no backend connection is attached.
    pub fn end_upload_data(&mut self) -> Result<()> {
        let backend = self
            .backend
            .as_mut()
            .expect("end_upload_data called without a backend connection");
        backend.end_upload_data(&self.request)
    }

    // Response parsing

    /// Parse whatever the backend connection has buffered, notifying `frontend`
    /// as the response progresses. Consumed bytes are removed from the buffer.
    pub fn parse_http_response(&mut self, frontend: &mut dyn Frontend) -> Result<()> {
        let Some(mut parser) = self.response_parser.take() else {
            return Err(Error::internal("response parser re-entered"));
        };
        let mut input = match self.backend.as_mut() {
            Some(backend) => std::mem::take(backend.input_mut()),
            None => {
                self.response_parser = Some(parser);
                return Err(Error::NoBackend);
            }
        };

        let nread = parser.execute(&input, &mut ResponseEvents::new(self, frontend));
        input.advance(nread);
        self.restore_input(input);
        self.finish_parse(parser)
    }

    /// The backend closed its side of the connection.
    pub fn on_backend_eof(&mut self, frontend: &mut dyn Frontend) -> Result<()> {
        let Some(mut parser) = self.response_parser.take() else {
            return Err(Error::internal("response parser re-entered"));
        };
        parser.finish(&mut ResponseEvents::new(self, frontend));
        self.finish_parse(parser)
    }

    /// Put unparsed bytes back in front of anything that arrived meanwhile.
    fn restore_input(&mut self, mut input: BytesMut) {
        if let Some(backend) = self.backend.as_mut() {
            let arrived = std::mem::take(backend.input_mut());
            input.extend_from_slice(&arrived);
            *backend.input_mut() = input;
        }
    }

    fn finish_parse(&mut self, parser: Box<dyn ResponseParser>) -> Result<()> {
        let outcome = parser.error().cloned();
        self.response_parser = Some(parser);
        match outcome {
            None => Ok(()),
            Some(err) => {
                debug!(
                    "Exchange {} backend HTTP parser failure: {}",
                    self.client_stream_id, err
                );
                Err(Error::HttpParse(err))
            }
        }
    }

    // Response body staging

    pub fn init_response_body_buf(&mut self) {
        self.response.body.get_or_insert_with(BodyBuffer::new);
    }

    pub fn response_body_buf(&self) -> Option<&BodyBuffer> {
        self.response.body.as_ref()
    }

    pub fn append_response_body(&mut self, data: &[u8]) {
        self.response
            .body
            .get_or_insert_with(BodyBuffer::new)
            .append(data);
    }

    /// Take up to `max` staged body bytes.
    pub fn drain_response_body(&mut self, max: usize) -> Bytes {
        let Some(body) = self.response.body.as_mut() else {
            return Bytes::new();
        };
        let drained = body.drain(max);
        if drained.low_watermark {
            self.on_body_buf_drained();
        }
        drained.data
    }

    /// Drop `n` staged body bytes already written out from `chunk()`.
    pub fn consume_response_body(&mut self, n: usize) {
        let emptied = match self.response.body.as_mut() {
            Some(body) => body.discard(n),
            None => false,
        };
        if emptied {
            self.on_body_buf_drained();
        }
    }

    pub fn response_body_buf_full(&self) -> bool {
        self.response
            .body
            .as_ref()
            .map_or(false, |body| body.len() >= self.body_buffer_upper_threshold)
    }

    fn on_body_buf_drained(&mut self) {
        trace!("Exchange {} response body buffer drained", self.client_stream_id);
        self.ioctrl.resume_read(PauseReason::NoBuffer);
    }

    // Flow control

    pub fn recv_window_size(&self) -> i32 {
        self.recv_window_size
    }

    pub fn set_recv_window_size(&mut self, size: i32) {
        self.recv_window_size = size;
    }

    pub fn inc_recv_window_size(&mut self, amount: i32) {
        self.recv_window_size = self.recv_window_size.saturating_add(amount);
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        debug!(
            "Deleting exchange for stream {} (backend attached: {}, body staged: {})",
            self.client_stream_id,
            self.backend.is_some(),
            self.response.body.as_ref().map_or(0, BodyBuffer::len)
        );
    }
}
