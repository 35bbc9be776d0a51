//! Backend connection interface and an in-memory implementation.

use std::cell::Cell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};

use crate::proxy::Request;
use crate::Result;

/// Read-interest switch of a backend socket in the event loop.
pub trait ReadHandle: fmt::Debug {
    fn enable_read(&self);
    fn disable_read(&self);
}

/// A [`ReadHandle`] that only records whether reads are wanted, for loops that
/// poll it before reading.
#[derive(Debug)]
pub struct ReadInterest {
    enabled: Cell<bool>,
}

impl ReadInterest {
    pub fn new() -> Self {
        Self {
            enabled: Cell::new(true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }
}

impl Default for ReadInterest {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadHandle for ReadInterest {
    fn enable_read(&self) {
        self.enabled.set(true);
    }

    fn disable_read(&self) {
        self.enabled.set(false);
    }
}

/// The HTTP/1.x connection an exchange forwards its request over.
pub trait BackendConnection: fmt::Debug {
    fn read_handle(&self) -> Option<Rc<dyn ReadHandle>>;

    /// Bytes received from the backend and not yet parsed.
    fn input_mut(&mut self) -> &mut BytesMut;

    /// Bytes queued towards the backend and not yet written.
    fn output_len(&self) -> usize;

    fn push_request_headers(&mut self, request: &Request) -> Result<()>;

    /// Queue a piece of the request body. Returns the number of body bytes taken.
    fn push_upload_data_chunk(&mut self, request: &Request, data: &[u8]) -> Result<usize>;

    fn end_upload_data(&mut self, request: &Request) -> Result<()>;
}

/// Backend connection kept entirely in memory. The event loop (or a test)
/// moves bytes in with [`feed_input`](Self::feed_input) and out with
/// [`take_output`](Self::take_output).
#[derive(Debug)]
pub struct BufferedConnection {
    input: BytesMut,
    output: BytesMut,
    read_interest: Rc<ReadInterest>,
}

impl BufferedConnection {
    pub fn new() -> Self {
        Self {
            input: BytesMut::new(),
            output: BytesMut::new(),
            read_interest: Rc::new(ReadInterest::new()),
        }
    }

    pub fn read_interest(&self) -> Rc<ReadInterest> {
        self.read_interest.clone()
    }

    pub fn feed_input(&mut self, data: &[u8]) {
        self.input.extend_from_slice(data);
    }

    pub fn take_output(&mut self) -> Bytes {
        self.output.split().freeze()
    }
}

impl Default for BufferedConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendConnection for BufferedConnection {
    fn read_handle(&self) -> Option<Rc<dyn ReadHandle>> {
        Some(self.read_interest.clone())
    }

    fn input_mut(&mut self) -> &mut BytesMut {
        &mut self.input
    }

    fn output_len(&self) -> usize {
        self.output.len()
    }

    fn push_request_headers(&mut self, request: &Request) -> Result<()> {
        let (major, minor) = request.version();
        let mut head = Vec::new();
        write!(
            head,
            "{} {} HTTP/{}.{}\r\n",
            request.method(),
            request.path(),
            major,
            minor
        )?;
        for header in request.headers() {
            // HTTP/2 pseudo-headers have no HTTP/1.x counterpart.
            if header.name.starts_with(b":") {
                continue;
            }
            head.extend_from_slice(&header.name);
            head.extend_from_slice(b": ");
            head.extend_from_slice(&header.value);
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");
        self.output.extend_from_slice(&head);
        Ok(())
    }

    fn push_upload_data_chunk(&mut self, request: &Request, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        if request.is_chunked() {
            self.output
                .extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
            self.output.extend_from_slice(data);
            self.output.extend_from_slice(b"\r\n");
        } else {
            self.output.extend_from_slice(data);
        }
        Ok(data.len())
    }

    fn end_upload_data(&mut self, request: &Request) -> Result<()> {
        if request.is_chunked() {
            self.output.extend_from_slice(b"0\r\n\r\n");
        }
        Ok(())
    }
}
