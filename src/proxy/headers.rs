//! Ordered header list assembled from either whole fields or byte fragments.

use std::borrow::Cow;

use crate::parser::contains_ignore_ascii_case;

/// Which half of the last header pair incoming fragments extend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldState {
    BuildingKey,
    BuildingValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Request,
    Response,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl Header {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }

    fn is(&self, name: &str, token: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.as_bytes())
            && contains_ignore_ascii_case(&self.value, token.as_bytes())
    }
}

/// Append-only header list. Only the last pair is ever mutated.
///
/// Fragment delivery alternates between key and value bytes; `state` records
/// which one the last pair is currently collecting. It starts in
/// `BuildingValue` so that the first key fragment opens a new pair.
#[derive(Debug)]
pub struct HeaderAccumulator {
    headers: Vec<Header>,
    last: Option<usize>,
    state: FieldState,
    side: Side,
    chunked: bool,
    expect_100_continue: bool,
}

impl HeaderAccumulator {
    pub(crate) fn new(side: Side) -> Self {
        Self {
            headers: Vec::new(),
            last: None,
            state: FieldState::BuildingValue,
            side,
            chunked: false,
            expect_100_continue: false,
        }
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn expect_100_continue(&self) -> bool {
        self.expect_100_continue
    }

    pub(crate) fn state(&self) -> FieldState {
        self.state
    }

    /// Append a new pair. The pair stays open for `set_value`.
    pub(crate) fn add(&mut self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.headers.push(Header::new(name, value));
        self.last = Some(self.headers.len() - 1);
        self.state = FieldState::BuildingKey;
        self.inspect_last();
    }

    /// Replace the value of the last pair and close its key.
    pub(crate) fn set_value(&mut self, value: &[u8]) {
        let idx = self.last_index();
        self.state = FieldState::BuildingValue;
        self.headers[idx].value = value.to_vec();
        self.inspect_last();
    }

    /// First value fragment of the last pair.
    pub(crate) fn begin_value(&mut self, fragment: &[u8]) {
        self.set_value(fragment);
    }

    pub(crate) fn append_key(&mut self, fragment: &[u8]) {
        assert_eq!(
            self.state,
            FieldState::BuildingKey,
            "header key fragment while building a value"
        );
        let idx = self.last_index();
        self.headers[idx].name.extend_from_slice(fragment);
    }

    pub(crate) fn append_value(&mut self, fragment: &[u8]) {
        assert_eq!(
            self.state,
            FieldState::BuildingValue,
            "header value fragment while building a key"
        );
        let idx = self.last_index();
        self.headers[idx].value.extend_from_slice(fragment);
        self.inspect_last();
    }

    fn last_index(&self) -> usize {
        self.last.expect("header fragment with no header pair open")
    }

    /// Chunked and 100-continue detection; both flags only ever turn on.
    fn inspect_last(&mut self) {
        let Some(idx) = self.last else {
            return;
        };
        let header = &self.headers[idx];
        if header.is("transfer-encoding", "chunked") {
            self.chunked = true;
        }
        if self.side == Side::Request && header.is("expect", "100-continue") {
            self.expect_100_continue = true;
        }
    }
}
