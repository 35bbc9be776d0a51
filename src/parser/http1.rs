//! HTTP/1.x response parser built on `httparse`.
//!
//! The header block is parsed in one go once it is fully buffered; nothing is
//! consumed before that. Each header is then reported as one field event and one
//! value event. Bodies are framed by `Transfer-Encoding: chunked`, by
//! `Content-Length`, or run until the backend closes the connection.

use tracing::debug;

use super::chunked::{ChunkedDecoder, Step};
use super::{
    contains_ignore_ascii_case, status_has_no_body, BodyDisposition, Callback, ParseError,
    ParserEvents, ResponseHead, ResponseParser,
};
use crate::config::Config;

#[derive(Debug)]
enum Body {
    Length(u64),
    Chunked(ChunkedDecoder),
    UntilEof,
}

#[derive(Debug)]
enum State {
    Head,
    Body(Body),
    Done,
}

/// Framing-relevant facts gathered from the header block.
#[derive(Debug, Default)]
struct Framing {
    chunked: bool,
    content_length: Option<u64>,
    close: bool,
    keep_alive: bool,
}

impl Framing {
    fn inspect(headers: &[httparse::Header<'_>]) -> Result<Self, ParseError> {
        let mut framing = Framing::default();
        for header in headers {
            if header.name.eq_ignore_ascii_case("transfer-encoding") {
                if contains_ignore_ascii_case(header.value, b"chunked") {
                    framing.chunked = true;
                }
            } else if header.name.eq_ignore_ascii_case("content-length") {
                let length = parse_content_length(header.value)?;
                match framing.content_length {
                    Some(previous) if previous != length => {
                        return Err(ParseError::InvalidContentLength)
                    }
                    _ => framing.content_length = Some(length),
                }
            } else if header.name.eq_ignore_ascii_case("connection") {
                for token in header.value.split(|&b| b == b',') {
                    let token = trim_ascii_whitespace(token);
                    if token.eq_ignore_ascii_case(b"close") {
                        framing.close = true;
                    } else if token.eq_ignore_ascii_case(b"keep-alive") {
                        framing.keep_alive = true;
                    }
                }
            }
        }
        Ok(framing)
    }
}

#[derive(Debug)]
pub struct Http1ResponseParser {
    state: State,
    max_header_fields: usize,
    max_head_size: usize,
    error: Option<ParseError>,
}

impl Http1ResponseParser {
    pub fn new(max_header_fields: usize, max_head_size: usize) -> Self {
        Self {
            state: State::Head,
            max_header_fields,
            max_head_size,
            error: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_header_fields, config.max_head_size)
    }

    /// Run one parsing step. `Ok(None)` means more input is needed.
    fn step(
        &mut self,
        data: &[u8],
        events: &mut dyn ParserEvents,
    ) -> Result<Option<usize>, ParseError> {
        match self.state {
            State::Head => self.parse_head(data, events),
            State::Body(Body::Length(ref mut remaining)) => {
                if data.is_empty() {
                    return Ok(None);
                }
                let take = (*remaining).min(data.len() as u64) as usize;
                *remaining -= take as u64;
                let done = *remaining == 0;
                events
                    .on_body(&data[..take])
                    .map_err(|_| ParseError::Callback(Callback::Body))?;
                if done {
                    self.complete(events)?;
                }
                Ok(Some(take))
            }
            State::Body(Body::Chunked(ref mut decoder)) => match decoder.step(data)? {
                Step::NeedMore => Ok(None),
                Step::Skip(n) => Ok(Some(n)),
                Step::Data(chunk) => {
                    events
                        .on_body(chunk)
                        .map_err(|_| ParseError::Callback(Callback::Body))?;
                    Ok(Some(chunk.len()))
                }
                Step::Finished { consumed, trailers } => {
                    for trailer in &trailers {
                        events
                            .on_header_field(trailer.name.as_bytes())
                            .map_err(|_| ParseError::Callback(Callback::HeaderField))?;
                        events
                            .on_header_value(trailer.value)
                            .map_err(|_| ParseError::Callback(Callback::HeaderValue))?;
                    }
                    self.complete(events)?;
                    Ok(Some(consumed))
                }
            },
            State::Body(Body::UntilEof) => {
                if data.is_empty() {
                    return Ok(None);
                }
                events
                    .on_body(data)
                    .map_err(|_| ParseError::Callback(Callback::Body))?;
                Ok(Some(data.len()))
            }
            State::Done if data.is_empty() => Ok(None),
            State::Done => Err(ParseError::DataAfterMessage),
        }
    }

    fn parse_head(
        &mut self,
        data: &[u8],
        events: &mut dyn ParserEvents,
    ) -> Result<Option<usize>, ParseError> {
        let mut headers = vec![httparse::EMPTY_HEADER; self.max_header_fields];
        let mut response = httparse::Response::new(&mut headers);

        let head_len = match response.parse(data)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => {
                if data.len() > self.max_head_size {
                    return Err(ParseError::HeadTooLarge {
                        limit: self.max_head_size,
                    });
                }
                return Ok(None);
            }
        };
        if head_len > self.max_head_size {
            return Err(ParseError::HeadTooLarge {
                limit: self.max_head_size,
            });
        }

        let status = response.code.unwrap_or_default();
        let minor = response.version.unwrap_or(1);

        // Interim responses precede the real one; 101 ends HTTP/1.x on the connection.
        if (100..200).contains(&status) && status != 101 {
            debug!("Skipping interim {} response ({} bytes)", status, head_len);
            return Ok(Some(head_len));
        }

        let framing = Framing::inspect(response.headers)?;

        for header in response.headers.iter() {
            events
                .on_header_field(header.name.as_bytes())
                .map_err(|_| ParseError::Callback(Callback::HeaderField))?;
            events
                .on_header_value(header.value)
                .map_err(|_| ParseError::Callback(Callback::HeaderValue))?;
        }

        let bodyless = status_has_no_body(status);
        let needs_eof = !bodyless && !framing.chunked && framing.content_length.is_none();
        let keep_alive = !needs_eof
            && if minor >= 1 {
                !framing.close
            } else {
                framing.keep_alive
            };
        let head = ResponseHead {
            status,
            major: 1,
            minor,
            keep_alive,
        };

        let disposition = events
            .on_headers_complete(&head)
            .map_err(|_| ParseError::Callback(Callback::HeadersComplete))?;

        if disposition == BodyDisposition::Skip || bodyless {
            self.complete(events)?;
        } else if framing.chunked {
            self.state = State::Body(Body::Chunked(ChunkedDecoder::new(
                self.max_header_fields,
            )));
        } else {
            match framing.content_length {
                Some(0) => self.complete(events)?,
                Some(length) => self.state = State::Body(Body::Length(length)),
                None => self.state = State::Body(Body::UntilEof),
            }
        }
        Ok(Some(head_len))
    }

    fn complete(&mut self, events: &mut dyn ParserEvents) -> Result<(), ParseError> {
        self.state = State::Done;
        events
            .on_message_complete()
            .map_err(|_| ParseError::Callback(Callback::MessageComplete))
    }
}

impl ResponseParser for Http1ResponseParser {
    fn execute(&mut self, data: &[u8], events: &mut dyn ParserEvents) -> usize {
        if self.error.is_some() {
            return 0;
        }
        let mut consumed = 0;
        loop {
            match self.step(&data[consumed..], events) {
                Ok(Some(n)) => consumed += n,
                Ok(None) => break,
                Err(err) => {
                    debug!("HTTP/1 response parser failed after {} bytes: {}", consumed, err);
                    self.error = Some(err);
                    break;
                }
            }
        }
        consumed
    }

    fn finish(&mut self, events: &mut dyn ParserEvents) {
        if self.error.is_some() {
            return;
        }
        match self.state {
            State::Body(Body::UntilEof) => {
                if let Err(err) = self.complete(events) {
                    self.error = Some(err);
                }
            }
            State::Done => {}
            State::Head | State::Body(_) => self.error = Some(ParseError::UnexpectedEof),
        }
    }

    fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

}

fn parse_content_length(value: &[u8]) -> Result<u64, ParseError> {
    let value = trim_ascii_whitespace(value);
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidContentLength);
    }
    std::str::from_utf8(value)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or(ParseError::InvalidContentLength)
}

fn trim_ascii_whitespace(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Field(Vec<u8>),
        Value(Vec<u8>),
        Headers(ResponseHead),
        Body(Vec<u8>),
        Complete,
    }

    struct Recorder {
        events: Vec<Event>,
        disposition: BodyDisposition,
        reject_headers: bool,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                events: Vec::new(),
                disposition: BodyDisposition::Read,
                reject_headers: false,
            }
        }

        fn body(&self) -> Vec<u8> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    Event::Body(data) => Some(data.clone()),
                    _ => None,
                })
                .flatten()
                .collect()
        }

        fn head(&self) -> Option<ResponseHead> {
            self.events.iter().find_map(|event| match event {
                Event::Headers(head) => Some(*head),
                _ => None,
            })
        }
    }

    impl ParserEvents for Recorder {
        fn on_header_field(&mut self, data: &[u8]) -> crate::Result<()> {
            self.events.push(Event::Field(data.to_vec()));
            Ok(())
        }

        fn on_header_value(&mut self, data: &[u8]) -> crate::Result<()> {
            self.events.push(Event::Value(data.to_vec()));
            Ok(())
        }

        fn on_headers_complete(&mut self, head: &ResponseHead) -> crate::Result<BodyDisposition> {
            self.events.push(Event::Headers(*head));
            if self.reject_headers {
                return Err(Error::frontend("rejected"));
            }
            Ok(self.disposition)
        }

        fn on_body(&mut self, data: &[u8]) -> crate::Result<()> {
            self.events.push(Event::Body(data.to_vec()));
            Ok(())
        }

        fn on_message_complete(&mut self) -> crate::Result<()> {
            self.events.push(Event::Complete);
            Ok(())
        }
    }

    /// Feed `chunks` the way a connection buffer would: unconsumed bytes stay
    /// and new bytes are appended.
    fn feed(parser: &mut Http1ResponseParser, recorder: &mut Recorder, chunks: &[&[u8]]) {
        let mut buffer = Vec::new();
        for chunk in chunks {
            buffer.extend_from_slice(chunk);
            let consumed = parser.execute(&buffer, recorder);
            buffer.drain(..consumed);
        }
    }

    fn parser() -> Http1ResponseParser {
        Http1ResponseParser::new(100, 64 * 1024)
    }

    fn is_done(parser: &Http1ResponseParser) -> bool {
        matches!(parser.state, State::Done)
    }

    #[test]
    fn test_content_length_body_at_every_split_point() {
        let raw: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nServer: test\r\n\r\nhello";
        for split in 1..raw.len() {
            let mut parser = parser();
            let mut recorder = Recorder::new();
            feed(&mut parser, &mut recorder, &[&raw[..split], &raw[split..]]);

            assert_eq!(recorder.body(), b"hello", "split at {}", split);
            assert!(is_done(&parser));
            assert_eq!(recorder.events.last(), Some(&Event::Complete));
            assert_eq!(
                recorder.events[..4],
                [
                    Event::Field(b"Content-Length".to_vec()),
                    Event::Value(b"5".to_vec()),
                    Event::Field(b"Server".to_vec()),
                    Event::Value(b"test".to_vec()),
                ]
            );
        }
    }

    #[test]
    fn test_chunked_body() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        feed(
            &mut parser,
            &mut recorder,
            &[
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWi",
                b"ki\r\n5\r\npedia\r\n0\r\n",
                b"\r\n",
            ],
        );
        assert_eq!(recorder.body(), b"Wikipedia");
        assert!(is_done(&parser));
        assert!(recorder.head().unwrap().keep_alive);
    }

    #[test]
    fn test_skip_disposition_ignores_content_length() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        recorder.disposition = BodyDisposition::Skip;
        feed(
            &mut parser,
            &mut recorder,
            &[b"HTTP/1.1 200 OK\r\nContent-Length: 120\r\n\r\n"],
        );
        assert!(recorder.body().is_empty());
        let tail = &recorder.events[recorder.events.len() - 2..];
        assert!(matches!(tail, [Event::Headers(_), Event::Complete]));
        assert!(is_done(&parser));
    }

    #[test]
    fn test_bodyless_status_ignores_framing() {
        for status in ["204 No Content", "304 Not Modified", "101 Switching Protocols"] {
            let mut parser = parser();
            let mut recorder = Recorder::new();
            let raw = format!(
                "HTTP/1.1 {}\r\nContent-Length: 10\r\nTransfer-Encoding: chunked\r\n\r\n",
                status
            );
            feed(&mut parser, &mut recorder, &[raw.as_bytes()]);
            assert!(recorder.body().is_empty(), "{}", status);
            assert!(is_done(&parser), "{}", status);
            assert!(parser.error().is_none(), "{}", status);
        }
    }

    #[test]
    fn test_read_until_eof() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        feed(&mut parser, &mut recorder, &[b"HTTP/1.0 200 OK\r\n\r\nabc", b"def"]);
        assert!(!is_done(&parser));

        parser.finish(&mut recorder);
        assert!(is_done(&parser));
        assert!(parser.error().is_none());
        assert_eq!(recorder.body(), b"abcdef");
        assert!(!recorder.head().unwrap().keep_alive);
    }

    #[test]
    fn test_eof_inside_length_body() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        feed(
            &mut parser,
            &mut recorder,
            &[b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc"],
        );
        parser.finish(&mut recorder);
        assert_eq!(parser.error(), Some(&ParseError::UnexpectedEof));
        assert!(!recorder.events.contains(&Event::Complete));
    }

    #[test]
    fn test_eof_before_any_response() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        parser.finish(&mut recorder);
        assert_eq!(parser.error(), Some(&ParseError::UnexpectedEof));
    }

    #[test]
    fn test_data_after_message() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        feed(
            &mut parser,
            &mut recorder,
            &[b"HTTP/1.1 204 No Content\r\n\r\nHTTP/1.1 200 OK\r\n\r\n"],
        );
        assert_eq!(parser.error(), Some(&ParseError::DataAfterMessage));
    }

    #[test]
    fn test_malformed_status_line() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        feed(&mut parser, &mut recorder, &[b"HTTP/1.1 abc OK\r\n\r\n"]);
        assert_eq!(
            parser.error(),
            Some(&ParseError::Head(httparse::Error::Status))
        );
        assert!(recorder.events.is_empty());
    }

    #[test]
    fn test_too_many_headers() {
        let mut parser = Http1ResponseParser::new(2, 1024);
        let mut recorder = Recorder::new();
        feed(
            &mut parser,
            &mut recorder,
            &[b"HTTP/1.1 200 OK\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n"],
        );
        assert_eq!(
            parser.error(),
            Some(&ParseError::Head(httparse::Error::TooManyHeaders))
        );
    }

    #[test]
    fn test_head_too_large() {
        let mut parser = Http1ResponseParser::new(10, 32);
        let mut recorder = Recorder::new();
        feed(
            &mut parser,
            &mut recorder,
            &[b"HTTP/1.1 200 OK\r\nX-Padding: aaaaaaaaaaaaaaaaaaaaaaaa"],
        );
        assert_eq!(parser.error(), Some(&ParseError::HeadTooLarge { limit: 32 }));
    }

    #[test]
    fn test_keep_alive_determination() {
        let cases: [(&[u8], bool); 4] = [
            (b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n", true),
            (b"HTTP/1.1 200 OK\r\nConnection: Upgrade, close\r\nContent-Length: 0\r\n\r\n", false),
            (b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n", false),
            (b"HTTP/1.0 200 OK\r\nConnection: keep-alive\r\nContent-Length: 0\r\n\r\n", true),
        ];
        for (raw, expected) in cases {
            let mut parser = parser();
            let mut recorder = Recorder::new();
            feed(&mut parser, &mut recorder, &[raw]);
            assert_eq!(
                recorder.head().unwrap().keep_alive,
                expected,
                "{}",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn test_rejected_headers_stop_before_body() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        recorder.reject_headers = true;
        feed(
            &mut parser,
            &mut recorder,
            &[b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc"],
        );
        assert_eq!(
            parser.error(),
            Some(&ParseError::Callback(Callback::HeadersComplete))
        );
        assert!(recorder.body().is_empty());
    }

    #[test]
    fn test_conflicting_content_length() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        feed(
            &mut parser,
            &mut recorder,
            &[b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\n"],
        );
        assert_eq!(parser.error(), Some(&ParseError::InvalidContentLength));
    }

    #[test]
    fn test_interim_response_is_skipped() {
        let raw: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
        for split in 1..raw.len() {
            let mut parser = parser();
            let mut recorder = Recorder::new();
            feed(&mut parser, &mut recorder, &[&raw[..split], &raw[split..]]);

            assert!(parser.error().is_none(), "split at {}", split);
            assert_eq!(recorder.head().unwrap().status, 200);
            assert_eq!(
                recorder.events,
                [
                    Event::Field(b"Content-Length".to_vec()),
                    Event::Value(b"2".to_vec()),
                    Event::Headers(recorder.head().unwrap()),
                    Event::Body(b"ok".to_vec()),
                    Event::Complete,
                ]
            );
        }
    }

    #[test]
    fn test_several_interim_responses() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        feed(
            &mut parser,
            &mut recorder,
            &[b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 103 Early Hints\r\nLink: </a.css>\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n"],
        );
        assert!(is_done(&parser));
        assert_eq!(recorder.head().unwrap().status, 204);
        assert!(!recorder.events.contains(&Event::Field(b"Link".to_vec())));
    }

    #[test]
    fn test_trailers_reported_as_header_events() {
        let mut parser = parser();
        let mut recorder = Recorder::new();
        feed(
            &mut parser,
            &mut recorder,
            &[b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nok\r\n0\r\nX-Checksum: abc\r\n\r\n"],
        );
        assert!(is_done(&parser));
        let tail = &recorder.events[recorder.events.len() - 4..];
        assert_eq!(
            tail,
            [
                Event::Body(b"ok".to_vec()),
                Event::Field(b"X-Checksum".to_vec()),
                Event::Value(b"abc".to_vec()),
                Event::Complete,
            ]
        );
    }

    #[test]
    fn test_malformed_chunk_size_rejected() {
        for size in ["+5", " 5", "5 5", "0x5"] {
            let mut parser = parser();
            let mut recorder = Recorder::new();
            let raw = format!(
                "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n{}\r\nhello\r\n0\r\n\r\n",
                size
            );
            feed(&mut parser, &mut recorder, &[raw.as_bytes()]);
            assert_eq!(
                parser.error(),
                Some(&ParseError::InvalidChunkSize),
                "{:?}",
                size
            );
            assert!(recorder.body().is_empty(), "{:?}", size);
            assert!(!recorder.events.contains(&Event::Complete), "{:?}", size);
        }
    }

    #[test]
    fn test_trim_ascii_whitespace() {
        assert_eq!(trim_ascii_whitespace(b"  close \t"), b"close");
        assert_eq!(trim_ascii_whitespace(b"   "), b"");
    }
}
