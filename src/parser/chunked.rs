//! Decoder for `Transfer-Encoding: chunked` bodies.

use super::ParseError;

/// Longest chunk-size line or trailer block accepted before giving up.
const MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
}

/// Outcome of one decoding step. Every variant except `NeedMore` consumes at
/// least one byte.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step<'a> {
    NeedMore,
    Skip(usize),
    Data(&'a [u8]),
    /// The last chunk and the trailer block, `consumed` bytes in total.
    Finished {
        consumed: usize,
        trailers: Vec<httparse::Header<'a>>,
    },
}

#[derive(Debug)]
pub(crate) struct ChunkedDecoder {
    state: ChunkState,
    max_trailers: usize,
}

impl ChunkedDecoder {
    pub(crate) fn new(max_trailers: usize) -> Self {
        Self {
            state: ChunkState::Size,
            max_trailers,
        }
    }

    pub(crate) fn step<'a>(&mut self, data: &'a [u8]) -> Result<Step<'a>, ParseError> {
        match self.state {
            ChunkState::Size => {
                let Some(&first) = data.first() else {
                    return Ok(Step::NeedMore);
                };
                // httparse reads an empty size line as zero.
                if !first.is_ascii_hexdigit() {
                    return Err(ParseError::InvalidChunkSize);
                }
                match httparse::parse_chunk_size(data) {
                    Ok(httparse::Status::Complete((consumed, size))) => {
                        self.state = if size == 0 {
                            ChunkState::Trailers
                        } else {
                            ChunkState::Data(size)
                        };
                        Ok(Step::Skip(consumed))
                    }
                    Ok(httparse::Status::Partial) if data.len() > MAX_LINE_LEN => {
                        Err(ParseError::InvalidChunkSize)
                    }
                    Ok(httparse::Status::Partial) => Ok(Step::NeedMore),
                    Err(_) => Err(ParseError::InvalidChunkSize),
                }
            }
            ChunkState::Data(remaining) => {
                if data.is_empty() {
                    return Ok(Step::NeedMore);
                }
                let take = remaining.min(data.len() as u64) as usize;
                let left = remaining - take as u64;
                self.state = if left == 0 {
                    ChunkState::DataEnd
                } else {
                    ChunkState::Data(left)
                };
                Ok(Step::Data(&data[..take]))
            }
            ChunkState::DataEnd => {
                if data.len() < 2 {
                    return match data {
                        [] | [b'\r'] => Ok(Step::NeedMore),
                        _ => Err(ParseError::InvalidChunkTerminator),
                    };
                }
                if &data[..2] != b"\r\n" {
                    return Err(ParseError::InvalidChunkTerminator);
                }
                self.state = ChunkState::Size;
                Ok(Step::Skip(2))
            }
            ChunkState::Trailers => {
                let mut headers: Vec<httparse::Header<'a>> =
                    vec![httparse::EMPTY_HEADER; self.max_trailers];
                let (consumed, count) = match httparse::parse_headers(data, &mut headers) {
                    Ok(httparse::Status::Complete((consumed, parsed))) => (consumed, parsed.len()),
                    Ok(httparse::Status::Partial) if data.len() > MAX_LINE_LEN => {
                        return Err(ParseError::HeadTooLarge {
                            limit: MAX_LINE_LEN,
                        })
                    }
                    Ok(httparse::Status::Partial) => return Ok(Step::NeedMore),
                    Err(err) => return Err(ParseError::Trailers(err)),
                };
                headers.truncate(count);
                Ok(Step::Finished {
                    consumed,
                    trailers: headers,
                })
            }
        }
    }
}
