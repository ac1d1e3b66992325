use crate::error::{Error, Result};
use crate::model::header::{CONTENT_ENCODING, CONTENT_LENGTH, TRANSFER_ENCODING};
use crate::model::{
    Body, ChunkedTransferPayload, HeaderMap, HeaderName, HeaderValue, Method, Response,
    StatusCode, Version,
};
use crate::utils::{invalid_data_error, unexpected_eof_error};
use httparse::Header;
use std::cmp::min;
use std::io::{self, BufRead, Read};

const DEFAULT_SIZE: usize = 1024;
const MAX_HEADER_SIZE: u64 = 8 * 1024;

/// How the end of a response body is found.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum BodyFraming {
    /// There is no body at all.
    Empty,
    /// `content-length` bytes.
    Sized(u64),
    /// Chunked transfer encoding.
    Chunked,
    /// Everything until the server closes the connection.
    UntilClose,
}

/// Decodes a full response whose body is lazily read from `reader`.
///
/// `method` is the method of the request this response answers, a response to `HEAD` never has a body.
pub fn decode_response<'a>(
    mut reader: impl BufRead + 'a,
    method: &Method,
) -> Result<(Response<'a>, BodyFraming)> {
    let (version, status, reason, headers) = decode_response_head(&mut reader)?;
    let framing = body_framing(method, status, &headers)?;
    let body = decode_body(framing, &headers, reader)?;
    Ok((
        Response::from_parts(version, status, reason, headers, body),
        framing,
    ))
}

/// Reads status lines and headers, skipping interim `1xx` responses.
fn decode_response_head(
    reader: &mut impl BufRead,
) -> Result<(Version, StatusCode, String, HeaderMap)> {
    loop {
        let buffer = read_header_bytes(&mut *reader)?;
        let mut headers = [httparse::EMPTY_HEADER; DEFAULT_SIZE];
        let mut parsed_response = httparse::Response::new(&mut headers);
        if parsed_response
            .parse(&buffer)
            .map_err(|e| Error::protocol(format!("Invalid HTTP response head: {e}")))?
            .is_partial()
        {
            return Err(Error::protocol(
                "Partial HTTP headers containing two line jumps",
            ));
        }

        let version = match parsed_response.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            Some(version) => {
                return Err(Error::protocol(format!(
                    "Unsupported HTTP version 1.{version}"
                )))
            }
            None => return Err(Error::protocol("No version in the HTTP response")),
        };
        let status = StatusCode::from_u16(
            parsed_response
                .code
                .ok_or_else(|| Error::protocol("No status code in the HTTP response"))?,
        )
        .map_err(|e| Error::protocol(format!("Invalid status code: {e}")))?;
        if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
            continue; // e.g. 100 Continue, the final response follows
        }

        let mut header_map = HeaderMap::new();
        decode_headers(parsed_response.headers, &mut header_map).map_err(Error::from)?;
        return Ok((
            version,
            status,
            parsed_response.reason.unwrap_or_default().to_owned(),
            header_map,
        ));
    }
}

fn read_header_bytes(reader: impl BufRead) -> Result<Vec<u8>> {
    let mut reader = reader.take(2 * MAX_HEADER_SIZE); // Makes sure we do not buffer too much
    let mut buffer = Vec::with_capacity(DEFAULT_SIZE);
    loop {
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            return Err(Error::protocol(if buffer.is_empty() {
                "Empty HTTP response"
            } else {
                "Interrupted HTTP response"
            }));
        }
        // We normalize line ends to plain \n
        if buffer.ends_with(b"\r\n") {
            buffer.pop();
            buffer.pop();
            buffer.push(b'\n')
        }
        if buffer.len() > (MAX_HEADER_SIZE as usize) {
            return Err(Error::protocol("The headers size should fit in 8kb"));
        }
        if buffer.ends_with(b"\n\n") {
            break; // end of buffer
        }
    }
    Ok(buffer)
}

/// Picks the body delimitation following [RFC 9112](https://httpwg.org/specs/rfc9112.html#message.body.length).
pub fn body_framing(
    method: &Method,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<BodyFraming> {
    if *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(BodyFraming::Empty);
    }
    if let Some(transfer_encoding) = headers.get(TRANSFER_ENCODING) {
        let transfer_encoding = transfer_encoding
            .to_str()
            .map_err(|e| Error::protocol(format!("Invalid transfer-encoding header: {e}")))?;
        let last_coding = transfer_encoding.rsplit(',').next().unwrap_or_default();
        return Ok(if last_coding.trim().eq_ignore_ascii_case("chunked") {
            BodyFraming::Chunked
        } else {
            BodyFraming::UntilClose
        });
    }
    if let Some(content_length) = headers.get(CONTENT_LENGTH) {
        let len = content_length
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                Error::protocol(format!(
                    "Invalid content-length header: {}",
                    String::from_utf8_lossy(content_length.as_bytes())
                ))
            })?;
        return Ok(if len == 0 {
            BodyFraming::Empty
        } else {
            BodyFraming::Sized(len)
        });
    }
    Ok(BodyFraming::UntilClose)
}

fn decode_body<'a>(
    framing: BodyFraming,
    headers: &HeaderMap,
    reader: impl BufRead + 'a,
) -> Result<Body<'a>> {
    let body = match framing {
        BodyFraming::Empty => return Ok(Body::empty()),
        BodyFraming::Sized(len) => Body::from_read_and_len(reader, len),
        BodyFraming::Chunked => Body::from_chunked_transfer_payload(ChunkedDecoder::new(reader)),
        BodyFraming::UntilClose => Body::from_read_until_close(reader),
    };
    decode_content_encoding(body, headers)
}

fn decode_headers(from: &[Header<'_>], to: &mut HeaderMap) -> io::Result<()> {
    for header in from {
        // The last value of a repeated header wins
        to.insert(
            HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| invalid_data_error(format!("Invalid header name: {e}")))?,
            HeaderValue::from_bytes(header.value)
                .map_err(|e| invalid_data_error(format!("Invalid header value: {e}")))?,
        );
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn decode_content_encoding<'a>(body: Body<'a>, headers: &HeaderMap) -> Result<Body<'a>> {
    let Some(content_encoding) = headers.get(CONTENT_ENCODING) else {
        return Ok(body);
    };
    match content_encoding.as_bytes() {
        #[cfg(feature = "flate2")]
        b"gzip" => Ok(body.decode_gzip()),
        #[cfg(feature = "flate2")]
        b"deflate" => Ok(body.decode_deflate()),
        _ => Ok(body),
    }
}

/// Bound on a chunk size line, extensions included.
const MAX_CHUNK_LINE_SIZE: usize = 1024;
const MAX_TRAILERS_SIZE: usize = 8 * 1024;

#[derive(Clone, Copy)]
enum ChunkedState {
    SizeLine,
    Data { remaining: usize },
    DataEnd,
    Done,
}

struct ChunkedDecoder<R: BufRead> {
    reader: R,
    line: Vec<u8>,
    state: ChunkedState,
    trailers: Option<HeaderMap>,
}

impl<R: BufRead> ChunkedDecoder<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(MAX_CHUNK_LINE_SIZE),
            state: ChunkedState::SizeLine,
            trailers: None,
        }
    }

    fn read_size_line(&mut self) -> io::Result<usize> {
        self.line.clear();
        read_bounded_line(
            &mut self.reader,
            &mut self.line,
            MAX_CHUNK_LINE_SIZE,
            "The chunk size line should fit in 1kb",
        )?;
        let Ok(httparse::Status::Complete((read, size))) = httparse::parse_chunk_size(&self.line)
        else {
            return Err(invalid_data_error("Invalid chunked header"));
        };
        if read != self.line.len() {
            return Err(invalid_data_error("Chunked header containing a line jump"));
        }
        size.try_into().map_err(invalid_data_error)
    }

    fn read_data_end(&mut self) -> io::Result<()> {
        self.line.clear();
        read_bounded_line(
            &mut self.reader,
            &mut self.line,
            2,
            "Invalid chunked element end",
        )?;
        if self.line != b"\r\n" && self.line != b"\n" {
            return Err(invalid_data_error("Invalid chunked element end"));
        }
        Ok(())
    }

    fn read_trailers(&mut self) -> io::Result<HeaderMap> {
        // The leading \n makes an empty trailer section end with \n\n too
        let mut section = vec![b'\n'];
        while !section.ends_with(b"\n\n") {
            let budget = MAX_TRAILERS_SIZE.saturating_sub(section.len() - 1);
            read_bounded_line(
                &mut self.reader,
                &mut section,
                budget,
                "The trailers size should fit in 8kb",
            )?;
            if section.ends_with(b"\r\n") {
                section.truncate(section.len() - 2);
                section.push(b'\n');
            }
        }
        let mut headers = [httparse::EMPTY_HEADER; DEFAULT_SIZE];
        let httparse::Status::Complete((read, parsed)) =
            httparse::parse_headers(&section[1..], &mut headers).map_err(invalid_data_error)?
        else {
            return Err(invalid_data_error(
                "Partial HTTP headers containing two line jumps",
            ));
        };
        if read != section.len() - 1 {
            return Err(invalid_data_error(
                "Invalid data at the end of the trailer section",
            ));
        }
        let mut trailers = HeaderMap::new();
        decode_headers(parsed, &mut trailers)?;
        Ok(trailers)
    }
}

impl<R: BufRead> Read for ChunkedDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.state {
                ChunkedState::SizeLine => {
                    let size = self.read_size_line()?;
                    if size == 0 {
                        self.trailers = Some(self.read_trailers()?);
                        self.state = ChunkedState::Done;
                    } else {
                        self.state = ChunkedState::Data { remaining: size };
                    }
                }
                ChunkedState::Data { remaining } => {
                    if buf.is_empty() {
                        return Ok(0);
                    }
                    let available = self.reader.fill_buf()?;
                    if available.is_empty() {
                        return Err(unexpected_eof_error(
                            "Unexpected stream end in the middle of a chunked content",
                        ));
                    }
                    let size = min(min(buf.len(), available.len()), remaining);
                    buf[..size].copy_from_slice(&available[..size]);
                    self.reader.consume(size);
                    self.state = if size == remaining {
                        ChunkedState::DataEnd
                    } else {
                        ChunkedState::Data {
                            remaining: remaining - size,
                        }
                    };
                    return Ok(size);
                }
                ChunkedState::DataEnd => {
                    self.read_data_end()?;
                    self.state = ChunkedState::SizeLine;
                }
                ChunkedState::Done => return Ok(0),
            }
        }
    }
}

impl<R: BufRead> ChunkedTransferPayload for ChunkedDecoder<R> {
    fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }
}

/// Appends a line of at most `limit` bytes, its `\n` included, to `buffer`.
fn read_bounded_line(
    reader: &mut impl BufRead,
    buffer: &mut Vec<u8>,
    limit: usize,
    too_long: &'static str,
) -> io::Result<()> {
    let start = buffer.len();
    reader.take(limit as u64).read_until(b'\n', buffer)?;
    if buffer[start..].ends_with(b"\n") {
        Ok(())
    } else if buffer.len() - start == limit {
        Err(invalid_data_error(too_long))
    } else {
        Err(unexpected_eof_error("Missing chunked encoding end"))
    }
}
