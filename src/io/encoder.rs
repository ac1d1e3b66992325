use crate::error::{Error, Result};
use crate::model::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use crate::model::{Body, HeaderMap, Method, Request};
use std::io::{self, copy, ErrorKind, Read, Write};

/// Chunks are at most this size.
const MAX_CHUNK_SIZE: usize = 4096;
/// The encoder tries to gather at least this number of bytes before emitting a chunk.
const MIN_CHUNK_SIZE: usize = 1024;

/// Writes the request line, the request headers and the body.
///
/// The headers are written as they are in the request, except that:
/// * `content-length` is added for a fixed body if neither `content-length` nor `transfer-encoding` is set.
/// * `transfer-encoding: chunked` is added for a streamed body if not set.
///
/// The body is consumed and dropped before returning, even on failure.
pub fn encode_request(request: Request<'_>, mut writer: impl Write) -> Result<()> {
    let (method, target, headers, body) = request.into_parts();
    if target.is_empty()
        || target
            .bytes()
            .any(|b| b.is_ascii_whitespace() || b.is_ascii_control())
    {
        return Err(Error::InvalidRequest(format!(
            "Invalid request target '{target}'"
        )));
    }
    let chunked = match headers.get(TRANSFER_ENCODING) {
        Some(transfer_encoding) => {
            if !transfer_encoding
                .as_bytes()
                .eq_ignore_ascii_case(b"chunked")
            {
                return Err(Error::InvalidRequest(format!(
                    "Transfer-Encoding: {} is not supported",
                    String::from_utf8_lossy(transfer_encoding.as_bytes())
                )));
            }
            true
        }
        None => false,
    };
    let body_len = body.len();
    if (chunked || body_len.is_none()) && headers.contains_key(CONTENT_LENGTH) {
        return Err(Error::InvalidRequest(
            "A body sent with chunked transfer encoding can't have a content-length header".into(),
        ));
    }

    encode_request_parts(
        &method,
        &target,
        &headers,
        body,
        chunked,
        body_len,
        &mut writer,
    )
    .map_err(Error::Transport)
}

fn encode_request_parts(
    method: &Method,
    target: &str,
    headers: &HeaderMap,
    mut body: Body<'_>,
    chunked: bool,
    body_len: Option<u64>,
    writer: &mut impl Write,
) -> io::Result<()> {
    write!(writer, "{method} {target} HTTP/1.1\r\n")?;
    encode_headers(headers, writer)?;

    match body_len {
        _ if chunked => {
            write!(writer, "\r\n")?;
            encode_chunked_body(&mut body, writer)?;
        }
        None => {
            write!(writer, "transfer-encoding: chunked\r\n\r\n")?;
            encode_chunked_body(&mut body, writer)?;
        }
        Some(_) if body.is_absent() => write!(writer, "\r\n")?,
        Some(length) => {
            if !headers.contains_key(CONTENT_LENGTH) {
                write!(writer, "content-length: {length}\r\n")?;
            }
            write!(writer, "\r\n")?;
            copy(&mut body, writer)?;
        }
    }
    writer.flush()
}

fn encode_headers(headers: &HeaderMap, writer: &mut impl Write) -> io::Result<()> {
    for (name, value) in headers {
        write!(writer, "{name}: ")?;
        writer.write_all(value.as_bytes())?;
        write!(writer, "\r\n")?;
    }
    Ok(())
}

fn encode_chunked_body(body: &mut Body<'_>, writer: &mut impl Write) -> io::Result<()> {
    let mut buffer = vec![b'\0'; MAX_CHUNK_SIZE];
    loop {
        let mut read = 0;
        while read < MIN_CHUNK_SIZE {
            // We try to avoid too small chunks
            let new_read = match body.read(&mut buffer[read..]) {
                Ok(new_read) => new_read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if new_read == 0 {
                break; // EOF
            }
            read += new_read;
        }
        if read == 0 {
            break; // Done
        }
        write!(writer, "{read:X}\r\n")?;
        writer.write_all(&buffer[..read])?;
        write!(writer, "\r\n")?;
    }
    write!(writer, "0\r\n")?;
    if let Some(trailers) = body.trailers() {
        encode_headers(trailers, writer)?;
    }
    write!(writer, "\r\n")
}
