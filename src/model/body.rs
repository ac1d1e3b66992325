use crate::model::HeaderMap;
use crate::utils::{invalid_data_error, unexpected_eof_error};
use std::cmp::min;
use std::fmt;
use std::io::{Cursor, ErrorKind, Read, Result};
use std::iter::FusedIterator;

/// Maximal size of the chunks yielded when iterating over a [`Body`].
pub const CHUNK_CAPACITY: usize = 8 * 1024;

/// A request or response [body](https://httpwg.org/specs/rfc9112.html#message.body).
///
/// It implements the [`Read`] API and is also an [`Iterator`] of chunks:
/// each call to [`next`](Iterator::next) does exactly one read on the underlying source and yields what it got,
/// so nothing is buffered ahead of the consumer.
///
/// ```
/// use oxchange::model::Body;
///
/// let body = Body::from(b"foo".as_ref());
/// assert_eq!(body.len(), Some(3));
/// let chunks = body.collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(chunks, vec![b"foo".to_vec()]);
/// # Result::<_,Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct Body<'a> {
    alt: BodyAlt<'a>,
    on_end: Option<Box<dyn FnOnce(BodyEnd) + 'a>>,
    exhausted: bool,
}

enum BodyAlt<'a> {
    Empty,
    SimpleOwned(Cursor<Vec<u8>>),
    SimpleBorrowed(&'a [u8]),
    Sized {
        content: Box<dyn Read + 'a>,
        total_len: u64,
        consumed_len: u64,
    },
    Chunked(Box<dyn ChunkedTransferPayload + 'a>),
    UntilClose(Box<dyn Read + 'a>),
}

/// How the reading of a body stopped.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub(crate) enum BodyEnd {
    Complete,
    Failed,
}

impl<'a> Body<'a> {
    fn new(alt: BodyAlt<'a>) -> Self {
        Self {
            alt,
            on_end: None,
            exhausted: false,
        }
    }

    /// An absent body.
    ///
    /// Nothing is written after the request headers, not even a `content-length` header.
    pub fn empty() -> Self {
        Self::new(BodyAlt::Empty)
    }

    /// Creates a new body from a [`Read`] implementation.
    ///
    /// If the body is sent as an HTTP request it will be streamed using [chunked transfer encoding](https://httpwg.org/specs/rfc9112.html#chunked.encoding).
    /// The reader is dropped (hence closed for files) as soon as the request has been sent or failed to be.
    pub fn from_read(read: impl Read + 'a) -> Self {
        Self::from_chunked_transfer_payload(SimpleChunkedTransferEncoding(read))
    }

    pub(crate) fn from_read_and_len(read: impl Read + 'a, len: u64) -> Self {
        Self::new(BodyAlt::Sized {
            total_len: len,
            consumed_len: 0,
            content: Box::new(read.take(len)),
        })
    }

    pub(crate) fn from_read_until_close(read: impl Read + 'a) -> Self {
        Self::new(BodyAlt::UntilClose(Box::new(read)))
    }

    /// Creates a [chunked transfer encoding](https://httpwg.org/specs/rfc9112.html#chunked.encoding) body with optional trailers.
    pub fn from_chunked_transfer_payload(payload: impl ChunkedTransferPayload + 'a) -> Self {
        Self::new(BodyAlt::Chunked(Box::new(payload)))
    }

    /// Registers a callback called once, the first time a read reaches the end of the body or fails.
    pub(crate) fn with_end_hook(mut self, hook: impl FnOnce(BodyEnd) + 'a) -> Self {
        self.on_end = Some(Box::new(hook));
        self
    }

    /// The number of bytes in the body (if known).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> Option<u64> {
        match &self.alt {
            BodyAlt::Empty => Some(0),
            BodyAlt::SimpleOwned(d) => Some(d.get_ref().len() as u64),
            BodyAlt::SimpleBorrowed(d) => Some(d.len() as u64),
            BodyAlt::Sized { total_len, .. } => Some(*total_len),
            BodyAlt::Chunked(_) | BodyAlt::UntilClose(_) => None,
        }
    }

    /// If the body is absent (and not an empty byte sequence).
    pub(crate) fn is_absent(&self) -> bool {
        matches!(self.alt, BodyAlt::Empty)
    }

    /// Returns the chunked transfer encoding trailers if they exists and are already received.
    /// You should fully consume the body before attempting to fetch them.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        match &self.alt {
            BodyAlt::Chunked(c) => c.trailers(),
            _ => None,
        }
    }

    /// Reads the full body into a vector.
    ///
    /// WARNING: Beware of the body size!
    ///
    /// ```
    /// use oxchange::model::Body;
    ///
    /// let body = Body::from_read(b"foo".as_ref());
    /// assert_eq!(&body.to_vec()?, b"foo");
    /// # Result::<_,Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn to_vec(mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Reads the full body into a string.
    ///
    /// WARNING: Beware of the body size!
    pub fn to_string(self) -> Result<String> {
        String::from_utf8(self.to_vec()?).map_err(invalid_data_error)
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.alt {
            BodyAlt::Empty => Ok(0),
            BodyAlt::SimpleOwned(c) => c.read(buf),
            BodyAlt::SimpleBorrowed(c) => c.read(buf),
            BodyAlt::Sized {
                content,
                total_len,
                consumed_len,
            } => {
                let filtered_buf_size =
                    usize::try_from(min(*total_len - *consumed_len, buf.len() as u64))
                        .map_err(invalid_data_error)?;
                if filtered_buf_size == 0 {
                    return Ok(0); // No need to read anything
                }
                let additional = content.read(&mut buf[..filtered_buf_size])?;
                *consumed_len += additional as u64;
                if additional == 0 && consumed_len != total_len {
                    // We check we do not miss some bytes
                    return Err(unexpected_eof_error(format!(
                        "The body was expected to contain {total_len} bytes but we have been able to only read {consumed_len}"
                    )));
                }
                Ok(additional)
            }
            BodyAlt::Chunked(inner) => inner.read(buf),
            BodyAlt::UntilClose(inner) => inner.read(buf),
        }
    }

    fn end(&mut self, end: BodyEnd) {
        if let Some(on_end) = self.on_end.take() {
            on_end(end);
        }
    }

    #[cfg(feature = "flate2")]
    pub(crate) fn decode_gzip(self) -> Self {
        Self::from_read(DrainOnEnd {
            decoder: flate2::read::GzDecoder::new(self),
            inner: flate2::read::GzDecoder::get_mut,
        })
    }

    #[cfg(feature = "flate2")]
    pub(crate) fn decode_deflate(self) -> Self {
        Self::from_read(DrainOnEnd {
            decoder: flate2::read::DeflateDecoder::new(self),
            inner: flate2::read::DeflateDecoder::get_mut,
        })
    }
}

impl Read for Body<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let result = self.read_inner(buf);
        match &result {
            Ok(0) if !buf.is_empty() => self.end(BodyEnd::Complete),
            Err(e) if e.kind() != ErrorKind::Interrupted => self.end(BodyEnd::Failed),
            _ => (),
        }
        result
    }
}

impl Iterator for Body<'_> {
    type Item = crate::Result<Vec<u8>>;

    fn next(&mut self) -> Option<crate::Result<Vec<u8>>> {
        if self.exhausted {
            return None;
        }
        let mut chunk = vec![0; CHUNK_CAPACITY];
        loop {
            match self.read(&mut chunk) {
                Ok(0) => {
                    self.exhausted = true;
                    return None;
                }
                Ok(len) => {
                    chunk.truncate(len);
                    chunk.shrink_to_fit();
                    return Some(Ok(chunk));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

impl FusedIterator for Body<'_> {}

impl Default for Body<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<()> for Body<'_> {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl From<Vec<u8>> for Body<'_> {
    fn from(data: Vec<u8>) -> Self {
        Self::new(BodyAlt::SimpleOwned(Cursor::new(data)))
    }
}

impl From<String> for Body<'_> {
    fn from(data: String) -> Self {
        data.into_bytes().into()
    }
}

impl<'a> From<&'a [u8]> for Body<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(BodyAlt::SimpleBorrowed(data))
    }
}

impl<'a> From<&'a str> for Body<'a> {
    fn from(data: &'a str) -> Self {
        data.as_bytes().into()
    }
}

impl fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Body");
        if let Some(len) = self.len() {
            s.field("len", &len);
        }
        s.finish()
    }
}

/// A [`Read`] implementation that might expose [trailers](https://httpwg.org/specs/rfc9112.html#chunked.trailer.section)
/// once the payload has been fully read.
pub trait ChunkedTransferPayload: Read {
    fn trailers(&self) -> Option<&HeaderMap>;
}

struct SimpleChunkedTransferEncoding<R: Read>(R);

impl<R: Read> Read for SimpleChunkedTransferEncoding<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> ChunkedTransferPayload for SimpleChunkedTransferEncoding<R> {
    fn trailers(&self) -> Option<&HeaderMap> {
        None
    }
}

/// Reads the encoded body to its end once the decoder is done with it.
///
/// Decoders may stop before the source reports EOF, which would leave the connection in the middle of a body.
#[cfg(feature = "flate2")]
struct DrainOnEnd<'a, D> {
    decoder: D,
    inner: fn(&mut D) -> &mut Body<'a>,
}

#[cfg(feature = "flate2")]
impl<D: Read> Read for DrainOnEnd<'_, D> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = self.decoder.read(buf)?;
        if read == 0 && !buf.is_empty() {
            std::io::copy((self.inner)(&mut self.decoder), &mut std::io::sink())?;
        }
        Ok(read)
    }
}
