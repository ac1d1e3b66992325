//! HTTP/1.1 wire encoding of requests and decoding of responses.
//!
//! Use these functions directly to run exchanges over another transport than [`std::net::TcpStream`].
mod decoder;
mod encoder;

pub use decoder::{body_framing, decode_response, BodyFraming};
pub use encoder::encode_request;

/// Capacity for buffers.
///
/// Should be significantly greater than the chunk size of the encoder to avoid flushes in the middle of a chunk.
pub const BUFFER_CAPACITY: usize = 16 * 1024;
