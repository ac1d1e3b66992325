//! The HTTP model encoded in Rust type system.
//!
//! The main entry points are [`Request`] and [`Response`].
//! Header, method and status types come from the [`http`] crate.
mod body;
mod request;
mod response;

pub use body::{Body, ChunkedTransferPayload, CHUNK_CAPACITY};
pub(crate) use body::BodyEnd;
pub use http::header;
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};
pub use request::Request;
pub use response::Response;
