use std::io::{Error, ErrorKind};

#[inline]
pub(crate) fn invalid_data_error(
    error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> Error {
    Error::new(ErrorKind::InvalidData, error)
}

#[inline]
pub(crate) fn unexpected_eof_error(
    error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> Error {
    Error::new(ErrorKind::UnexpectedEof, error)
}
