use std::io;
use thiserror::Error;

/// Errors raised while running an HTTP exchange.
///
/// Whatever the variant, the [`Connection`](crate::Connection) it comes from must not be reused.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport could not be established or the connection is not usable anymore.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// Reading from or writing to the transport failed in the middle of an exchange.
    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),

    /// The peer sent bytes that are not valid HTTP/1.1.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The request can't be serialized as given.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn connection_io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Body reads go through [`std::io::Read`]: malformed framing is reported as [`io::ErrorKind::InvalidData`]
/// and a peer stopping too early as [`io::ErrorKind::UnexpectedEof`].
impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                Self::Protocol(error.to_string())
            }
            _ => Self::Transport(error),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
