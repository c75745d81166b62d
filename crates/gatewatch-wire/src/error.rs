use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer closed the stream before a whole prefix or payload arrived.
    /// A close on a message boundary reports `received = 0`.
    #[error("short read: expected {expected} bytes, received {received} before disconnect")]
    ShortRead { expected: usize, received: usize },
    #[error("connection error: {0}")]
    Connection(#[source] io::Error),
    #[error("bind failed: {0}")]
    Bind(#[source] io::Error),
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
}

impl TransportError {
    /// True when the error means the peer went away and the streaming loop
    /// should end quietly.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::ShortRead { .. })
    }
}

/// Map I/O failures that mean "the peer hung up" on the read side.
pub(crate) fn is_peer_gone(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
