//! Single-client listener.
//!
//! The recognizer serves exactly one camera. The listening socket is consumed
//! by [`FrameListener::accept_one`], so once a camera is connected any further
//! connection attempt is refused.

use crate::codec::FrameReader;
use crate::error::TransportError;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

pub struct FrameListener {
    inner: TcpListener,
}

impl FrameListener {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let inner = TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.inner.local_addr().map_err(TransportError::Bind)
    }

    /// Wait for the one peer, then release the listening socket.
    pub async fn accept_one(self) -> Result<(FrameReader<TcpStream>, SocketAddr), TransportError> {
        let (stream, peer) = self
            .inner
            .accept()
            .await
            .map_err(TransportError::Connection)?;
        stream.set_nodelay(true).map_err(TransportError::Connection)?;
        tracing::info!(peer = %peer, "camera connected");
        Ok((FrameReader::new(stream), peer))
    }
}
