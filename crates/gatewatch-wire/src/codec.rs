//! Length-prefixed message framing.
//!
//! ```text
//! message := length(4 bytes, big-endian, unsigned) || payload(length bytes)
//! ```
//!
//! The reader tolerates arbitrarily fragmented delivery; the writer emits
//! prefix and payload as one buffer so a message is never interleaved.

use crate::error::{is_peer_gone, TransportError};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on a single payload (16 MiB). A 640x480 JPEG is
/// typically well under 100 KiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Sending half of the transport (camera side).
pub struct FrameWriter<W> {
    inner: W,
    frames_sent: u64,
}

impl FrameWriter<TcpStream> {
    /// Connect to a recognizer listening at `addr`.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::Connection)?;
        stream.set_nodelay(true).map_err(TransportError::Connection)?;
        Ok(Self::new(stream))
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            frames_sent: 0,
        }
    }

    /// Write one message. Resolves once the connection has accepted every
    /// byte; fails with [`TransportError::Connection`] if the peer is gone.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
            len: payload.len(),
            max: u32::MAX as usize,
        })?;

        let mut message = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
        message.extend_from_slice(&len.to_be_bytes());
        message.extend_from_slice(payload);

        self.inner
            .write_all(&message)
            .await
            .map_err(TransportError::Connection)?;
        self.inner
            .flush()
            .await
            .map_err(TransportError::Connection)?;

        self.frames_sent += 1;
        Ok(())
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Flush and close the write side.
    pub async fn shutdown(mut self) -> Result<(), TransportError> {
        self.inner
            .shutdown()
            .await
            .map_err(TransportError::Connection)
    }
}

/// Receiving half of the transport (recognizer side).
pub struct FrameReader<R> {
    inner: R,
    max_len: usize,
    frames_received: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_len: DEFAULT_MAX_FRAME_LEN,
            frames_received: 0,
        }
    }

    /// Override the payload size limit.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Read exactly one message and return its payload.
    ///
    /// A stream that ends anywhere inside the prefix or payload (including
    /// before the first prefix byte) yields [`TransportError::ShortRead`].
    pub async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        read_full(&mut self.inner, &mut prefix).await?;

        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_len {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_len,
            });
        }

        let mut payload = vec![0u8; len];
        read_full(&mut self.inner, &mut payload).await?;

        self.frames_received += 1;
        Ok(payload)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Fill `buf` completely, looping over partial reads.
async fn read_full<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), TransportError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => {
                return Err(TransportError::ShortRead {
                    expected: buf.len(),
                    received: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_peer_gone(&e) => {
                tracing::debug!(error = %e, "peer reset during read");
                return Err(TransportError::ShortRead {
                    expected: buf.len(),
                    received: filled,
                });
            }
            Err(e) => return Err(TransportError::Connection(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Reader that hands out at most one byte per poll.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
    }

    impl Trickle {
        fn new(data: Vec<u8>) -> Self {
            Self { data, pos: 0 }
        }
    }

    impl AsyncRead for Trickle {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.pos < self.data.len() && buf.remaining() > 0 {
                let byte = self.data[self.pos];
                buf.put_slice(&[byte]);
                self.pos += 1;
            }
            Poll::Ready(Ok(()))
        }
    }

    fn encode(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_roundtrip_over_small_duplex() {
        // 64-byte pipe forces the reader through many partial reads.
        let (client, server) = tokio::io::duplex(64);
        let sizes = [0usize, 1, 4, 63, 64, 65, 4096, 100_000];

        let writer = tokio::spawn(async move {
            let mut writer = FrameWriter::new(client);
            for &size in &sizes {
                writer.send(&pattern(size)).await.unwrap();
            }
            writer.frames_sent()
        });

        let mut reader = FrameReader::new(server);
        for &size in &sizes {
            let payload = reader.recv().await.unwrap();
            assert_eq!(payload, pattern(size), "payload of {size} bytes corrupted");
        }
        assert_eq!(writer.await.unwrap(), sizes.len() as u64);
        assert_eq!(reader.frames_received(), sizes.len() as u64);
    }

    #[tokio::test]
    async fn test_one_byte_at_a_time() {
        let mut wire = encode(b"first");
        wire.extend(encode(&pattern(300)));
        let mut reader = FrameReader::new(Trickle::new(wire));

        assert_eq!(reader.recv().await.unwrap(), b"first");
        assert_eq!(reader.recv().await.unwrap(), pattern(300));
    }

    #[tokio::test]
    async fn test_clean_close_is_short_read() {
        let mut reader = FrameReader::new(Trickle::new(Vec::new()));
        let err = reader.recv().await.unwrap_err();
        assert!(err.is_disconnect());
        assert!(matches!(
            err,
            TransportError::ShortRead {
                expected: 4,
                received: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_partial_prefix_is_disconnect() {
        let mut reader = FrameReader::new(Trickle::new(vec![0, 0]));
        let err = reader.recv().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ShortRead {
                expected: 4,
                received: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_partial_payload_is_disconnect() {
        let mut wire = 10u32.to_be_bytes().to_vec();
        wire.extend_from_slice(&[1, 2, 3]);
        let mut reader = FrameReader::new(Trickle::new(wire));
        let err = reader.recv().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ShortRead {
                expected: 10,
                received: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_oversized_prefix_rejected() {
        let wire = encode(&pattern(32));
        let mut reader = FrameReader::new(Trickle::new(wire)).with_max_len(16);
        let err = reader.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { len: 32, max: 16 }));
        assert!(!err.is_disconnect());
    }

    #[tokio::test]
    async fn test_send_to_closed_peer_fails() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut writer = FrameWriter::new(client);
        let err = writer.send(b"frame").await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
        assert_eq!(writer.frames_sent(), 0);
    }
}
