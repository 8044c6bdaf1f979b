//! The byte pipe between the delivery engine and the gateway.
//!
//! The gateway only ever talks back to report a rejected notification, right
//! before it closes the stream. The engine therefore writes blindly and, after
//! each write, polls for readability for a short window instead of dedicating
//! a reader to the stream.

mod tls;

use std::time::Duration;

use async_trait::async_trait;
use pushwire_common::tracing;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub use tls::GatewayConnector;

use crate::error::{ConnectionError, ConnectionResult};

/// Poll window used by connectors that do not configure one.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound on a graceful shutdown before the stream is simply dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// An open connection to the gateway.
#[async_trait]
pub trait Transport: Send {
    /// Writes every byte of `bytes`.
    async fn write(&mut self, bytes: &[u8]) -> ConnectionResult<()>;

    /// Waits up to `timeout` for the stream to become readable. End of stream
    /// counts as readable; a plain timeout returns `Ok(false)`.
    async fn poll_readable(&mut self, timeout: Duration) -> ConnectionResult<bool>;

    /// Reads `len` bytes, or fewer if the peer closes the stream first.
    /// Returns `None` when the stream is already at its end.
    async fn read(&mut self, len: usize) -> ConnectionResult<Option<Vec<u8>>>;

    /// Releases the stream. Closing twice is not an error.
    async fn close(&mut self) -> ConnectionResult<()>;
}

/// Opens connections to the gateway on behalf of the delivery engine.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self) -> ConnectionResult<Self::Transport>;

    /// How long the engine polls for an error response after each write.
    fn poll_timeout(&self) -> Duration {
        DEFAULT_POLL_TIMEOUT
    }
}

/// A [`Transport`] over any async byte stream, normally a TLS stream.
pub struct GatewayConnection<Stream> {
    stream: Option<Stream>,
    /// Byte consumed by [`Transport::poll_readable`] and owed to the next read.
    peeked: Option<u8>,
    eof: bool,
}

impl<Stream> GatewayConnection<Stream> {
    pub const fn new(stream: Stream) -> Self {
        Self {
            stream: Some(stream),
            peeked: None,
            eof: false,
        }
    }

    pub const fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl<Stream> std::fmt::Debug for GatewayConnection<Stream> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnection")
            .field("closed", &self.is_closed())
            .field("peeked", &self.peeked)
            .field("eof", &self.eof)
            .finish()
    }
}

#[async_trait]
impl<Stream> Transport for GatewayConnection<Stream>
where
    Stream: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, bytes: &[u8]) -> ConnectionResult<()> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::Closed)?;
        stream.write_all(bytes).await.map_err(ConnectionError::Write)?;
        stream.flush().await.map_err(ConnectionError::Write)
    }

    async fn poll_readable(&mut self, timeout: Duration) -> ConnectionResult<bool> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::Closed)?;
        if self.peeked.is_some() || self.eof {
            return Ok(true);
        }

        let mut byte = [0u8; 1];
        match tokio::time::timeout(timeout, stream.read(&mut byte)).await {
            Err(_elapsed) => Ok(false),
            Ok(Ok(0)) => {
                self.eof = true;
                Ok(true)
            }
            Ok(Ok(_)) => {
                self.peeked = Some(byte[0]);
                Ok(true)
            }
            Ok(Err(e)) => Err(ConnectionError::Read(e)),
        }
    }

    async fn read(&mut self, len: usize) -> ConnectionResult<Option<Vec<u8>>> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::Closed)?;

        let mut buffer = Vec::with_capacity(len);
        if len > 0
            && let Some(byte) = self.peeked.take()
        {
            buffer.push(byte);
        }

        if !self.eof && buffer.len() < len {
            let remaining = u64::try_from(len - buffer.len()).unwrap_or(u64::MAX);
            (&mut *stream)
                .take(remaining)
                .read_to_end(&mut buffer)
                .await
                .map_err(ConnectionError::Read)?;
            self.eof = buffer.len() < len;
        }

        Ok((!buffer.is_empty()).then_some(buffer))
    }

    async fn close(&mut self) -> ConnectionResult<()> {
        self.peeked = None;
        if let Some(mut stream) = self.stream.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Gateway stream did not shut down cleanly"),
                Err(_elapsed) => tracing::debug!("Gateway stream shutdown timed out"),
            }
        }
        Ok(())
    }
}
