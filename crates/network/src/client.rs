//! Authenticated peer connections handed to callers.

use cairn_types::PublicKey;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::errors::{DialError, Result};

/// Channel to a peer whose key matched the pinned identity.
///
/// The peer RPC protocol runs over [`PeerClient::channel`]. The client owns
/// its connection exclusively; dropping it or calling `close` releases it.
pub struct PeerClient {
    remote: PublicKey,
    address: String,
    stream: Option<TlsStream<TcpStream>>,
}

impl PeerClient {
    pub(crate) fn new(remote: PublicKey, address: String, stream: TlsStream<TcpStream>) -> Self {
        Self {
            remote,
            address,
            stream: Some(stream),
        }
    }

    pub fn remote_key(&self) -> &PublicKey {
        &self.remote
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// The authenticated byte stream, or `Closed` after `close`.
    pub fn channel(&mut self) -> Result<&mut TlsStream<TcpStream>> {
        self.stream.as_mut().ok_or(DialError::Closed)
    }

    /// Send close_notify and release the connection. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        debug!(peer = %self.remote, addr = %self.address, "closing peer connection");
        stream.shutdown().await?;
        Ok(())
    }
}

impl std::fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerClient")
            .field("remote", &self.remote)
            .field("address", &self.address)
            .field("closed", &self.is_closed())
            .finish()
    }
}
