//! CONNECT tunnel implementation for HTTPS proxying
//!
//! Dials the CONNECT target and relays bytes between the client and the
//! target with one task per direction.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::error::{Result, SpxError};

const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// Handles CONNECT tunnel requests
pub struct TunnelHandler;

impl TunnelHandler {
    /// Dial the CONNECT target, bounded by `connect_timeout`
    #[instrument(skip(connect_timeout))]
    pub async fn dial(authority: &str, connect_timeout: Duration) -> Result<TcpStream> {
        let (host, port) = Self::parse_authority(authority)?;
        debug!("Establishing direct tunnel to {}:{}", host, port);

        match tokio::time::timeout(connect_timeout, TcpStream::connect((host.as_str(), port))).await
        {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(stream)
            }
            Ok(Err(e)) => Err(SpxError::DialFailed(format!("dial tcp {}: {}", authority, e))),
            Err(_) => Err(SpxError::DialFailed(format!(
                "dial tcp {}: i/o timeout after {:?}",
                authority, connect_timeout
            ))),
        }
    }

    /// Parse host and port from authority (for CONNECT requests)
    pub fn parse_authority(authority: &str) -> Result<(String, u16)> {
        let (host, port) = match authority.rsplit_once(':') {
            // An IPv6 literal without a port ends in ']', not in digits
            Some((host, port_str)) if !port_str.ends_with(']') => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| SpxError::InvalidRequest("Invalid port".to_string()))?;
                (host, port)
            }
            // Default to port 443 for CONNECT (typically HTTPS)
            _ => (authority, 443),
        };

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(SpxError::InvalidRequest("Missing host".to_string()));
        }

        Ok((host.to_string(), port))
    }
}

/// A live CONNECT tunnel
///
/// Each direction owns one read end and one write end and runs on its own
/// task. The first direction to see EOF or an error raises the shared close
/// signal; the other direction stops at once, so both tasks drop their halves
/// and both sockets are closed even when the far peer stays idle.
pub struct Tunnel {
    client_to_target: JoinHandle<u64>,
    target_to_client: JoinHandle<u64>,
}

impl Tunnel {
    /// Start relaying between `client` and `target`
    pub fn open<C, T>(client: C, target: T) -> Self
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client_read, client_write) = tokio::io::split(client);
        let (target_read, target_write) = tokio::io::split(target);
        let close = Arc::new(watch::channel(false).0);

        Self {
            client_to_target: tokio::spawn(transfer(
                client_read,
                target_write,
                close.clone(),
                "client->target",
            )),
            target_to_client: tokio::spawn(transfer(
                target_read,
                client_write,
                close,
                "target->client",
            )),
        }
    }

    /// Wait for both directions to finish
    ///
    /// Returns `(bytes client->target, bytes target->client)`.
    pub async fn closed(self) -> (u64, u64) {
        let (sent, received) = tokio::join!(self.client_to_target, self.target_to_client);
        let bytes_sent = sent.unwrap_or_default();
        let bytes_received = received.unwrap_or_default();

        debug!(
            bytes_sent = bytes_sent,
            bytes_received = bytes_received,
            "Tunnel closed"
        );

        (bytes_sent, bytes_received)
    }
}

/// Copy `src` into `dst` until EOF, an error, or the close signal, then
/// close both ends and raise the signal for the opposite direction
async fn transfer<R, W>(
    mut src: R,
    mut dst: W,
    close: Arc<watch::Sender<bool>>,
    direction: &'static str,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut closing = close.subscribe();
    let mut copied = 0u64;

    let result = {
        let relay = async {
            let mut buf = vec![0u8; COPY_BUFFER_SIZE];
            loop {
                let n = src.read(&mut buf).await?;
                if n == 0 {
                    return Ok::<(), io::Error>(());
                }
                dst.write_all(&buf[..n]).await?;
                copied += n as u64;
            }
        };

        tokio::select! {
            result = relay => result,
            _ = closing.wait_for(|closed| *closed) => {
                debug!("{} stopped, opposite direction closed", direction);
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        debug!("{} copy ended: {}", direction, e);
    }

    close.send_replace(true);
    let _ = dst.shutdown().await;
    drop(dst);
    drop(src);

    copied
}
