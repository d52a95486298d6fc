// LDK-to-LND watchtower bridge
// Written in 2024 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Provides a byte-stream to the tower, either through a local Tor SOCKS
//! proxy to its onion service or through a plain TCP tunnel. [`noise::Session`]
//! and the wire layer above it see the same interface regardless of mode.

pub mod onion;
pub mod tcp;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::TransportMode;
use crate::error::TransportFailure;

/// Transport read/write deadline once a connection is established.
pub const IO_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for the Brontide handshake (Act 1 through Act 3).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for bootstrapping the in-process Tor client before falling
/// back to TCP.
pub const TOR_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30);

/// A connected byte-stream to the tower, already past TCP/SOCKS connect but
/// before the Brontide handshake.
pub trait TowerStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> TowerStream for T {}

/// Opens a connection to `host:port` using the configured mode, falling
/// back from onion to TCP on bootstrap failure per the selection policy:
/// prefer onion if configured, fall back to TCP only when onion bootstrap
/// itself fails, never when the onion connect fails after a successful
/// bootstrap.
pub async fn connect(
    mode: TransportMode,
    host: &str,
    port: u16,
) -> Result<Box<dyn TowerStream>, TransportFailure> {
    match mode {
        TransportMode::Tcp => {
            let stream = tcp::connect(host, port).await?;
            Ok(Box::new(stream))
        }
        TransportMode::Onion => match onion::connect(host, port).await {
            Ok(stream) => Ok(Box::new(stream)),
            Err(TransportFailure::TorBootstrap(reason)) => {
                tracing::warn!(%reason, "Tor bootstrap failed, falling back to plain TCP");
                let stream = tcp::connect(host, port).await?;
                Ok(Box::new(stream))
            }
            Err(e) => Err(e),
        },
    }
}

/// Wraps a fallible future with the standard transport timeout, converting
/// an elapsed deadline into a [`TransportFailure::Timeout`].
pub(crate) async fn with_timeout<F, T, E>(duration: Duration, fut: F) -> Result<T, TransportFailure>
where
    F: std::future::Future<Output = Result<T, E>>,
    TransportFailure: From<E>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(TransportFailure::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_propagates_inner_error() {
        let result: Result<(), TransportFailure> =
            with_timeout(Duration::from_millis(100), async {
                Err::<(), TransportFailure>(TransportFailure::ConnectionClosed)
            })
            .await;
        assert_eq!(result, Err(TransportFailure::ConnectionClosed));
    }

    #[tokio::test]
    async fn with_timeout_raises_timeout_on_elapsed_deadline() {
        let result: Result<(), TransportFailure> =
            with_timeout(Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<(), TransportFailure>(())
            })
            .await;
        assert!(matches!(result, Err(TransportFailure::Timeout(_))));
    }
}
