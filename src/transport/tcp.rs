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

//! Plain TCP tunnel mode: used when an operator-managed tunnel to the
//! tower already exists, so no onion bootstrap is needed.

use tokio::net::TcpStream;

use crate::error::TransportFailure;

use super::{with_timeout, IO_TIMEOUT};

pub async fn connect(host: &str, port: u16) -> Result<TcpStream, TransportFailure> {
    let addr = format!("{}:{}", host, port);
    with_timeout(IO_TIMEOUT, async {
        TcpStream::connect(&addr)
            .await
            .map_err(|_| TransportFailure::ConnectFailed(addr.clone()))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_succeeds_against_a_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await });

        let stream = connect(&addr.ip().to_string(), addr.port()).await;
        assert!(stream.is_ok());
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn connect_fails_against_a_closed_port() {
        // Port 0 never accepts, guaranteeing a reachable-but-refused peer
        // on loopback.
        let result = connect("127.0.0.1", 1).await;
        assert!(result.is_err());
    }
}
