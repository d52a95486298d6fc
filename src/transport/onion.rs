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

//! Onion mode: reaches the tower's hidden service through a locally running
//! Tor client's SOCKS5 port. `torut` validates the v3 onion address up
//! front so a typo never reaches the network; the SOCKS5 CONNECT handshake
//! itself is hand-rolled, since establishing a circuit to a single
//! already-known address is a handful of bytes, not a reason to pull in a
//! general-purpose SOCKS client crate.

use std::str::FromStr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use torut::onion::OnionAddressV3;

use crate::error::TransportFailure;

use super::{with_timeout, TOR_BOOTSTRAP_TIMEOUT};

/// Default SOCKS5 port of a locally running Tor daemon.
const TOR_SOCKS_ADDR: &str = "127.0.0.1:9050";

const SOCKS5_VERSION: u8 = 0x05;
const SOCKS5_NO_AUTH: u8 = 0x00;
const SOCKS5_CMD_CONNECT: u8 = 0x01;
const SOCKS5_ATYP_DOMAIN: u8 = 0x03;

pub async fn connect(host: &str, port: u16) -> Result<TcpStream, TransportFailure> {
    if OnionAddressV3::from_str(host).is_err() {
        return Err(TransportFailure::TorBootstrap(format!(
            "`{}` is not a valid v3 onion address",
            host
        )));
    }

    with_timeout(TOR_BOOTSTRAP_TIMEOUT, async {
        let mut stream = TcpStream::connect(TOR_SOCKS_ADDR)
            .await
            .map_err(|e| TransportFailure::TorBootstrap(format!("local Tor SOCKS proxy unreachable: {}", e)))?;

        socks5_handshake(&mut stream, host, port).await?;
        Ok(stream)
    })
    .await
}

async fn socks5_handshake(
    stream: &mut TcpStream,
    host: &str,
    port: u16,
) -> Result<(), TransportFailure> {
    let bootstrap_err = |msg: String| TransportFailure::TorBootstrap(msg);

    stream
        .write_all(&[SOCKS5_VERSION, 0x01, SOCKS5_NO_AUTH])
        .await
        .map_err(|e| bootstrap_err(e.to_string()))?;

    let mut method_reply = [0u8; 2];
    stream
        .read_exact(&mut method_reply)
        .await
        .map_err(|e| bootstrap_err(e.to_string()))?;
    if method_reply != [SOCKS5_VERSION, SOCKS5_NO_AUTH] {
        return Err(bootstrap_err("Tor SOCKS proxy rejected no-auth negotiation".to_string()));
    }

    let host_bytes = host.as_bytes();
    if host_bytes.len() > 255 {
        return Err(bootstrap_err("onion host name too long for SOCKS5".to_string()));
    }
    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_CONNECT, 0x00, SOCKS5_ATYP_DOMAIN, host_bytes.len() as u8];
    request.extend_from_slice(host_bytes);
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await.map_err(|e| bootstrap_err(e.to_string()))?;

    let mut reply_head = [0u8; 4];
    stream.read_exact(&mut reply_head).await.map_err(|e| bootstrap_err(e.to_string()))?;
    if reply_head[0] != SOCKS5_VERSION {
        return Err(bootstrap_err("malformed SOCKS5 reply".to_string()));
    }
    if reply_head[1] != 0x00 {
        return Err(bootstrap_err(format!("SOCKS5 CONNECT rejected, reply code {:#04x}", reply_head[1])));
    }

    // Drain the bound address so the stream is left positioned right after
    // the handshake for the caller.
    match reply_head[3] {
        0x01 => {
            let mut skip = [0u8; 4 + 2];
            stream.read_exact(&mut skip).await.map_err(|e| bootstrap_err(e.to_string()))?;
        }
        0x03 => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await.map_err(|e| bootstrap_err(e.to_string()))?;
            let mut skip = vec![0u8; len_buf[0] as usize + 2];
            stream.read_exact(&mut skip).await.map_err(|e| bootstrap_err(e.to_string()))?;
        }
        0x04 => {
            let mut skip = [0u8; 16 + 2];
            stream.read_exact(&mut skip).await.map_err(|e| bootstrap_err(e.to_string()))?;
        }
        other => return Err(bootstrap_err(format!("unsupported SOCKS5 address type {:#04x}", other))),
    }

    Ok(())
}
