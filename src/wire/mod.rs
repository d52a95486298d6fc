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

//! Structured message exchange over an established Brontide channel:
//! the byte-level codec, the TLV stream used by `Init`, and the message
//! table itself.

pub mod codec;
pub mod messages;
pub mod tlv;

pub use codec::{WireDecode, WireEncode, WireError};
pub use messages::Message;

use crate::error::ProtocolError;
use crate::noise::Session;

/// Write one [`Message`] through an established [`Session`], Brontide-framed.
pub async fn send_message<S>(
    stream: &mut S,
    session: &mut Session,
    message: &Message,
) -> Result<(), crate::error::BridgeError>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    let plaintext = message.encode();
    let frame = session.encrypt_frame(&plaintext)?;
    stream.write_all(&frame).await.map_err(|e| crate::error::TransportFailure::Io(e.into()))?;
    Ok(())
}

/// Read one Brontide-framed [`Message`] from an established [`Session`].
pub async fn recv_message<S>(
    stream: &mut S,
    session: &mut Session,
) -> Result<Message, crate::error::BridgeError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut enc_len = [0u8; 18];
    stream.read_exact(&mut enc_len).await.map_err(|e| crate::error::TransportFailure::Io(e.into()))?;
    let len = session.decrypt_length(&enc_len)?;

    let mut enc_payload = vec![0u8; len + 16];
    stream
        .read_exact(&mut enc_payload)
        .await
        .map_err(|e| crate::error::TransportFailure::Io(e.into()))?;
    let payload = session.decrypt_payload(&enc_payload)?;

    Message::decode(&payload)
        .map_err(|e| ProtocolError::MalformedMessage(e.to_string()).into())
}
