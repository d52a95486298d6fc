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

//! The tower wire protocol's message table: one struct per message type,
//! each encoding to the exact body layout an LND-format watchtower expects.

use std::io;

use super::codec::{WireDecode, WireEncode, WireError};
use super::tlv::TlvStream;
use crate::model::EncryptedBlob;

pub const TYPE_INIT: u16 = 600;
pub const TYPE_CREATE_SESSION: u16 = 602;
pub const TYPE_CREATE_SESSION_REPLY: u16 = 603;
pub const TYPE_STATE_UPDATE: u16 = 604;
pub const TYPE_STATE_UPDATE_REPLY: u16 = 605;
pub const TYPE_DELETE_SESSION: u16 = 606;
pub const TYPE_DELETE_SESSION_REPLY: u16 = 607;

/// `CreateSessionReply`/`DeleteSessionReply` status byte. Values above 39
/// are tower-side rejections; 0 is success.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SessionStatus {
    Ok,
    TemporaryFailure,
    PermanentFailure,
    AlreadyExists,
    Unknown(u8),
}

impl SessionStatus {
    pub fn code(self) -> u8 {
        match self {
            SessionStatus::Ok => 0,
            SessionStatus::TemporaryFailure => 40,
            SessionStatus::PermanentFailure => 41,
            SessionStatus::AlreadyExists => 42,
            SessionStatus::Unknown(c) => c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => SessionStatus::Ok,
            40 => SessionStatus::TemporaryFailure,
            41 => SessionStatus::PermanentFailure,
            42 => SessionStatus::AlreadyExists,
            other => SessionStatus::Unknown(other),
        }
    }
}

/// `StateUpdateReply` status byte. The wire protocol text only names
/// `ClientBehind` and `SessionConsumed` without assigning them numeric
/// codes; we continue the 40-series numbering `CreateSessionReply` uses.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UpdateStatus {
    Ok,
    ClientBehind,
    SessionConsumed,
    Unknown(u8),
}

impl UpdateStatus {
    pub fn code(self) -> u8 {
        match self {
            UpdateStatus::Ok => 0,
            UpdateStatus::ClientBehind => 44,
            UpdateStatus::SessionConsumed => 45,
            UpdateStatus::Unknown(c) => c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => UpdateStatus::Ok,
            44 => UpdateStatus::ClientBehind,
            45 => UpdateStatus::SessionConsumed,
            other => UpdateStatus::Unknown(other),
        }
    }
}

/// `chain_hash[32] ‖ feature bits (TLV)`. The first message exchanged in
/// both directions after the Brontide handshake.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Init {
    pub chain_hash: [u8; 32],
    pub tlvs: TlvStream,
}

impl WireEncode for Init {
    fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
        let mut written = self.chain_hash.wire_encode(&mut e)?;
        written += self.tlvs.wire_encode(&mut e)?;
        Ok(written)
    }
}

impl WireDecode for Init {
    fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
        let chain_hash = <[u8; 32]>::wire_decode(&mut d)?;
        let mut tail = Vec::new();
        d.read_to_end(&mut tail)?;
        let tlvs = TlvStream::decode_checked(&tail, &[])?;
        Ok(Init { chain_hash, tlvs })
    }
}

/// Initiator-proposed session parameters.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CreateSession {
    pub blob_type: u16,
    pub max_updates: u16,
    pub reward_base: u32,
    pub reward_rate: u32,
    pub sweep_fee_rate_sat_per_kw: u32,
}

impl WireEncode for CreateSession {
    fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
        let mut written = self.blob_type.wire_encode(&mut e)?;
        written += self.max_updates.wire_encode(&mut e)?;
        written += self.reward_base.wire_encode(&mut e)?;
        written += self.reward_rate.wire_encode(&mut e)?;
        written += self.sweep_fee_rate_sat_per_kw.wire_encode(&mut e)?;
        Ok(written)
    }
}

impl WireDecode for CreateSession {
    fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
        Ok(CreateSession {
            blob_type: u16::wire_decode(&mut d)?,
            max_updates: u16::wire_decode(&mut d)?,
            reward_base: u32::wire_decode(&mut d)?,
            reward_rate: u32::wire_decode(&mut d)?,
            sweep_fee_rate_sat_per_kw: u32::wire_decode(&mut d)?,
        })
    }
}

/// `status[1] ‖ optional session_id[33]`. `session_id` is present on
/// success and on `AlreadyExists` (it is the id of the session being
/// resumed); absent otherwise.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CreateSessionReply {
    pub status: SessionStatus,
    pub session_id: Option<[u8; 33]>,
}

impl WireEncode for CreateSessionReply {
    fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
        let mut written = self.status.code().wire_encode(&mut e)?;
        if let Some(session_id) = self.session_id {
            written += session_id.wire_encode(&mut e)?;
        }
        Ok(written)
    }
}

impl WireDecode for CreateSessionReply {
    fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
        let status = SessionStatus::from_code(u8::wire_decode(&mut d)?);
        let session_id = match status {
            SessionStatus::Ok | SessionStatus::AlreadyExists => {
                Some(<[u8; 33]>::wire_decode(&mut d)?)
            }
            _ => None,
        };
        Ok(CreateSessionReply { status, session_id })
    }
}

/// One encrypted justice blob pushed to the tower.
#[derive(Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub seq: u16,
    pub last_applied: u16,
    pub is_complete: bool,
    pub hint: [u8; 16],
    pub encrypted_blob: EncryptedBlob,
}

impl std::fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateUpdate")
            .field("seq", &self.seq)
            .field("last_applied", &self.last_applied)
            .field("is_complete", &self.is_complete)
            .field("hint", &hex::encode(self.hint))
            .finish()
    }
}

impl WireEncode for StateUpdate {
    fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
        let mut written = self.seq.wire_encode(&mut e)?;
        written += self.last_applied.wire_encode(&mut e)?;
        written += (self.is_complete as u8).wire_encode(&mut e)?;
        written += self.hint.wire_encode(&mut e)?;
        written += self.encrypted_blob.as_bytes().wire_encode(&mut e)?;
        Ok(written)
    }
}

impl WireDecode for StateUpdate {
    fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
        let seq = u16::wire_decode(&mut d)?;
        let last_applied = u16::wire_decode(&mut d)?;
        let is_complete = u8::wire_decode(&mut d)? != 0;
        let hint = <[u8; 16]>::wire_decode(&mut d)?;
        let blob_bytes = <[u8; EncryptedBlob::LEN]>::wire_decode(&mut d)?;
        Ok(StateUpdate {
            seq,
            last_applied,
            is_complete,
            hint,
            encrypted_blob: EncryptedBlob::from_bytes(blob_bytes),
        })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct StateUpdateReply {
    pub status: UpdateStatus,
    pub last_applied: u16,
}

impl WireEncode for StateUpdateReply {
    fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
        let mut written = self.status.code().wire_encode(&mut e)?;
        written += self.last_applied.wire_encode(&mut e)?;
        Ok(written)
    }
}

impl WireDecode for StateUpdateReply {
    fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
        Ok(StateUpdateReply {
            status: UpdateStatus::from_code(u8::wire_decode(&mut d)?),
            last_applied: u16::wire_decode(&mut d)?,
        })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct DeleteSession;

impl WireEncode for DeleteSession {
    fn wire_encode<E: io::Write>(&self, _e: E) -> Result<usize, WireError> {
        Ok(0)
    }
}

impl WireDecode for DeleteSession {
    fn wire_decode<D: io::Read>(_d: D) -> Result<Self, WireError> {
        Ok(DeleteSession)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DeleteSessionReply {
    pub status: SessionStatus,
}

impl WireEncode for DeleteSessionReply {
    fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
        self.status.code().wire_encode(&mut e)
    }
}

impl WireDecode for DeleteSessionReply {
    fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
        Ok(DeleteSessionReply { status: SessionStatus::from_code(u8::wire_decode(&mut d)?) })
    }
}

/// Any message that can appear on the wire, tagged with its type code.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Message {
    Init(Init),
    CreateSession(CreateSession),
    CreateSessionReply(CreateSessionReply),
    StateUpdate(StateUpdate),
    StateUpdateReply(StateUpdateReply),
    DeleteSession(DeleteSession),
    DeleteSessionReply(DeleteSessionReply),
}

impl Message {
    pub fn type_code(&self) -> u16 {
        match self {
            Message::Init(_) => TYPE_INIT,
            Message::CreateSession(_) => TYPE_CREATE_SESSION,
            Message::CreateSessionReply(_) => TYPE_CREATE_SESSION_REPLY,
            Message::StateUpdate(_) => TYPE_STATE_UPDATE,
            Message::StateUpdateReply(_) => TYPE_STATE_UPDATE_REPLY,
            Message::DeleteSession(_) => TYPE_DELETE_SESSION,
            Message::DeleteSessionReply(_) => TYPE_DELETE_SESSION_REPLY,
        }
    }

    /// `type[2] ‖ body`, the full plaintext handed to Brontide framing.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.type_code().to_be_bytes().to_vec();
        match self {
            Message::Init(m) => buf.extend(m.wire_serialize()),
            Message::CreateSession(m) => buf.extend(m.wire_serialize()),
            Message::CreateSessionReply(m) => buf.extend(m.wire_serialize()),
            Message::StateUpdate(m) => buf.extend(m.wire_serialize()),
            Message::StateUpdateReply(m) => buf.extend(m.wire_serialize()),
            Message::DeleteSession(m) => buf.extend(m.wire_serialize()),
            Message::DeleteSessionReply(m) => buf.extend(m.wire_serialize()),
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < 2 {
            return Err(WireError::UnexpectedEof);
        }
        let ty = u16::from_be_bytes([bytes[0], bytes[1]]);
        let mut body = io::Cursor::new(&bytes[2..]);
        Ok(match ty {
            TYPE_INIT => Message::Init(Init::wire_decode(&mut body)?),
            TYPE_CREATE_SESSION => Message::CreateSession(CreateSession::wire_decode(&mut body)?),
            TYPE_CREATE_SESSION_REPLY => {
                Message::CreateSessionReply(CreateSessionReply::wire_decode(&mut body)?)
            }
            TYPE_STATE_UPDATE => Message::StateUpdate(StateUpdate::wire_decode(&mut body)?),
            TYPE_STATE_UPDATE_REPLY => {
                Message::StateUpdateReply(StateUpdateReply::wire_decode(&mut body)?)
            }
            TYPE_DELETE_SESSION => Message::DeleteSession(DeleteSession::wire_decode(&mut body)?),
            TYPE_DELETE_SESSION_REPLY => {
                Message::DeleteSessionReply(DeleteSessionReply::wire_decode(&mut body)?)
            }
            other => return Err(WireError::UnknownRequiredTlv(other as u64)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_round_trips_with_empty_tlvs() {
        let init = Init { chain_hash: [0x11; 32], tlvs: TlvStream::empty() };
        let msg = Message::Init(init.clone());
        let bytes = msg.encode();
        assert_eq!(&bytes[..2], &TYPE_INIT.to_be_bytes());
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded, Message::Init(init));
    }

    #[test]
    fn create_session_round_trips() {
        let body = CreateSession {
            blob_type: 1,
            max_updates: 8192,
            reward_base: 0,
            reward_rate: 0,
            sweep_fee_rate_sat_per_kw: 253,
        };
        let msg = Message::CreateSession(body);
        let bytes = msg.encode();
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn create_session_reply_success_carries_session_id() {
        let reply = CreateSessionReply { status: SessionStatus::Ok, session_id: Some([0x22; 33]) };
        let bytes = Message::CreateSessionReply(reply.clone()).encode();
        // type[2] + status[1] + session_id[33]
        assert_eq!(bytes.len(), 2 + 1 + 33);
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded, Message::CreateSessionReply(reply));
    }

    #[test]
    fn create_session_reply_temporary_failure_has_no_session_id() {
        let reply = CreateSessionReply { status: SessionStatus::TemporaryFailure, session_id: None };
        let bytes = Message::CreateSessionReply(reply.clone()).encode();
        assert_eq!(bytes.len(), 2 + 1);
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded, Message::CreateSessionReply(reply));
    }

    #[test]
    fn state_update_round_trips() {
        let update = StateUpdate {
            seq: 1,
            last_applied: 0,
            is_complete: false,
            hint: [0x33; 16],
            encrypted_blob: EncryptedBlob::from_bytes([0x44; EncryptedBlob::LEN]),
        };
        let bytes = Message::StateUpdate(update.clone()).encode();
        assert_eq!(bytes.len(), 2 + 2 + 2 + 1 + 16 + EncryptedBlob::LEN);
        assert_eq!(Message::decode(&bytes).unwrap(), Message::StateUpdate(update));
    }

    #[test]
    fn delete_session_has_empty_body() {
        let bytes = Message::DeleteSession(DeleteSession).encode();
        assert_eq!(bytes.len(), 2);
        assert_eq!(Message::decode(&bytes).unwrap(), Message::DeleteSession(DeleteSession));
    }

    #[test]
    fn unknown_type_code_is_rejected() {
        let bytes = vec![0x03, 0xe9]; // 1001, not a defined type
        assert!(Message::decode(&bytes).is_err());
    }
}
