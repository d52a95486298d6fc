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

//! Core data model: the shapes that flow from justice capture
//! through to the wire. Byte layouts for the wire forms (`JusticeKitV0`,
//! `EncryptedBlob`) live next to the components that produce them
//! ([`crate::justice`], [`crate::blobcrypto`]) since the layout *is* the
//! contract; this module only holds the plain Rust data a channel-monitor
//! update is turned into before it reaches those components.

use bitcoin::Txid;
use secp256k1::PublicKey;

/// A unique identifier for a Lightning channel, as handed to us by the core.
pub type ChannelId = [u8; 32];

/// Captured at each Lightning-core state update. A record becomes
/// eligible for export only once a revocation secret has arrived *and* both
/// justice signatures have been produced by the core's signer.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CommitmentRecord {
    /// Revoked counterparty commitment txid, internal (unreversed) byte
    /// order. This is also the encryption key for the corresponding
    /// [`crate::model::EncryptedBlob`] — never reverse it for display and
    /// then feed the reversed bytes back into crypto.
    pub breach_txid: Txid,

    /// Compressed secp256k1 point (33 bytes, prefix 0x02/0x03).
    pub revocation_pubkey: PublicKey,

    /// Compressed secp256k1 point (33 bytes, prefix 0x02/0x03).
    pub local_delay_pubkey: PublicKey,

    /// Relative locktime (in blocks) on the `to_local` output, recovered by
    /// [`crate::capture`] via witness-script brute force.
    pub csv_delay: u32,

    /// Destination for swept funds, unpadded, at most 34 bytes.
    pub sweep_address_bytes: Vec<u8>,

    /// 64-byte fixed-size justice signature over the `to_local` output.
    pub to_local_sig: [u8; 64],

    /// 64-byte fixed-size justice signature over the `to_remote` output.
    pub to_remote_sig: [u8; 64],

    /// Monotone per channel.
    pub commitment_number: u64,

    pub channel_id: ChannelId,
}

/// First 16 bytes of the breach txid (internal byte order), used by the
/// tower to index blobs by observed on-chain txid prefix.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Hint(pub [u8; 16]);

impl Hint {
    pub fn from_breach_txid(txid: &Txid) -> Self {
        let bytes: &[u8] = txid.as_ref();
        let mut hint = [0u8; 16];
        hint.copy_from_slice(&bytes[..16]);
        Hint(hint)
    }

    /// Lowercased hex, used verbatim as the `LocalBlob` filename stem.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Hint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 314-byte wire form: `nonce[24] ‖ ciphertext[274] ‖ MAC[16]`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBlob(pub [u8; Self::LEN]);

impl EncryptedBlob {
    pub const LEN: usize = 314;
    pub const NONCE_LEN: usize = 24;
    pub const PLAINTEXT_LEN: usize = 274;
    pub const TAG_LEN: usize = 16;

    pub fn nonce(&self) -> &[u8] {
        &self.0[..Self::NONCE_LEN]
    }

    pub fn ciphertext_and_tag(&self) -> &[u8] {
        &self.0[Self::NONCE_LEN..]
    }

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        EncryptedBlob(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EncryptedBlob").field(&hex::encode(&self.0[..])).finish()
    }
}
