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

//! JusticeKit builder. Converts one [`CommitmentRecord`]
//! into the exact 274-byte `JusticeKitV0` plaintext LND's watchtower
//! expects, and parses it back for round-trip testing.

use crate::error::CaptureError;
use crate::model::CommitmentRecord;

/// Fixed plaintext length mandated by wire compatibility.
pub const JUSTICE_KIT_LEN: usize = 274;

const PUBKEY_LEN: usize = 33;
const SWEEP_FIELD_LEN: usize = 34;
const SIG_LEN: usize = 64;

fn check_compressed_prefix(pubkey: &[u8; PUBKEY_LEN]) -> Result<(), CaptureError> {
    match pubkey[0] {
        0x02 | 0x03 => Ok(()),
        other => Err(CaptureError::InvalidPubkeyPrefix(other)),
    }
}

/// Serialises a `CommitmentRecord` into LND's fixed `JusticeKitV0` layout:
///
/// ```text
/// revocation_pubkey[33] ‖ local_delay_pubkey[33] ‖ csv_delay[4]
///   ‖ sweep_len[2] ‖ sweep_bytes[<=34, zero-padded to 34]
///   ‖ to_local_sig[64] ‖ to_remote_sig[64] ‖ zero-pad to 274
/// ```
pub fn build(record: &CommitmentRecord) -> Result<[u8; JUSTICE_KIT_LEN], CaptureError> {
    if record.sweep_address_bytes.len() > SWEEP_FIELD_LEN {
        return Err(CaptureError::SweepTooLong(record.sweep_address_bytes.len()));
    }

    let revocation_pubkey = record.revocation_pubkey.serialize();
    let local_delay_pubkey = record.local_delay_pubkey.serialize();
    check_compressed_prefix(&revocation_pubkey)?;
    check_compressed_prefix(&local_delay_pubkey)?;

    let mut out = [0u8; JUSTICE_KIT_LEN];
    let mut cursor = 0;

    out[cursor..cursor + PUBKEY_LEN].copy_from_slice(&revocation_pubkey);
    cursor += PUBKEY_LEN;

    out[cursor..cursor + PUBKEY_LEN].copy_from_slice(&local_delay_pubkey);
    cursor += PUBKEY_LEN;

    out[cursor..cursor + 4].copy_from_slice(&record.csv_delay.to_be_bytes());
    cursor += 4;

    let sweep_len = record.sweep_address_bytes.len() as u16;
    out[cursor..cursor + 2].copy_from_slice(&sweep_len.to_be_bytes());
    cursor += 2;

    out[cursor..cursor + record.sweep_address_bytes.len()]
        .copy_from_slice(&record.sweep_address_bytes);
    cursor += SWEEP_FIELD_LEN; // unused tail bytes stay zero

    out[cursor..cursor + SIG_LEN].copy_from_slice(&record.to_local_sig);
    cursor += SIG_LEN;

    out[cursor..cursor + SIG_LEN].copy_from_slice(&record.to_remote_sig);
    cursor += SIG_LEN;

    debug_assert_eq!(cursor, PUBKEY_LEN * 2 + 4 + 2 + SWEEP_FIELD_LEN + SIG_LEN * 2);
    // Remaining bytes to 274 are already zero.

    Ok(out)
}

/// Parsed view of a `JusticeKitV0` plaintext, used by tests and by the
/// decrypt round trip to check `build`'s output against LND's layout.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct JusticeKitFields {
    pub revocation_pubkey: [u8; PUBKEY_LEN],
    pub local_delay_pubkey: [u8; PUBKEY_LEN],
    pub csv_delay: u32,
    pub sweep_bytes: Vec<u8>,
    pub to_local_sig: [u8; SIG_LEN],
    pub to_remote_sig: [u8; SIG_LEN],
}

pub fn parse(plaintext: &[u8; JUSTICE_KIT_LEN]) -> Result<JusticeKitFields, CaptureError> {
    let mut cursor = 0;

    let mut revocation_pubkey = [0u8; PUBKEY_LEN];
    revocation_pubkey.copy_from_slice(&plaintext[cursor..cursor + PUBKEY_LEN]);
    check_compressed_prefix(&revocation_pubkey)?;
    cursor += PUBKEY_LEN;

    let mut local_delay_pubkey = [0u8; PUBKEY_LEN];
    local_delay_pubkey.copy_from_slice(&plaintext[cursor..cursor + PUBKEY_LEN]);
    check_compressed_prefix(&local_delay_pubkey)?;
    cursor += PUBKEY_LEN;

    let mut csv_buf = [0u8; 4];
    csv_buf.copy_from_slice(&plaintext[cursor..cursor + 4]);
    let csv_delay = u32::from_be_bytes(csv_buf);
    cursor += 4;

    let mut len_buf = [0u8; 2];
    len_buf.copy_from_slice(&plaintext[cursor..cursor + 2]);
    let sweep_len = u16::from_be_bytes(len_buf) as usize;
    cursor += 2;
    if sweep_len > SWEEP_FIELD_LEN {
        return Err(CaptureError::SweepTooLong(sweep_len));
    }
    let sweep_bytes = plaintext[cursor..cursor + sweep_len].to_vec();
    cursor += SWEEP_FIELD_LEN;

    let mut to_local_sig = [0u8; SIG_LEN];
    to_local_sig.copy_from_slice(&plaintext[cursor..cursor + SIG_LEN]);
    cursor += SIG_LEN;

    let mut to_remote_sig = [0u8; SIG_LEN];
    to_remote_sig.copy_from_slice(&plaintext[cursor..cursor + SIG_LEN]);

    Ok(JusticeKitFields {
        revocation_pubkey,
        local_delay_pubkey,
        csv_delay,
        sweep_bytes,
        to_local_sig,
        to_remote_sig,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommitmentRecord;
    use bitcoin::Txid;
    use bitcoin_hashes::Hash;
    use secp256k1::{PublicKey, Secp256k1, SecretKey};

    fn dummy_pubkey(byte: u8) -> PublicKey {
        let secp = Secp256k1::new();
        let mut sk_bytes = [byte; 32];
        if sk_bytes == [0u8; 32] {
            sk_bytes[31] = 1;
        }
        let sk = SecretKey::from_slice(&sk_bytes).unwrap();
        PublicKey::from_secret_key(&secp, &sk)
    }

    fn sample_record(sweep_len: usize) -> CommitmentRecord {
        CommitmentRecord {
            breach_txid: Txid::from_inner([7u8; 32]),
            revocation_pubkey: dummy_pubkey(1),
            local_delay_pubkey: dummy_pubkey(2),
            csv_delay: 144,
            sweep_address_bytes: vec![0x41; sweep_len],
            to_local_sig: [0x11; 64],
            to_remote_sig: [0x22; 64],
            commitment_number: 42,
            channel_id: [0u8; 32],
        }
    }

    #[test]
    fn build_produces_exact_length() {
        let record = sample_record(20);
        let plaintext = build(&record).unwrap();
        assert_eq!(plaintext.len(), JUSTICE_KIT_LEN);
    }

    #[test]
    fn sweep_len_zero_is_accepted() {
        let record = sample_record(0);
        assert!(build(&record).is_ok());
    }

    #[test]
    fn sweep_len_34_is_accepted() {
        let record = sample_record(34);
        assert!(build(&record).is_ok());
    }

    #[test]
    fn sweep_len_35_is_rejected() {
        let record = sample_record(35);
        assert!(matches!(build(&record), Err(CaptureError::SweepTooLong(35))));
    }

    #[test]
    fn build_then_parse_round_trips_fields() {
        let record = sample_record(10);
        let plaintext = build(&record).unwrap();
        let fields = parse(&plaintext).unwrap();
        assert_eq!(fields.csv_delay, record.csv_delay);
        assert_eq!(fields.sweep_bytes, record.sweep_address_bytes);
        assert_eq!(fields.to_local_sig, record.to_local_sig);
        assert_eq!(fields.to_remote_sig, record.to_remote_sig);
        assert_eq!(&fields.revocation_pubkey[..], &record.revocation_pubkey.serialize()[..]);
    }

    #[test]
    fn tail_padding_is_zero() {
        let record = sample_record(5);
        let plaintext = build(&record).unwrap();
        let used = 33 + 33 + 4 + 2 + 34 + 64 + 64;
        assert!(plaintext[used..].iter().all(|&b| b == 0));
    }
}
