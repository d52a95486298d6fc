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

//! Justice capture: watches every persisted channel-monitor update from the
//! Lightning core and accumulates [`CommitmentRecord`]s ready for export.
//! Mirrors the pending-map-plus-ready-queue shape of
//! `WatchtowerPersister` in the LDK sample bridge this crate generalises
//! from a single embedded tower into an external-delivery pipeline.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bitcoin::blockdata::script::Builder;
use bitcoin::blockdata::opcodes::all as opcodes;
use bitcoin::{Transaction, Txid};
use secp256k1::PublicKey;

use crate::error::CaptureError;
use crate::model::{ChannelId, CommitmentRecord};

/// Key material the capture layer needs per channel, handed down from the
/// Lightning core's signer; never a private key.
#[derive(Clone, Debug)]
pub struct ChannelKeys {
    pub revocation_pubkey: PublicKey,
    pub local_delay_pubkey: PublicKey,
    pub sweep_address_bytes: Vec<u8>,
}

/// One `on_update_channel` call's worth of information about a single
/// counterparty commitment.
#[derive(Clone, Debug)]
pub struct ChannelUpdate {
    pub commitment_tx: Transaction,
    pub commitment_number: u64,
    pub to_local_sig: Option<[u8; 64]>,
    pub to_remote_sig: Option<[u8; 64]>,
    pub revoked: bool,
}

#[derive(Clone, Debug, Default)]
struct PartialRecord {
    commitment_tx: Option<Transaction>,
    to_local_sig: Option<[u8; 64]>,
    to_remote_sig: Option<[u8; 64]>,
    revoked: bool,
}

impl PartialRecord {
    fn is_complete(&self) -> bool {
        self.revoked
            && self.commitment_tx.is_some()
            && self.to_local_sig.is_some()
            && self.to_remote_sig.is_some()
    }
}

/// The finite range of `to_self_delay` values a channel open could plausibly
/// have negotiated; used to brute-force the CSV delay the core does not
/// expose directly.
const CSV_DELAY_CANDIDATES: std::ops::RangeInclusive<u32> = 1..=2016;

/// Builds the BOLT 3 `to_local` witness script for one candidate CSV delay:
/// `OP_IF <revocation_pubkey> OP_ELSE <delay> OP_CSV OP_DROP
/// <local_delay_pubkey> OP_ENDIF OP_CHECKSIG`.
fn to_local_witness_script(
    revocation_pubkey: &PublicKey,
    local_delay_pubkey: &PublicKey,
    csv_delay: u32,
) -> bitcoin::Script {
    Builder::new()
        .push_opcode(opcodes::OP_IF)
        .push_slice(&revocation_pubkey.serialize())
        .push_opcode(opcodes::OP_ELSE)
        .push_int(csv_delay as i64)
        .push_opcode(opcodes::OP_CSV)
        .push_opcode(opcodes::OP_DROP)
        .push_slice(&local_delay_pubkey.serialize())
        .push_opcode(opcodes::OP_ENDIF)
        .push_opcode(opcodes::OP_CHECKSIG)
        .into_script()
}

/// Finds the `to_local` output index and CSV delay by brute-forcing the
/// witness script template against every output's `scriptPubKey`.
fn recover_local_output(
    tx: &Transaction,
    revocation_pubkey: &PublicKey,
    local_delay_pubkey: &PublicKey,
    commitment_number: u64,
) -> Result<u32, CaptureError> {
    for csv_delay in CSV_DELAY_CANDIDATES {
        let script = to_local_witness_script(revocation_pubkey, local_delay_pubkey, csv_delay);
        let expected_spk = script.to_v0_p2wsh();
        if tx.output.iter().any(|out| out.script_pubkey == expected_spk) {
            return Ok(csv_delay);
        }
    }
    Err(CaptureError::CsvDelayNotFound(commitment_number))
}

/// Accumulates `CommitmentRecord`s for every registered channel. Exposed to
/// the Lightning core as two callbacks (`on_new_channel`, `on_update_channel`)
/// plus `drain_ready`; none of these ever block on I/O.
pub struct CaptureQueue {
    keys: Mutex<HashMap<ChannelId, ChannelKeys>>,
    pending: Mutex<HashMap<ChannelId, HashMap<u64, PartialRecord>>>,
    ready: Mutex<VecDeque<CommitmentRecord>>,
}

impl Default for CaptureQueue {
    fn default() -> Self {
        CaptureQueue {
            keys: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            ready: Mutex::new(VecDeque::new()),
        }
    }
}

impl CaptureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_new_channel(&self, channel_id: ChannelId, keys: ChannelKeys) {
        self.keys.lock().unwrap().insert(channel_id, keys);
        self.pending.lock().unwrap().insert(channel_id, HashMap::new());
    }

    /// Folds one update into the channel's pending map, promoting the entry
    /// to `ready` once a revocation secret and both justice signatures have
    /// all arrived — they may arrive across several calls.
    pub fn on_update_channel(&self, channel_id: ChannelId, update: ChannelUpdate) {
        let channel_keys = match self.keys.lock().unwrap().get(&channel_id).cloned() {
            Some(keys) => keys,
            None => {
                tracing::warn!(?channel_id, "update for unregistered channel, dropping");
                return;
            }
        };

        let mut pending = self.pending.lock().unwrap();
        let channel_pending = pending.entry(channel_id).or_insert_with(HashMap::new);
        let entry = channel_pending.entry(update.commitment_number).or_default();

        entry.commitment_tx.get_or_insert(update.commitment_tx);
        if update.to_local_sig.is_some() {
            entry.to_local_sig = update.to_local_sig;
        }
        if update.to_remote_sig.is_some() {
            entry.to_remote_sig = update.to_remote_sig;
        }
        entry.revoked |= update.revoked;

        if !entry.is_complete() {
            return;
        }

        let entry = channel_pending.remove(&update.commitment_number).unwrap();
        let tx = entry.commitment_tx.unwrap();
        let breach_txid: Txid = tx.txid();

        match recover_local_output(
            &tx,
            &channel_keys.revocation_pubkey,
            &channel_keys.local_delay_pubkey,
            update.commitment_number,
        ) {
            Ok(csv_delay) => {
                self.ready.lock().unwrap().push_back(CommitmentRecord {
                    breach_txid,
                    revocation_pubkey: channel_keys.revocation_pubkey,
                    local_delay_pubkey: channel_keys.local_delay_pubkey,
                    csv_delay,
                    sweep_address_bytes: channel_keys.sweep_address_bytes,
                    to_local_sig: entry.to_local_sig.unwrap(),
                    to_remote_sig: entry.to_remote_sig.unwrap(),
                    commitment_number: update.commitment_number,
                    channel_id,
                });
            }
            Err(e) => {
                tracing::warn!(%e, commitment_number = update.commitment_number, "rejecting commitment record");
            }
        }
    }

    /// Drops any still-incomplete commitments for a closed channel.
    pub fn on_channel_closed(&self, channel_id: ChannelId) {
        self.pending.lock().unwrap().remove(&channel_id);
        self.keys.lock().unwrap().remove(&channel_id);
    }

    pub fn drain_ready(&self, max_count: usize) -> Vec<CommitmentRecord> {
        let mut ready = self.ready.lock().unwrap();
        let n = max_count.min(ready.len());
        ready.drain(..n).collect()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::blockdata::transaction::{OutPoint, TxIn, TxOut};
    use bitcoin::Script;
    use secp256k1::{Secp256k1, SecretKey};

    fn dummy_pubkey(byte: u8) -> PublicKey {
        let secp = Secp256k1::new();
        let mut sk_bytes = [byte; 32];
        if sk_bytes == [0u8; 32] {
            sk_bytes[31] = 1;
        }
        PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&sk_bytes).unwrap())
    }

    fn commitment_tx_with_delay(
        revocation_pubkey: &PublicKey,
        local_delay_pubkey: &PublicKey,
        csv_delay: u32,
    ) -> Transaction {
        let script = to_local_witness_script(revocation_pubkey, local_delay_pubkey, csv_delay);
        Transaction {
            version: 2,
            lock_time: bitcoin::PackedLockTime(0),
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: Script::new(),
                sequence: bitcoin::Sequence::MAX,
                witness: bitcoin::Witness::new(),
            }],
            output: vec![TxOut { value: 100_000, script_pubkey: script.to_v0_p2wsh() }],
        }
    }

    #[test]
    fn recovers_csv_delay_by_brute_force() {
        let revocation_pubkey = dummy_pubkey(1);
        let local_delay_pubkey = dummy_pubkey(2);
        let tx = commitment_tx_with_delay(&revocation_pubkey, &local_delay_pubkey, 144);

        let recovered = recover_local_output(&tx, &revocation_pubkey, &local_delay_pubkey, 1).unwrap();
        assert_eq!(recovered, 144);
    }

    #[test]
    fn unmatched_script_is_rejected() {
        let revocation_pubkey = dummy_pubkey(1);
        let local_delay_pubkey = dummy_pubkey(2);
        let other_pubkey = dummy_pubkey(3);
        let tx = commitment_tx_with_delay(&revocation_pubkey, &other_pubkey, 144);

        assert!(recover_local_output(&tx, &revocation_pubkey, &local_delay_pubkey, 1).is_err());
    }

    #[test]
    fn update_promotes_to_ready_only_once_complete() {
        let queue = CaptureQueue::new();
        let channel_id = [1u8; 32];
        let revocation_pubkey = dummy_pubkey(1);
        let local_delay_pubkey = dummy_pubkey(2);
        queue.on_new_channel(
            channel_id,
            ChannelKeys {
                revocation_pubkey,
                local_delay_pubkey,
                sweep_address_bytes: vec![0xaa; 20],
            },
        );

        let tx = commitment_tx_with_delay(&revocation_pubkey, &local_delay_pubkey, 144);

        queue.on_update_channel(
            channel_id,
            ChannelUpdate {
                commitment_tx: tx.clone(),
                commitment_number: 1,
                to_local_sig: Some([0x11; 64]),
                to_remote_sig: None,
                revoked: true,
            },
        );
        assert_eq!(queue.ready_len(), 0);

        queue.on_update_channel(
            channel_id,
            ChannelUpdate {
                commitment_tx: tx,
                commitment_number: 1,
                to_local_sig: None,
                to_remote_sig: Some([0x22; 64]),
                revoked: true,
            },
        );
        assert_eq!(queue.ready_len(), 1);

        let drained = queue.drain_ready(10);
        assert_eq!(drained.len(), 1);
        assert_eq!(queue.ready_len(), 0);
    }

    #[test]
    fn channel_closed_drops_pending_entries() {
        let queue = CaptureQueue::new();
        let channel_id = [2u8; 32];
        queue.on_new_channel(
            channel_id,
            ChannelKeys {
                revocation_pubkey: dummy_pubkey(1),
                local_delay_pubkey: dummy_pubkey(2),
                sweep_address_bytes: vec![],
            },
        );
        queue.on_update_channel(
            channel_id,
            ChannelUpdate {
                commitment_tx: commitment_tx_with_delay(&dummy_pubkey(1), &dummy_pubkey(2), 144),
                commitment_number: 7,
                to_local_sig: Some([0x11; 64]),
                to_remote_sig: None,
                revoked: true,
            },
        );
        queue.on_channel_closed(channel_id);
        assert_eq!(queue.ready_len(), 0);
    }
}
