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

//! The delivery pipeline: drains the capture queue, encrypts each record,
//! batches, pushes over an established Brontide session, retries with
//! backoff, and falls back to on-disk storage when the tower cannot be
//! reached. The Lightning core is never informed of watchtower failures —
//! everything here is recovered locally or surfaced through [`BridgeStatus`]
//! alone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::capture::CaptureQueue;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ProtocolError, TransportFailure};
use crate::localstore::LocalStore;
use crate::model::{ChannelId, CommitmentRecord, EncryptedBlob, Hint};
use crate::noise::{self, Session, StaticIdentity};
use crate::status::BridgeStatus;
use crate::transport::{self, TowerStream, HANDSHAKE_TIMEOUT, IO_TIMEOUT};
use crate::wire::messages::{
    CreateSession, CreateSessionReply, DeleteSession, Init, SessionStatus, StateUpdate,
    StateUpdateReply, UpdateStatus,
};
use crate::wire::{recv_message, send_message, Message};
use crate::{blobcrypto, justice};

/// Exponential backoff schedule for a failed delivery attempt, capped at
/// the last entry.
const BACKOFF_SCHEDULE: [Duration; 3] =
    [Duration::from_secs(5), Duration::from_secs(15), Duration::from_secs(45)];

/// `max_updates` proposed in `CreateSession`. The wire protocol leaves this
/// to the initiator; a session is renegotiated well before any plausible
/// per-connection batch count would approach it.
const SESSION_MAX_UPDATES: u16 = 4096;

/// Fallback fee rate when no override is configured, matching Bitcoin
/// Core's minimum relay fee floor.
const DEFAULT_FEE_RATE_SAT_PER_KW: u32 = 253;

/// A blob ready to push, carrying the bookkeeping the pipeline needs to
/// either drop it on success or persist it on failure.
struct PendingBlob {
    hint: Hint,
    /// `None` for a blob reloaded from the local store whose channel was
    /// not re-learned yet this run; the on-disk file itself never carries
    /// a channel_id.
    channel_id: Option<ChannelId>,
    blob: EncryptedBlob,
    /// `true` for a blob reloaded from the local store, so a repeated
    /// failure does not re-derive its hint from a (now discarded)
    /// `CommitmentRecord`.
    from_local_store: bool,
}

/// An open wire-protocol session with the tower: the Brontide channel plus
/// the session_id and the initiator's own bookkeeping of how many updates
/// it has sent against `max_updates`.
struct TowerSession {
    stream: Box<dyn TowerStream>,
    channel: Session,
    #[allow(dead_code)]
    session_id: [u8; 33],
    max_updates: u16,
    updates_sent: u16,
    last_applied: u16,
}

/// Coordinates capture, crypto, and transport. One pipeline serves exactly
/// one configured tower, matching `watchtower.tower_uri`'s "single
/// configured tower" contract.
pub struct DeliveryPipeline {
    config: BridgeConfig,
    identity: StaticIdentity,
    chain_hash: [u8; 32],
    capture: Arc<CaptureQueue>,
    local_store: LocalStore,
    /// Hint -> channel_id association for blobs currently sitting in the
    /// local store, learned as blobs are persisted and discarded once
    /// delivered. Not on-disk state: a restart forgets it until the
    /// channel in question produces another blob.
    channel_hints: std::sync::Mutex<HashMap<Hint, ChannelId>>,
    session: AsyncMutex<Option<TowerSession>>,
    status: std::sync::Mutex<BridgeStatus>,
    cancelled: AtomicBool,
}

impl DeliveryPipeline {
    pub fn new(
        config: BridgeConfig,
        identity: StaticIdentity,
        chain_hash: [u8; 32],
        capture: Arc<CaptureQueue>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let local_store =
            LocalStore::open(&config.blob_dir).map_err(|e| BridgeError::LocalStore(e.to_string()))?;
        Ok(DeliveryPipeline {
            config,
            identity,
            chain_hash,
            capture,
            local_store,
            channel_hints: std::sync::Mutex::new(HashMap::new()),
            session: AsyncMutex::new(None),
            status: std::sync::Mutex::new(BridgeStatus::Unconfigured),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn status(&self) -> BridgeStatus {
        self.status.lock().unwrap().clone()
    }

    fn set_status(&self, status: BridgeStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Signals any in-flight `run()` loop to wind down after the current
    /// frame completes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Drains the capture queue and local store, pushes as much as the
    /// batch size allows, and resolves outcomes locally. Never blocks the
    /// Lightning core — the caller decides when to invoke this, typically
    /// from a dedicated IO-runtime task.
    pub async fn push_pending(&self) -> Result<(), BridgeError> {
        let mut batch = self.load_local_store_batch()?;
        let remaining_capacity = self.config.batch_size.saturating_sub(batch.len());
        if remaining_capacity > 0 {
            batch.extend(self.drain_capture_batch(remaining_capacity)?);
        }

        if batch.is_empty() {
            self.set_status(BridgeStatus::Protected);
            return Ok(());
        }
        self.set_status(BridgeStatus::Pending);

        self.deliver_with_retry(batch).await
    }

    /// Runs `push_pending` on a fixed interval until `cancel()` is called.
    /// On cancellation, finishes the in-flight frame, attempts a clean
    /// `DeleteSession`, and returns.
    pub async fn run(&self, poll_interval: Duration) {
        while !self.is_cancelled() {
            if let Err(e) = self.push_pending().await {
                tracing::error!(%e, "delivery attempt failed");
            }
            tokio::time::sleep(poll_interval).await;
        }
        self.close_session_cleanly().await;
    }

    fn load_local_store_batch(&self) -> Result<Vec<PendingBlob>, BridgeError> {
        let local_blobs =
            self.local_store.load_all().map_err(|e| BridgeError::LocalStore(e.to_string()))?;
        let hints = self.channel_hints.lock().unwrap();
        Ok(local_blobs
            .into_iter()
            .take(self.config.batch_size)
            .map(|local| PendingBlob {
                channel_id: hints.get(&local.hint).copied(),
                hint: local.hint,
                blob: local.blob,
                from_local_store: true,
            })
            .collect())
    }

    fn drain_capture_batch(&self, max_count: usize) -> Result<Vec<PendingBlob>, BridgeError> {
        let records = self.capture.drain_ready(max_count);
        records.iter().map(|r| self.encrypt_record(r)).collect()
    }

    fn encrypt_record(&self, record: &CommitmentRecord) -> Result<PendingBlob, BridgeError> {
        let plaintext = justice::build(record)?;
        let txid_bytes: &[u8] = record.breach_txid.as_ref();
        let mut key = [0u8; 32];
        key.copy_from_slice(txid_bytes);
        let blob = blobcrypto::encrypt(&key, &plaintext)?;
        let hint = Hint::from_breach_txid(&record.breach_txid);
        Ok(PendingBlob { hint, channel_id: Some(record.channel_id), blob, from_local_store: false })
    }

    /// Runs one delivery attempt with exponential backoff: on a
    /// `TransportFailure` the whole remaining batch is persisted and
    /// retried after the next backoff step; a `ProtocolError` or
    /// `PermanentFailure` is fatal and propagates to the operator surface
    /// without retry.
    async fn deliver_with_retry(&self, mut batch: Vec<PendingBlob>) -> Result<(), BridgeError> {
        let mut attempt = 0usize;
        loop {
            match self.deliver_batch(&mut batch).await {
                Ok(()) => {
                    self.set_status(BridgeStatus::Protected);
                    return Ok(());
                }
                Err(BridgeError::Transport(e)) => {
                    tracing::warn!(%e, attempt, "delivery attempt failed, persisting and backing off");
                    self.persist_batch(&batch)?;
                    self.set_status(BridgeStatus::Degraded);
                    if attempt >= BACKOFF_SCHEDULE.len() {
                        // Failure budget exhausted: stop retrying inline and
                        // let the next push_pending() resume from disk.
                        return Ok(());
                    }
                    let delay = BACKOFF_SCHEDULE[attempt];
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(BridgeError::Protocol(ProtocolError::PermanentFailure)) => {
                    self.persist_batch(&batch)?;
                    self.set_status(BridgeStatus::Error(
                        "tower rejected the session permanently".to_string(),
                    ));
                    return Err(BridgeError::Protocol(ProtocolError::PermanentFailure));
                }
                Err(BridgeError::Protocol(e)) => {
                    tracing::error!(%e, "fatal protocol error, persisting pending blobs");
                    self.persist_batch(&batch)?;
                    self.set_status(BridgeStatus::Error(e.to_string()));
                    return Err(BridgeError::Protocol(e));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn persist_batch(&self, batch: &[PendingBlob]) -> Result<(), BridgeError> {
        for pending in batch {
            self.local_store
                .store(&pending.hint, &pending.blob)
                .map_err(|e| BridgeError::LocalStore(e.to_string()))?;
            if let Some(channel_id) = pending.channel_id {
                self.channel_hints.lock().unwrap().insert(pending.hint, channel_id);
            }
        }
        Ok(())
    }

    /// Removes every local-store blob known to belong to `channel_id` and
    /// forgets its hints. A blob persisted by an earlier, now-restarted
    /// process is only reachable here once its channel produces another
    /// blob in the current run and re-populates the association.
    pub fn purge_channel(&self, channel_id: ChannelId) -> Result<usize, BridgeError> {
        let hints: Vec<Hint> = {
            let map = self.channel_hints.lock().unwrap();
            map.iter().filter(|(_, c)| **c == channel_id).map(|(h, _)| *h).collect()
        };

        let mut purged = 0;
        for hint in hints {
            self.local_store.remove(&hint).map_err(|e| BridgeError::LocalStore(e.to_string()))?;
            self.channel_hints.lock().unwrap().remove(&hint);
            purged += 1;
        }
        Ok(purged)
    }

    /// Pushes every blob in `batch` over the current (or freshly opened)
    /// session, removing delivered blobs from `batch` as acknowledgements
    /// arrive. `batch` is left holding only the blobs not yet acknowledged
    /// when this returns, whether the cause is success (empty), transport
    /// failure, or a fatal protocol error.
    async fn deliver_batch(&self, batch: &mut Vec<PendingBlob>) -> Result<(), BridgeError> {
        let mut index = 0;
        while index < batch.len() {
            self.ensure_session().await?;

            let seq = {
                let guard = self.session.lock().await;
                let tower_session = guard.as_ref().expect("ensure_session populated it");
                tower_session.updates_sent.wrapping_add(1)
            };

            match self.send_state_update(&batch[index], seq).await? {
                UpdateStatus::Ok => {
                    let pending = batch.remove(index);
                    if pending.from_local_store {
                        let _ = self.local_store.remove(&pending.hint);
                    }
                    self.channel_hints.lock().unwrap().remove(&pending.hint);
                }
                UpdateStatus::SessionConsumed => {
                    tracing::info!("session consumed max_updates, opening a fresh one");
                    *self.session.lock().await = None;
                    // Retry the same blob (still at `index`) against the
                    // next session rather than surfacing a hard failure.
                }
                UpdateStatus::ClientBehind => {
                    return Err(BridgeError::Protocol(ProtocolError::ClientBehind));
                }
                UpdateStatus::Unknown(code) => {
                    return Err(BridgeError::Protocol(ProtocolError::UndefinedStatus(code)));
                }
            }
        }
        Ok(())
    }

    async fn send_state_update(&self, pending: &PendingBlob, seq: u16) -> Result<UpdateStatus, BridgeError> {
        let mut guard = self.session.lock().await;
        let tower_session = guard.as_mut().expect("caller holds an open session");

        let update = StateUpdate {
            seq,
            last_applied: tower_session.last_applied,
            is_complete: false,
            hint: pending.hint.0,
            encrypted_blob: pending.blob.clone(),
        };

        let reply = tokio::time::timeout(IO_TIMEOUT, async {
            send_message(&mut tower_session.stream, &mut tower_session.channel, &Message::StateUpdate(update))
                .await?;
            recv_message(&mut tower_session.stream, &mut tower_session.channel).await
        })
        .await
        .map_err(|_| BridgeError::Transport(TransportFailure::Timeout(IO_TIMEOUT)))??;

        match reply {
            Message::StateUpdateReply(StateUpdateReply { status, last_applied }) => {
                if last_applied < tower_session.last_applied {
                    return Err(BridgeError::Protocol(ProtocolError::NonMonotoneAck {
                        prev: tower_session.last_applied,
                        next: last_applied,
                    }));
                }
                tower_session.last_applied = last_applied;
                tower_session.updates_sent = tower_session.updates_sent.saturating_add(1);
                Ok(status)
            }
            _ => Err(BridgeError::Protocol(ProtocolError::MalformedMessage(
                "expected StateUpdateReply".to_string(),
            ))),
        }
    }

    /// Ensures `self.session` holds an established, not-yet-exhausted
    /// wire-protocol session, opening a fresh transport connection and
    /// running the handshake plus `Init`/`CreateSession` if needed.
    async fn ensure_session(&self) -> Result<(), BridgeError> {
        {
            let guard = self.session.lock().await;
            if let Some(existing) = guard.as_ref() {
                if existing.updates_sent < existing.max_updates {
                    return Ok(());
                }
            }
        }

        let tower_uri = self.config.parse_tower_uri()?;
        let mut stream = transport::connect(self.config.transport, &tower_uri.host, tower_uri.port).await?;

        let mut channel = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            run_initiator_handshake(&mut stream, self.identity.local_secret, tower_uri.pubkey),
        )
        .await
        .map_err(|_| TransportFailure::Timeout(HANDSHAKE_TIMEOUT))??;

        let local_init = Message::Init(Init { chain_hash: self.chain_hash, tlvs: crate::wire::tlv::TlvStream::empty() });
        send_message(&mut stream, &mut channel, &local_init).await?;
        match recv_message(&mut stream, &mut channel).await? {
            Message::Init(peer_init) => {
                if peer_init.chain_hash != self.chain_hash {
                    return Err(BridgeError::Protocol(ProtocolError::ChainHashMismatch));
                }
            }
            _ => {
                return Err(BridgeError::Protocol(ProtocolError::MalformedMessage(
                    "expected Init".to_string(),
                )))
            }
        }

        let create_session = CreateSession {
            blob_type: 1,
            max_updates: SESSION_MAX_UPDATES,
            reward_base: 0,
            reward_rate: 0,
            sweep_fee_rate_sat_per_kw: self.config.fee_rate_sat_per_kw.unwrap_or(DEFAULT_FEE_RATE_SAT_PER_KW),
        };
        send_message(&mut stream, &mut channel, &Message::CreateSession(create_session)).await?;

        let session_id = match recv_message(&mut stream, &mut channel).await? {
            Message::CreateSessionReply(CreateSessionReply {
                status: SessionStatus::Ok | SessionStatus::AlreadyExists,
                session_id: Some(id),
            }) => id,
            Message::CreateSessionReply(CreateSessionReply { status: SessionStatus::TemporaryFailure, .. }) => {
                return Err(BridgeError::Protocol(ProtocolError::TemporaryFailure));
            }
            Message::CreateSessionReply(CreateSessionReply { status: SessionStatus::PermanentFailure, .. }) => {
                return Err(BridgeError::Protocol(ProtocolError::PermanentFailure));
            }
            Message::CreateSessionReply(CreateSessionReply { status: SessionStatus::Unknown(code), .. }) => {
                return Err(BridgeError::Protocol(ProtocolError::UndefinedStatus(code)));
            }
            _ => {
                return Err(BridgeError::Protocol(ProtocolError::MalformedMessage(
                    "expected CreateSessionReply".to_string(),
                )))
            }
        };

        *self.session.lock().await = Some(TowerSession {
            stream,
            channel,
            session_id,
            max_updates: SESSION_MAX_UPDATES,
            updates_sent: 0,
            last_applied: 0,
        });
        Ok(())
    }

    /// Best-effort clean shutdown: sends `DeleteSession` if a session is
    /// open, ignoring any failure since the socket is about to be dropped
    /// regardless.
    async fn close_session_cleanly(&self) {
        let mut guard = self.session.lock().await;
        if let Some(tower_session) = guard.as_mut() {
            let _ = tokio::time::timeout(
                IO_TIMEOUT,
                send_message(
                    &mut tower_session.stream,
                    &mut tower_session.channel,
                    &Message::DeleteSession(DeleteSession),
                ),
            )
            .await;
        }
        *guard = None;
    }
}

/// Drives the three-act handshake over an already-connected stream.
async fn run_initiator_handshake(
    stream: &mut Box<dyn TowerStream>,
    local_secret: secp256k1::SecretKey,
    remote_pubkey: secp256k1::PublicKey,
) -> Result<Session, BridgeError> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (handshake, act1) = noise::handshake::InitiatorHandshake::act1(local_secret, remote_pubkey);
    stream.write_all(&act1).await.map_err(|e| TransportFailure::Io(e.into()))?;

    let mut act2 = [0u8; noise::handshake::ACT2_LEN];
    stream.read_exact(&mut act2).await.map_err(|e| TransportFailure::Io(e.into()))?;
    let (handshake, act3) = handshake.act3(&act2)?;

    stream.write_all(&act3).await.map_err(|e| TransportFailure::Io(e.into()))?;

    Ok(Session::from_initiator_handshake(&handshake))
}
