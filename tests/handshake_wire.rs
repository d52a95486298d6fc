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

//! Drives a full Brontide handshake followed by a session's worth of
//! messages across an in-memory duplex pipe, exercising the same
//! send_message/recv_message path the delivery pipeline uses against a
//! real tower connection.

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use ldk_tower_bridge::model::EncryptedBlob;
use ldk_tower_bridge::noise::handshake::{InitiatorHandshake, ResponderHandshake};
use ldk_tower_bridge::noise::Session;
use ldk_tower_bridge::wire::messages::{
    CreateSession, CreateSessionReply, DeleteSession, Init, SessionStatus, StateUpdate,
    StateUpdateReply, UpdateStatus,
};
use ldk_tower_bridge::wire::tlv::TlvStream;
use ldk_tower_bridge::wire::{recv_message, send_message, Message};

fn keypair(byte: u8) -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[byte; 32]).unwrap();
    let pk = PublicKey::from_secret_key(&secp, &sk);
    (sk, pk)
}

/// Drives both sides of the handshake over a duplex pipe and returns each
/// side's established `Session`, ready for `send_message`/`recv_message`.
async fn handshake_over(
    i_io: &mut tokio::io::DuplexStream,
    r_io: &mut tokio::io::DuplexStream,
    i_static: SecretKey,
    r_static: SecretKey,
) -> (Session, Session) {
    let secp = Secp256k1::new();
    let r_static_pub = PublicKey::from_secret_key(&secp, &r_static);

    let (initiator, act1) = InitiatorHandshake::act1(i_static, r_static_pub);
    i_io.write_all(&act1).await.unwrap();

    let mut act1_buf = [0u8; 50];
    r_io.read_exact(&mut act1_buf).await.unwrap();
    let (responder, act2) = ResponderHandshake::act2(r_static, &act1_buf).unwrap();
    r_io.write_all(&act2).await.unwrap();

    let mut act2_buf = [0u8; 50];
    i_io.read_exact(&mut act2_buf).await.unwrap();
    let (initiator, act3) = initiator.act3(&act2_buf).unwrap();
    i_io.write_all(&act3).await.unwrap();

    let mut act3_buf = [0u8; 66];
    r_io.read_exact(&mut act3_buf).await.unwrap();
    let (responder, recovered_initiator_static) = responder.act3(&act3_buf).unwrap();

    let secp = Secp256k1::new();
    assert_eq!(recovered_initiator_static, PublicKey::from_secret_key(&secp, &i_static));

    let (i_send, i_recv) = initiator.split();
    // Responder's send/receive keys are reversed relative to the initiator's.
    let (r_send, r_recv) = responder.split();
    (Session::new(i_send, i_recv), Session::new(r_send, r_recv))
}

#[tokio::test]
async fn full_session_round_trips_over_a_duplex_pipe() {
    let (i_static, _) = keypair(0x11);
    let (r_static, _) = keypair(0x22);
    let (mut i_io, mut r_io) = tokio::io::duplex(4096);
    let (mut i_session, mut r_session) = handshake_over(&mut i_io, &mut r_io, i_static, r_static).await;

    let chain_hash = [0x06; 32];

    // Initiator -> responder: Init.
    send_message(&mut i_io, &mut i_session, &Message::Init(Init { chain_hash, tlvs: TlvStream::empty() }))
        .await
        .unwrap();
    let received = recv_message(&mut r_io, &mut r_session).await.unwrap();
    assert_eq!(received, Message::Init(Init { chain_hash, tlvs: TlvStream::empty() }));

    // Responder -> initiator: Init echoed back.
    send_message(&mut r_io, &mut r_session, &Message::Init(Init { chain_hash, tlvs: TlvStream::empty() }))
        .await
        .unwrap();
    let received = recv_message(&mut i_io, &mut i_session).await.unwrap();
    assert_eq!(received, Message::Init(Init { chain_hash, tlvs: TlvStream::empty() }));

    // Initiator -> responder: CreateSession.
    let create_session = CreateSession {
        blob_type: 1,
        max_updates: 4096,
        reward_base: 0,
        reward_rate: 0,
        sweep_fee_rate_sat_per_kw: 253,
    };
    send_message(&mut i_io, &mut i_session, &Message::CreateSession(create_session)).await.unwrap();
    let received = recv_message(&mut r_io, &mut r_session).await.unwrap();
    assert_eq!(received, Message::CreateSession(create_session));

    // Responder -> initiator: session accepted.
    let reply = CreateSessionReply { status: SessionStatus::Ok, session_id: Some([0xab; 33]) };
    send_message(&mut r_io, &mut r_session, &Message::CreateSessionReply(reply.clone())).await.unwrap();
    let received = recv_message(&mut i_io, &mut i_session).await.unwrap();
    assert_eq!(received, Message::CreateSessionReply(reply));

    // Initiator -> responder: one StateUpdate.
    let update = StateUpdate {
        seq: 1,
        last_applied: 0,
        is_complete: false,
        hint: [0x77; 16],
        encrypted_blob: EncryptedBlob::from_bytes([0x88; EncryptedBlob::LEN]),
    };
    send_message(&mut i_io, &mut i_session, &Message::StateUpdate(update.clone())).await.unwrap();
    let received = recv_message(&mut r_io, &mut r_session).await.unwrap();
    assert_eq!(received, Message::StateUpdate(update));

    // Responder -> initiator: update acknowledged.
    let ack = StateUpdateReply { status: UpdateStatus::Ok, last_applied: 1 };
    send_message(&mut r_io, &mut r_session, &Message::StateUpdateReply(ack)).await.unwrap();
    let received = recv_message(&mut i_io, &mut i_session).await.unwrap();
    assert_eq!(received, Message::StateUpdateReply(ack));

    // And a clean session teardown.
    send_message(&mut i_io, &mut i_session, &Message::DeleteSession(DeleteSession)).await.unwrap();
    let received = recv_message(&mut r_io, &mut r_session).await.unwrap();
    assert_eq!(received, Message::DeleteSession(DeleteSession));
}

#[tokio::test]
async fn tampered_frame_fails_authentication_instead_of_decoding_garbage() {
    let (i_static, _) = keypair(0x33);
    let (r_static, _) = keypair(0x44);
    let (mut i_io, mut r_io) = tokio::io::duplex(4096);
    let (mut i_session, mut r_session) = handshake_over(&mut i_io, &mut r_io, i_static, r_static).await;

    send_message(&mut i_io, &mut i_session, &Message::DeleteSession(DeleteSession)).await.unwrap();

    // Flip a bit in the encrypted length prefix sitting in the pipe before
    // the responder reads it.
    let mut enc_len = [0u8; 18];
    r_io.read_exact(&mut enc_len).await.unwrap();
    enc_len[17] ^= 0x01;

    let result = r_session.decrypt_length(&enc_len);
    assert!(result.is_err());
}
