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

//! `SymmetricState`/`CipherState` for Noise_XK over secp256k1.
//!
//! Off-the-shelf Noise crates hash a Curve25519 protocol name and use
//! Curve25519 DH; neither produces chaining keys interoperable with LND.
//! This module implements the framework from scratch, parameterised on
//! libsecp256k1's `SharedSecret` DH convention.

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, KeyInit};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

pub const PROTOCOL_NAME: &[u8] = b"Noise_XK_secp256k1_ChaChaPoly_SHA256";
pub const PROLOGUE: &[u8] = b"lightning";

/// `DH(a, b) = SHA256(SEC1-compressed(a*b))`, matching libsecp256k1's
/// `SharedSecret::new` convention (and thus LND). A hand-rolled DH that
/// returns the raw `x`-coordinate instead will not interoperate.
pub fn dh(secret: &secp256k1::SecretKey, public: &secp256k1::PublicKey) -> [u8; 32] {
    let shared = secp256k1::ecdh::SharedSecret::new(public, secret);
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.as_ref());
    out
}

/// One direction's symmetric key + nonce, post-handshake. The chaining key
/// is retained so the direction can be rekeyed every 1000 messages without
/// redoing the handshake.
#[derive(Clone)]
pub struct CipherState {
    key: [u8; 32],
    ck: [u8; 32],
    nonce: u64,
}

/// Number of encryptions (or decryptions) in one direction between
/// rotations.
pub const REKEY_INTERVAL: u64 = 1000;

impl CipherState {
    pub fn new(key: [u8; 32], ck: [u8; 32]) -> Self {
        CipherState { key, ck, nonce: 0 }
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Raw key bytes, exposed crate-internally for test-vector assertions —
    /// never leaked outside the crate.
    pub(crate) fn key_bytes(&self) -> [u8; 32] {
        self.key
    }

    fn nonce_bytes(&self) -> [u8; 12] {
        let mut n = [0u8; 12];
        n[4..].copy_from_slice(&self.nonce.to_le_bytes());
        n
    }

    /// Encrypt `plaintext` under the current key/nonce with the given AAD,
    /// returning ciphertext‖tag and advancing the nonce by one.
    pub fn encrypt(&mut self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.nonce == u64::MAX {
            return Err(CryptoError::NonceOverflow);
        }
        let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(&self.key));
        let mut buf = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&self.nonce_bytes()), aad, &mut buf)
            .map_err(|_| CryptoError::AuthFailure)?;
        buf.extend_from_slice(&tag);
        self.nonce += 1;
        Ok(buf)
    }

    /// Decrypt `ciphertext` (including trailing 16-byte tag) under the
    /// current key/nonce, advancing the nonce by one.
    pub fn decrypt(&mut self, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < 16 {
            return Err(CryptoError::AuthFailure);
        }
        if self.nonce == u64::MAX {
            return Err(CryptoError::NonceOverflow);
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - 16);
        let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(&self.key));
        let mut buf = body.to_vec();
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&self.nonce_bytes()),
                aad,
                &mut buf,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| CryptoError::AuthFailure)?;
        self.nonce += 1;
        Ok(buf)
    }

    /// `(ck, k) = HKDF(ck, k)`; nonce resets to 0. Called by [`super::Session`]
    /// once every [`REKEY_INTERVAL`] encryptions/decryptions in a direction.
    pub fn rotate(&mut self) {
        let (ck, k) = hkdf2(&self.ck, &self.key);
        self.ck = ck;
        self.key = k;
        self.nonce = 0;
    }
}

/// HKDF-SHA256 producing two 32-byte outputs from chaining key `ck` and
/// input keying material, per the Noise spec's `HKDF(ck, ikm, 2)`.
pub fn hkdf2(ck: &[u8; 32], ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
    let hk = Hkdf::<Sha256>::new(Some(ck), ikm);
    let mut okm = [0u8; 64];
    hk.expand(&[], &mut okm).expect("64 bytes is a valid HKDF-SHA256 output length");
    let mut a = [0u8; 32];
    let mut b = [0u8; 32];
    a.copy_from_slice(&okm[..32]);
    b.copy_from_slice(&okm[32..]);
    (a, b)
}

/// `h`/`ck` plus an optional transient `CipherState`, used only during the
/// three-act handshake.
pub struct SymmetricState {
    h: [u8; 32],
    ck: [u8; 32],
    cipher: Option<CipherState>,
}

impl SymmetricState {
    pub fn initialize(remote_static_compressed: &[u8; 33]) -> Self {
        let h: [u8; 32] = Sha256::digest(PROTOCOL_NAME).into();
        let ck = h;

        let mut state = SymmetricState { h, ck, cipher: None };
        state.mix_hash(PROLOGUE);
        state.mix_hash(remote_static_compressed);
        state
    }

    pub fn h(&self) -> [u8; 32] {
        self.h
    }

    pub fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.h);
        hasher.update(data);
        self.h = hasher.finalize().into();
    }

    pub fn mix_key(&mut self, input: &[u8]) {
        let (ck, temp_k) = hkdf2(&self.ck, input);
        self.ck = ck;
        self.cipher = Some(CipherState::new(temp_k, ck));
    }

    pub fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let ciphertext = match &mut self.cipher {
            Some(cipher) => cipher.encrypt(&self.h, plaintext)?,
            None => plaintext.to_vec(),
        };
        self.mix_hash(&ciphertext);
        Ok(ciphertext)
    }

    pub fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let plaintext = match &mut self.cipher {
            Some(cipher) => cipher.decrypt(&self.h, ciphertext).map_err(|_| CryptoError::HandshakeAuth)?,
            None => ciphertext.to_vec(),
        };
        self.mix_hash(ciphertext);
        Ok(plaintext)
    }

    /// `split()`: derive the two post-handshake `CipherState`s, each
    /// carrying `ck` forward so they can be rekeyed independently later.
    pub fn split(&self) -> (CipherState, CipherState) {
        let (k1, k2) = hkdf2(&self.ck, &[]);
        (CipherState::new(k1, self.ck), CipherState::new(k2, self.ck))
    }
}
