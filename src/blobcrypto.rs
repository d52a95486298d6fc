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

//! Blob crypto: XChaCha20-Poly1305 encryption of the
//! `JusticeKitV0` plaintext, keyed on the raw (unreversed) breach txid so a
//! tower can derive the key directly from a candidate on-chain transaction.

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, KeyInit};
use rand::RngCore;

use crate::crypto::hchacha20;
use crate::error::CryptoError;
use crate::justice::JUSTICE_KIT_LEN;
use crate::model::EncryptedBlob;

/// `encrypt(key, plaintext) -> EncryptedBlob`. Generates a
/// fresh random 24-byte nonce, derives the 32-byte subkey via HChaCha20
/// from its first 16 bytes, and encrypts under plain ChaCha20-Poly1305
/// (RFC 8439) with a 12-byte sub-nonce of `0x00000000 ‖ nonce[16..24]`.
pub fn encrypt(
    key: &[u8; 32],
    plaintext: &[u8; JUSTICE_KIT_LEN],
) -> Result<EncryptedBlob, CryptoError> {
    let mut nonce = [0u8; EncryptedBlob::NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut out = [0u8; EncryptedBlob::LEN];
    out[..EncryptedBlob::NONCE_LEN].copy_from_slice(&nonce);
    seal_with_nonce(key, &nonce, plaintext, &mut out[EncryptedBlob::NONCE_LEN..])?;

    Ok(EncryptedBlob::from_bytes(out))
}

/// `decrypt(key, blob) -> plaintext`, failing with [`CryptoError::AuthFailure`]
/// on tag mismatch.
pub fn decrypt(
    key: &[u8; 32],
    blob: &EncryptedBlob,
) -> Result<[u8; JUSTICE_KIT_LEN], CryptoError> {
    let nonce: [u8; EncryptedBlob::NONCE_LEN] =
        blob.nonce().try_into().expect("EncryptedBlob::NONCE_LEN bytes");
    let subkey = hchacha20(key, nonce_prefix16(&nonce));
    let sub_nonce = sub_nonce12(&nonce);

    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(&subkey));
    let mut buf = blob.ciphertext_and_tag()[..JUSTICE_KIT_LEN].to_vec();
    let tag = &blob.ciphertext_and_tag()[JUSTICE_KIT_LEN..];

    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(&sub_nonce),
            b"",
            &mut buf,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthFailure)?;

    let mut plaintext = [0u8; JUSTICE_KIT_LEN];
    plaintext.copy_from_slice(&buf);
    Ok(plaintext)
}

fn nonce_prefix16(nonce: &[u8; EncryptedBlob::NONCE_LEN]) -> &[u8; 16] {
    nonce[..16].try_into().expect("16 bytes")
}

fn sub_nonce12(nonce: &[u8; EncryptedBlob::NONCE_LEN]) -> [u8; 12] {
    let mut sub = [0u8; 12];
    sub[4..].copy_from_slice(&nonce[16..]);
    sub
}

fn seal_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; EncryptedBlob::NONCE_LEN],
    plaintext: &[u8; JUSTICE_KIT_LEN],
    out: &mut [u8],
) -> Result<(), CryptoError> {
    let subkey = hchacha20(key, nonce_prefix16(nonce));
    let sub_nonce = sub_nonce12(nonce);

    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(&subkey));
    let mut buf = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&sub_nonce), b"", &mut buf)
        .map_err(|_| CryptoError::AuthFailure)?;

    out[..JUSTICE_KIT_LEN].copy_from_slice(&buf);
    out[JUSTICE_KIT_LEN..].copy_from_slice(&tag);
    Ok(())
}
