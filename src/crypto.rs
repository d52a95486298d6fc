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

//! HChaCha20: the `(key, 16-byte input) -> 32-byte subkey` construction
//! XChaCha20 needs for its extended nonce. Hand-rolled rather
//! than pulled from the `chacha20` crate's internals, since the one detail
//! that matters — output the state words *without* adding the initial
//! state back in — is exactly the kind of thing that silently breaks
//! interop with LND if a generic helper does it differently.

const CONSTANTS: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

#[inline]
fn quarter_round(state: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    state[a] = state[a].wrapping_add(state[b]);
    state[d] ^= state[a];
    state[d] = state[d].rotate_left(16);

    state[c] = state[c].wrapping_add(state[d]);
    state[b] ^= state[c];
    state[b] = state[b].rotate_left(12);

    state[a] = state[a].wrapping_add(state[b]);
    state[d] ^= state[a];
    state[d] = state[d].rotate_left(8);

    state[c] = state[c].wrapping_add(state[d]);
    state[b] ^= state[c];
    state[b] = state[b].rotate_left(7);
}

/// `HChaCha20(key, input) -> subkey` per the XChaCha20 draft: 10 column/
/// diagonal round pairs over the standard ChaCha20 state, initialised with
/// the constants, the key, and the 16-byte input in place of counter+nonce.
pub fn hchacha20(key: &[u8; 32], input: &[u8; 16]) -> [u8; 32] {
    let mut state = [0u32; 16];
    state[0..4].copy_from_slice(&CONSTANTS);
    for i in 0..8 {
        state[4 + i] = u32::from_le_bytes(key[i * 4..i * 4 + 4].try_into().unwrap());
    }
    for i in 0..4 {
        state[12 + i] = u32::from_le_bytes(input[i * 4..i * 4 + 4].try_into().unwrap());
    }

    for _ in 0..10 {
        // column round
        quarter_round(&mut state, 0, 4, 8, 12);
        quarter_round(&mut state, 1, 5, 9, 13);
        quarter_round(&mut state, 2, 6, 10, 14);
        quarter_round(&mut state, 3, 7, 11, 15);
        // diagonal round
        quarter_round(&mut state, 0, 5, 10, 15);
        quarter_round(&mut state, 1, 6, 11, 12);
        quarter_round(&mut state, 2, 7, 8, 13);
        quarter_round(&mut state, 3, 4, 9, 14);
    }

    let mut out = [0u8; 32];
    for (i, word) in state[0..4].iter().chain(state[12..16].iter()).enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// HChaCha20 test vector from the XChaCha20 draft.
    #[test]
    fn hchacha20_vector() {
        let mut key = [0u8; 32];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8;
        }
        let input = hex::decode("000000090000004a0000000031415927").unwrap();
        let input: [u8; 16] = input.try_into().unwrap();

        let expected = hex::decode(
            "82413b4227b27bfed30e42508a877d73\
             a0f9e4d58a74a853c12ec41326d3ecdc",
        )
        .unwrap();

        let subkey = hchacha20(&key, &input);
        assert_eq!(&subkey[..], &expected[..]);
    }
}
