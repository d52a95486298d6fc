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

//! Minimal big-endian wire codec for the tower wire protocol.
//!
//! This mirrors the `LightningEncode`/`LightningDecode` trait split the
//! wider LNP-BP ecosystem uses for BOLT message types, but is hand-rolled
//! rather than derived: our message table is small and fixed, and every
//! field here has an exact byte layout mandated by wire compatibility with
//! an existing LND tower, so a derive macro buys us nothing a handful of
//! manual impls doesn't already give directly.

use std::io;

/// Errors arising while decoding a wire message body.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum WireError {
    /// I/O error while framing a message
    #[from]
    Io(amplify::IoError),

    /// data size {0} exceeds the 65535-byte maximum for a single frame
    TooLargeData(usize),

    /// unknown required (even) TLV type {0}
    UnknownRequiredTlv(u64),

    /// message body was shorter than required
    UnexpectedEof,
}

impl From<std::io::Error> for WireError {
    fn from(e: std::io::Error) -> Self {
        WireError::Io(amplify::IoError::from(e))
    }
}

pub trait WireEncode {
    fn wire_encode<E: io::Write>(&self, e: E) -> Result<usize, WireError>;

    fn wire_serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.wire_encode(&mut buf).expect("writing to a Vec never fails");
        buf
    }
}

pub trait WireDecode: Sized {
    fn wire_decode<D: io::Read>(d: D) -> Result<Self, WireError>;
}

impl WireEncode for u8 {
    fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
        e.write_all(&[*self])?;
        Ok(1)
    }
}

impl WireDecode for u8 {
    fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
        let mut buf = [0u8; 1];
        d.read_exact(&mut buf)?;
        Ok(buf[0])
    }
}

macro_rules! impl_be_int {
    ($ty:ty, $len:expr) => {
        impl WireEncode for $ty {
            fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
                let bytes = self.to_be_bytes();
                e.write_all(&bytes)?;
                Ok(bytes.len())
            }
        }

        impl WireDecode for $ty {
            fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
                let mut buf = [0u8; $len];
                d.read_exact(&mut buf)?;
                Ok(<$ty>::from_be_bytes(buf))
            }
        }
    };
}

impl_be_int!(u16, 2);
impl_be_int!(u32, 4);
impl_be_int!(u64, 8);

impl<const N: usize> WireEncode for [u8; N] {
    fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
        e.write_all(self)?;
        Ok(N)
    }
}

impl<const N: usize> WireDecode for [u8; N] {
    fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
        let mut buf = [0u8; N];
        d.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// A length-prefixed (`u16` count) byte vector, used for the TLV stream
/// tail of `Init` and similar variable-length message bodies.
pub struct LenPrefixedBytes(pub Vec<u8>);

impl WireEncode for LenPrefixedBytes {
    fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
        if self.0.len() > u16::MAX as usize {
            return Err(WireError::TooLargeData(self.0.len()));
        }
        let len = self.0.len() as u16;
        let mut written = len.wire_encode(&mut e)?;
        e.write_all(&self.0)?;
        written += self.0.len();
        Ok(written)
    }
}

impl WireDecode for LenPrefixedBytes {
    fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
        let len = u16::wire_decode(&mut d)? as usize;
        let mut buf = vec![0u8; len];
        d.read_exact(&mut buf)?;
        Ok(LenPrefixedBytes(buf))
    }
}
