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

//! A minimal BigSize-keyed TLV stream, just enough to carry `Init`'s
//! feature/extension tail. Unknown odd types round-trip untouched; unknown
//! even types are rejected, per the usual "it's okay to be odd" rule.

use std::io;

use super::codec::{WireDecode, WireEncode, WireError};

fn read_bigsize<D: io::Read>(mut d: D) -> Result<u64, WireError> {
    let mut first = [0u8; 1];
    d.read_exact(&mut first)?;
    match first[0] {
        0xff => {
            let mut buf = [0u8; 8];
            d.read_exact(&mut buf)?;
            Ok(u64::from_be_bytes(buf))
        }
        0xfe => {
            let mut buf = [0u8; 4];
            d.read_exact(&mut buf)?;
            Ok(u32::from_be_bytes(buf) as u64)
        }
        0xfd => {
            let mut buf = [0u8; 2];
            d.read_exact(&mut buf)?;
            Ok(u16::from_be_bytes(buf) as u64)
        }
        n => Ok(n as u64),
    }
}

fn write_bigsize<E: io::Write>(value: u64, mut e: E) -> Result<usize, WireError> {
    if value < 0xfd {
        e.write_all(&[value as u8])?;
        Ok(1)
    } else if value <= u16::MAX as u64 {
        e.write_all(&[0xfd])?;
        e.write_all(&(value as u16).to_be_bytes())?;
        Ok(3)
    } else if value <= u32::MAX as u64 {
        e.write_all(&[0xfe])?;
        e.write_all(&(value as u32).to_be_bytes())?;
        Ok(5)
    } else {
        e.write_all(&[0xff])?;
        e.write_all(&value.to_be_bytes())?;
        Ok(9)
    }
}

/// One `type ‖ length ‖ value` record in a TLV stream.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TlvRecord {
    pub ty: u64,
    pub value: Vec<u8>,
}

/// An ordered sequence of TLV records occupying the remainder of a message
/// body. Known even types the bridge does not itself understand are
/// rejected at decode time; unknown odd types are kept verbatim so they can
/// be re-serialized unchanged (forward compatibility).
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct TlvStream {
    pub records: Vec<TlvRecord>,
}

impl TlvStream {
    pub fn empty() -> Self {
        TlvStream { records: Vec::new() }
    }

    pub fn get(&self, ty: u64) -> Option<&[u8]> {
        self.records.iter().find(|r| r.ty == ty).map(|r| r.value.as_slice())
    }

    /// Decode every record out of `data`, rejecting any even type not in
    /// `known_types`.
    pub fn decode_checked(data: &[u8], known_types: &[u64]) -> Result<Self, WireError> {
        let mut cursor = io::Cursor::new(data);
        let mut records = Vec::new();
        while (cursor.position() as usize) < data.len() {
            let ty = read_bigsize(&mut cursor)?;
            let len = read_bigsize(&mut cursor)? as usize;
            let mut value = vec![0u8; len];
            cursor.read_exact(&mut value)?;
            if ty % 2 == 0 && !known_types.contains(&ty) {
                return Err(WireError::UnknownRequiredTlv(ty));
            }
            records.push(TlvRecord { ty, value });
        }
        Ok(TlvStream { records })
    }
}

impl WireEncode for TlvStream {
    fn wire_encode<E: io::Write>(&self, mut e: E) -> Result<usize, WireError> {
        let mut written = 0;
        for record in &self.records {
            written += write_bigsize(record.ty, &mut e)?;
            written += write_bigsize(record.value.len() as u64, &mut e)?;
            e.write_all(&record.value)?;
            written += record.value.len();
        }
        Ok(written)
    }
}

impl WireDecode for TlvStream {
    /// Decodes to end-of-reader with no even-type checking; callers that
    /// need the it's-okay-to-be-odd check read the raw tail and call
    /// [`TlvStream::decode_checked`] instead.
    fn wire_decode<D: io::Read>(mut d: D) -> Result<Self, WireError> {
        let mut data = Vec::new();
        d.read_to_end(&mut data)?;
        TlvStream::decode_checked(&data, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_odd_type_round_trips() {
        let stream = TlvStream {
            records: vec![TlvRecord { ty: 1, value: vec![0xaa, 0xbb] }],
        };
        let bytes = stream.wire_serialize();
        let decoded = TlvStream::decode_checked(&bytes, &[]).unwrap();
        assert_eq!(decoded, stream);
    }

    #[test]
    fn unknown_even_type_is_rejected() {
        let stream = TlvStream { records: vec![TlvRecord { ty: 2, value: vec![] }] };
        let bytes = stream.wire_serialize();
        assert!(matches!(
            TlvStream::decode_checked(&bytes, &[]),
            Err(WireError::UnknownRequiredTlv(2))
        ));
    }

    #[test]
    fn known_even_type_is_accepted() {
        let stream = TlvStream { records: vec![TlvRecord { ty: 4, value: vec![0x01] }] };
        let bytes = stream.wire_serialize();
        let decoded = TlvStream::decode_checked(&bytes, &[4]).unwrap();
        assert_eq!(decoded.get(4), Some(&[0x01][..]));
    }

    #[test]
    fn bigsize_large_value_round_trips() {
        let stream = TlvStream { records: vec![TlvRecord { ty: 70_000, value: vec![0u8; 300] }] };
        let bytes = stream.wire_serialize();
        let decoded = TlvStream::decode_checked(&bytes, &[70_000]).unwrap();
        assert_eq!(decoded, stream);
    }
}
