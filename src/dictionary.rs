//! Self-describing code table that precedes every compressed payload.
//!
//! ```text
//! [1 byte: 5 reserved bits | 3 bits used in the file's last byte (0 = all)]
//! [32 bytes: presence bitmap, bit i set if byte value i has a code]
//! [per present symbol, ascending: 5-bit code length, then the code itself]
//! ```
//!
//! Entries are bit-packed and the payload continues on the same bit cursor.

use crate::{
    bits::{BitReader, BitWriter},
    error::{Error, Result},
    huffman::{Code, CodeTable},
};
use bitvec::prelude::*;
use std::io::{Read, Write};
use tracing::debug;

/// Width of the code length field of an entry.
pub const LENGTH_BITS: u8 = 5;

pub const BITMAP_BYTES: usize = 32;

/// Flags byte plus presence bitmap.
pub const HEADER_BYTES: usize = 1 + BITMAP_BYTES;

const FINAL_BITS_MASK: u8 = 0b111;

type Bitmap = BitArray<[u8; BITMAP_BYTES], Msb0>;

/// Decoded header of a compressed stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Bits used in the stream's last byte, zero meaning all eight.
    pub final_bits: u8,
    pub codes: CodeTable,
}

/// Bits the entries of `codes` take up, header bytes excluded.
pub fn dictionary_bits(codes: &CodeTable) -> u64 {
    codes
        .iter()
        .map(|(_, code)| u64::from(LENGTH_BITS + code.depth))
        .sum()
}

/// Writes the header for `codes` followed by a payload of `payload_bits`
/// bits. Returns the final-byte bit count stored in the flags byte.
pub fn write_dictionary<W: Write>(
    codes: &CodeTable,
    payload_bits: u64,
    writer: &mut BitWriter<W>,
) -> Result<u8> {
    let final_bits = ((dictionary_bits(codes) + payload_bits) % 8) as u8;

    let mut bitmap = Bitmap::new([0; BITMAP_BYTES]);
    for (symbol, _) in codes.iter() {
        bitmap.set(usize::from(symbol), true);
    }

    writer.write_bits(u32::from(final_bits), 8)?;
    writer.write_bytes(bitmap.as_raw_slice())?;
    for (_, code) in codes.iter() {
        writer.write_bits(u32::from(code.depth), LENGTH_BITS)?;
        writer.write_code(code)?;
    }

    debug!(
        symbols = codes.len(),
        bits = writer.bits(),
        final_bits,
        "wrote dictionary"
    );
    Ok(final_bits)
}

/// Reads a header, leaving `reader` on the first payload bit.
pub fn read_dictionary<R: Read>(reader: &mut BitReader<R>) -> Result<Header> {
    if reader.buffered_bytes() < HEADER_BYTES {
        return Err(Error::CorruptDictionary("stream is shorter than the header"));
    }

    let flags = read(reader, 8, "missing flags byte")? as u8;
    if flags & !FINAL_BITS_MASK != 0 {
        return Err(Error::CorruptDictionary("reserved flag bits are set"));
    }
    let final_bits = flags & FINAL_BITS_MASK;
    reader.set_final_bits(final_bits);

    let mut bitmap = Bitmap::new([0; BITMAP_BYTES]);
    for byte in bitmap.as_raw_mut_slice() {
        *byte = read(reader, 8, "truncated presence bitmap")? as u8;
    }

    let mut codes = CodeTable::default();
    for symbol in bitmap.iter_ones() {
        let depth = read(reader, LENGTH_BITS, "truncated dictionary entry")? as u8;
        if depth == 0 {
            return Err(Error::CorruptDictionary("zero-length code"));
        }
        let bits = read(reader, depth, "truncated dictionary entry")?;
        codes.insert(symbol as u8, Code::new(depth, bits));
    }

    debug!(
        symbols = codes.len(),
        bits = reader.consumed(),
        final_bits,
        "read dictionary"
    );
    Ok(Header { final_bits, codes })
}

fn read<R: Read>(reader: &mut BitReader<R>, width: u8, missing: &'static str) -> Result<u32> {
    reader
        .read_bits(width)?
        .ok_or(Error::CorruptDictionary(missing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::FrequencyTable;
    use proptest::prelude::*;
    use std::io::Cursor;
    use test_strategy::proptest;

    fn encode(codes: &CodeTable, payload_bits: u64) -> Vec<u8> {
        let mut writer = BitWriter::new(vec![]);
        write_dictionary(codes, payload_bits, &mut writer).unwrap();
        writer.finish().unwrap()
    }

    fn decode(bytes: Vec<u8>) -> Result<Header> {
        read_dictionary(&mut BitReader::new(Cursor::new(bytes))?)
    }

    #[proptest]
    fn test_roundtrip(input: Vec<u8>) {
        let codes = CodeTable::from_frequencies(&FrequencyTable::from_bytes(&input)).unwrap();
        let bytes = encode(&codes, 0);
        prop_assert_eq!(
            bytes.len() as u64,
            HEADER_BYTES as u64 + dictionary_bits(&codes).div_ceil(8)
        );

        let header = decode(bytes).unwrap();
        prop_assert_eq!(u64::from(header.final_bits), dictionary_bits(&codes) % 8);
        prop_assert_eq!(header.codes, codes);
    }

    #[test]
    fn test_layout() {
        let mut codes = CodeTable::default();
        codes.insert(0, Code::new(1, 0));
        codes.insert(255, Code::new(2, 0b11));
        let bytes = encode(&codes, 3);

        // (5 + 1) + (5 + 2) + 3 = 16 bits, so the last byte is full
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[1], 0b1000_0000);
        assert!(bytes[2..32].iter().all(|byte| *byte == 0));
        assert_eq!(bytes[32], 0b0000_0001);
        // 00001 0 00010 11
        assert_eq!(&bytes[33..], &[0b0000_1000, 0b0101_1000]);

        let bytes = encode(&codes, 4);
        assert_eq!(bytes[0], 1);
    }

    #[test]
    fn test_empty() {
        let codes = CodeTable::default();
        let bytes = encode(&codes, 0);
        assert_eq!(bytes, vec![0; HEADER_BYTES]);
        let header = decode(bytes).unwrap();
        assert!(header.codes.is_empty());
        assert_eq!(header.final_bits, 0);
    }

    #[test]
    fn test_short_header() {
        let error = decode(vec![0; HEADER_BYTES - 1]).unwrap_err();
        assert!(matches!(error, Error::CorruptDictionary(_)));
        assert!(matches!(decode(vec![]), Err(Error::CorruptDictionary(_))));
    }

    #[test]
    fn test_reserved_flags() {
        let mut bytes = vec![0; HEADER_BYTES];
        bytes[0] = 0b0000_1000;
        assert!(matches!(decode(bytes), Err(Error::CorruptDictionary(_))));
    }

    #[test]
    fn test_bitmap_overclaims() {
        let mut bytes = vec![0xff; HEADER_BYTES + 4];
        bytes[0] = 0;
        assert!(matches!(decode(bytes), Err(Error::CorruptDictionary(_))));
    }

    #[test]
    fn test_zero_length_code() {
        let mut bytes = vec![0; HEADER_BYTES + 2];
        bytes[1] = 0b1000_0000;
        assert!(matches!(
            decode(bytes),
            Err(Error::CorruptDictionary("zero-length code"))
        ));
    }
}
