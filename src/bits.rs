use crate::{frequency::CHUNK_SIZE, huffman::Code, util::read_full};
use bitstream_io::{BigEndian, BitWrite};
use bitvec::prelude::*;
use std::io::{Read, Result as IoResult, Write};
use tracing::trace;

/// The window is refilled once fewer than this many unread bits remain, so a
/// dictionary entry (5 + 31 bits at any bit offset) always fits.
const REFILL_BITS: usize = 64;

/// MSB-first bit sink that keeps count of what it has been given.
pub struct BitWriter<W: Write> {
    writer: bitstream_io::BitWriter<W, BigEndian>,
    bits: u64,
}

impl<W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        BitWriter {
            writer: bitstream_io::BitWriter::endian(writer, BigEndian),
            bits: 0,
        }
    }

    /// Appends the low `width` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, width: u8) -> IoResult<()> {
        if width == 0 {
            return Ok(());
        }
        self.writer.write(u32::from(width), value)?;
        self.bits += u64::from(width);
        Ok(())
    }

    pub fn write_code(&mut self, code: Code) -> IoResult<()> {
        self.write_bits(code.bits, code.depth)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> IoResult<()> {
        self.writer.write_bytes(bytes)?;
        self.bits += 8 * bytes.len() as u64;
        Ok(())
    }

    /// Bits written so far, padding excluded.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Zero-pads the last partial byte and hands back the inner writer.
    pub fn finish(mut self) -> IoResult<W> {
        self.writer.byte_align()?;
        self.writer.flush()?;
        Ok(self.writer.into_writer())
    }
}

/// MSB-first bit source over a fixed window that slides along its reader.
pub struct BitReader<R: Read> {
    reader: R,
    window: Box<[u8; CHUNK_SIZE]>,
    filled: usize,
    position: usize,
    eof: bool,
    padding: u8,
    consumed: u64,
}

impl<R: Read> BitReader<R> {
    pub fn new(reader: R) -> IoResult<Self> {
        let mut reader = BitReader {
            reader,
            window: Box::new([0; CHUNK_SIZE]),
            filled: 0,
            position: 0,
            eof: false,
            padding: 0,
            consumed: 0,
        };
        reader.refill()?;
        Ok(reader)
    }

    /// Bytes the first fill pulled in, or fewer if the input was shorter.
    pub fn buffered_bytes(&self) -> usize {
        self.filled
    }

    /// Declares how many bits of the input's last byte are used, zero meaning
    /// the whole byte. The rest of that byte is never handed out.
    pub fn set_final_bits(&mut self, final_bits: u8) {
        self.padding = match final_bits % 8 {
            0 => 0,
            used => 8 - used,
        };
    }

    /// Total bits handed out so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Slides the unread bytes to the front and tops the window up if it is
    /// running low. Returns the number of bits now available.
    pub fn fill(&mut self) -> IoResult<usize> {
        if !self.eof && self.filled * 8 - self.position < REFILL_BITS {
            self.refill()?;
        }
        Ok(self.available())
    }

    fn refill(&mut self) -> IoResult<()> {
        let start = self.position / 8;
        self.window.copy_within(start..self.filled, 0);
        self.filled -= start;
        self.position -= start * 8;

        let count = read_full(&mut self.reader, &mut self.window[self.filled..])?;
        if self.filled + count < CHUNK_SIZE {
            self.eof = true;
        }
        self.filled += count;
        trace!(count, filled = self.filled, eof = self.eof, "refilled window");
        Ok(())
    }

    fn end(&self) -> usize {
        let end = self.filled * 8;
        if self.eof {
            end.saturating_sub(usize::from(self.padding))
        } else {
            end
        }
    }

    fn available(&self) -> usize {
        self.end().saturating_sub(self.position)
    }

    /// Unread bits currently in the window.
    pub fn bits(&self) -> &BitSlice<u8, Msb0> {
        let end = self.end().max(self.position);
        &self.window.view_bits::<Msb0>()[self.position..end]
    }

    /// True once every bit of the input has been handed out. Otherwise the
    /// window holds at least one full code afterwards.
    pub fn is_exhausted(&mut self) -> IoResult<bool> {
        Ok(self.fill()? == 0)
    }

    /// Reads `width` bits as a right-aligned value, or `None` if the input
    /// does not have that many left.
    pub fn read_bits(&mut self, width: u8) -> IoResult<Option<u32>> {
        let width = usize::from(width);
        if width == 0 {
            return Ok(Some(0));
        }
        if self.fill()? < width {
            return Ok(None);
        }
        let value = self.bits()[..width].load_be::<u32>();
        self.skip(width);
        Ok(Some(value))
    }

    /// Advances past `width` bits already checked to be available.
    pub fn skip(&mut self, width: usize) {
        self.position += width;
        self.consumed += width as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;
    use test_strategy::proptest;

    fn write(codes: &[Code]) -> (Vec<u8>, u64) {
        let mut writer = BitWriter::new(vec![]);
        for code in codes {
            writer.write_code(*code).unwrap();
        }
        let bits = writer.bits();
        (writer.finish().unwrap(), bits)
    }

    #[test]
    fn test_writer_msb_first() {
        let (bytes, bits) = write(&[Code::new(1, 1), Code::new(3, 0b010), Code::new(2, 0b11)]);
        assert_eq!(bits, 6);
        assert_eq!(bytes, vec![0b1010_1100]);
    }

    #[test]
    fn test_writer_spans_bytes() {
        let (bytes, bits) = write(&[Code::new(5, 0b10101), Code::new(7, 0b1110001)]);
        assert_eq!(bits, 12);
        assert_eq!(bytes, vec![0b1010_1111, 0b0001_0000]);

        let (bytes, _) = write(&[Code::new(31, 0x7fff_ffff), Code::new(1, 0)]);
        assert_eq!(bytes, vec![0xff, 0xff, 0xff, 0xfe]);
    }

    #[test]
    fn test_reader_final_bits() {
        let mut reader = BitReader::new(Cursor::new(vec![0b1011_0000])).unwrap();
        reader.set_final_bits(4);
        assert_eq!(reader.read_bits(3).unwrap(), Some(0b101));
        assert_eq!(reader.read_bits(2).unwrap(), None);
        assert_eq!(reader.read_bits(1).unwrap(), Some(1));
        assert!(reader.is_exhausted().unwrap());
        assert_eq!(reader.consumed(), 4);
    }

    #[test]
    fn test_reader_slides_window() {
        let input: Vec<u8> = (0..3000u32).map(|i| (i * 7) as u8).collect();
        let mut reader = BitReader::new(Cursor::new(input.clone())).unwrap();
        assert_eq!(reader.buffered_bytes(), CHUNK_SIZE);

        // an odd width keeps the cursor off byte boundaries across refills
        let mut writer = BitWriter::new(vec![]);
        while let Some(value) = reader.read_bits(13).unwrap() {
            writer.write_bits(value, 13).unwrap();
        }
        let rest = reader.bits().len();
        let value = reader.read_bits(rest as u8).unwrap().unwrap();
        writer.write_bits(value, rest as u8).unwrap();
        assert!(reader.is_exhausted().unwrap());
        assert_eq!(writer.finish().unwrap(), input);
    }

    #[proptest]
    fn test_roundtrip(#[strategy(proptest::collection::vec((1u8..=31, any::<u32>()), 0..400))] codes: Vec<(u8, u32)>) {
        let codes: Vec<Code> = codes
            .into_iter()
            .map(|(depth, bits)| Code::new(depth, bits & ((1 << depth) - 1)))
            .collect();
        let (bytes, bits) = write(&codes);
        prop_assert_eq!(bytes.len() as u64, bits.div_ceil(8));

        let mut reader = BitReader::new(Cursor::new(bytes)).unwrap();
        reader.set_final_bits((bits % 8) as u8);
        for code in &codes {
            prop_assert_eq!(reader.read_bits(code.depth).unwrap(), Some(code.bits));
        }
        prop_assert!(reader.is_exhausted().unwrap());
    }
}
