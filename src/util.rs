use std::io::{ErrorKind, Read, Result as IoResult};

/// Reads until `buffer` is full or the reader is exhausted, returning how
/// many bytes were read. A short count therefore always means end of input.
pub fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> IoResult<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(count) => filled += count,
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
    Ok(filled)
}

/// Renders the low `width` bits of `value` as `0`/`1`, most significant first.
pub fn bit_string(value: u32, width: u8) -> String {
    (0..width)
        .rev()
        .map(|bit| if (value >> bit) & 1 == 1 { '1' } else { '0' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most three bytes per call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
            let count = buf.len().min(self.0.len()).min(3);
            buf[..count].copy_from_slice(&self.0[..count]);
            self.0 = &self.0[count..];
            Ok(count)
        }
    }

    #[test]
    fn test_read_full() {
        let data: Vec<u8> = (0..20).collect();
        let mut buffer = [0u8; 8];
        let mut reader = Trickle(&data);
        assert_eq!(read_full(&mut reader, &mut buffer).unwrap(), 8);
        assert_eq!(buffer, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(read_full(&mut reader, &mut buffer).unwrap(), 8);
        assert_eq!(read_full(&mut reader, &mut buffer).unwrap(), 4);
        assert_eq!(read_full(&mut reader, &mut buffer).unwrap(), 0);

        let mut cursor = Cursor::new(vec![]);
        assert_eq!(read_full(&mut cursor, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_bit_string() {
        assert_eq!(bit_string(0b1011, 4), "1011");
        assert_eq!(bit_string(0b1011, 6), "001011");
        assert_eq!(bit_string(0xff, 0), "");
        assert_eq!(bit_string(u32::MAX, 31).len(), 31);
    }
}
