use crate::{
    error::{Error, Result},
    huffman::WeightedItem,
    util::read_full,
};
use std::{
    borrow::BorrowMut,
    fs::File,
    io::{ErrorKind, Read, Result as IoResult, Write},
    path::Path,
};
use tracing::debug;

/// Size of the chunks files are read in.
pub const CHUNK_SIZE: usize = 1024;

/// Occurrence counts of every byte value in an input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: [u64; 256],
    total: u64,
    unique: u16,
}

impl Default for FrequencyTable {
    fn default() -> Self {
        FrequencyTable {
            counts: [0; 256],
            total: 0,
            unique: 0,
        }
    }
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(input: &[u8]) -> Self {
        let mut table = Self::new();
        table.insert(input);
        table
    }

    /// Counts everything `reader` yields, pulling it in [`CHUNK_SIZE`] pieces.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut table = Self::new();
        let mut buffer = [0u8; CHUNK_SIZE];
        loop {
            let count = read_full(&mut reader, &mut buffer)?;
            table.insert(&buffer[..count]);
            if count < CHUNK_SIZE {
                break;
            }
        }
        debug!(total = table.total, unique = table.unique, "counted input");
        Ok(table)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|error| match error.kind() {
            ErrorKind::NotFound => Error::InputNotFound { path: path.into() },
            _ => error.into(),
        })?;
        Self::from_reader(file)
    }

    pub fn insert(&mut self, input: &[u8]) {
        for &byte in input {
            let count = &mut self.counts[usize::from(byte)];
            if *count == 0 {
                self.unique += 1;
            }
            *count += 1;
        }
        self.total += input.len() as u64;
    }

    pub fn get(&self, symbol: u8) -> u64 {
        self.counts[usize::from(symbol)]
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn unique(&self) -> u16 {
        self.unique
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Used symbols with their counts, in ascending symbol order.
    pub fn iter(&self) -> impl Iterator<Item = WeightedItem> + '_ {
        (0..=u8::MAX)
            .zip(self.counts.iter())
            .filter(|(_, count)| **count > 0)
            .map(|(item, count)| WeightedItem {
                weight: *count,
                item,
            })
    }

    /// Shannon entropy of the input in bits per symbol.
    pub fn entropy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let total = self.total as f64;
        self.iter()
            .map(|item| {
                let p = item.weight as f64 / total;
                -p * p.log2()
            })
            .sum()
    }

    pub fn writer(&mut self) -> Writer<&mut Self> {
        Writer::new(self)
    }

    pub fn into_writer(self) -> Writer<Self> {
        Writer::new(self)
    }
}

/// Counting sink, lets a table be filled with `io::copy`.
#[derive(Debug, Clone)]
pub struct Writer<T: BorrowMut<FrequencyTable>> {
    table: T,
}

impl<T: BorrowMut<FrequencyTable>> Writer<T> {
    pub fn new(table: T) -> Self {
        Writer { table }
    }

    pub fn finish(self) -> T {
        self.table
    }
}

impl<T: BorrowMut<FrequencyTable>> Write for Writer<T> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.table.borrow_mut().insert(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
