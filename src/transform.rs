use crate::{
    bits::{BitReader, BitWriter},
    dictionary::{dictionary_bits, read_dictionary, write_dictionary, HEADER_BYTES},
    error::{Error, Result},
    frequency::{FrequencyTable, CHUNK_SIZE},
    huffman::CodeTable,
    util::{bit_string, read_full},
};
use hashbrown::HashMap;
use std::{
    borrow::Borrow,
    ffi::OsStr,
    fs::File,
    io::{self, ErrorKind, Read, Result as IoResult, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, trace};

/// Options for one encode or decode pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub decode: bool,
    /// Treat the input as a path rather than as the data itself.
    pub from_file: bool,
    /// Write to this file instead of the console.
    pub output_path: Option<PathBuf>,
    /// Run the transform without writing anything.
    pub suppress_output: bool,
    /// Show console output as `0`/`1` characters.
    pub binary_display: bool,
}

impl Config {
    pub fn input<'a>(&self, raw: &'a OsStr) -> Input<'a> {
        if self.from_file {
            Input::File(Path::new(raw))
        } else {
            Input::Bytes(raw.as_encoded_bytes())
        }
    }

    fn format(&self) -> OutputFormat {
        match self.output_path {
            None if self.binary_display => OutputFormat::Binary,
            _ => OutputFormat::Raw,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Bytes(&'a [u8]),
    File(&'a Path),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum State {
    ReadingHeader,
    #[default]
    Streaming,
    Flushing,
    Done,
}

/// Figures describing a finished transform. They do not affect its output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stats {
    /// Length of the uncompressed data.
    pub plain_bytes: u64,
    pub unique_symbols: u16,
    pub payload_bits: u64,
    /// Bits taken by dictionary entries.
    pub dictionary_bits: u64,
    /// Bits taken by the whole header, flags and bitmap included.
    pub header_bits: u64,
    pub average_code_length: f64,
    pub shannon_entropy: f64,
    pub elapsed: Duration,
}

impl Stats {
    fn new(frequencies: &FrequencyTable, codes: &CodeTable) -> Self {
        let dictionary_bits = dictionary_bits(codes);
        Stats {
            plain_bytes: frequencies.total(),
            unique_symbols: codes.len() as u16,
            payload_bits: codes.payload_bits(frequencies),
            dictionary_bits,
            header_bits: 8 * HEADER_BYTES as u64 + dictionary_bits,
            average_code_length: codes.average_code_length(frequencies),
            shannon_entropy: frequencies.entropy(),
            elapsed: Duration::ZERO,
        }
    }

    /// Size of the compressed file.
    pub fn compressed_bytes(&self) -> u64 {
        (self.header_bits + self.payload_bits).div_ceil(8)
    }

    /// Payload size relative to the uncompressed data.
    pub fn digest_ratio(&self) -> f64 {
        ratio(self.payload_bits, 8 * self.plain_bytes)
    }

    /// Compressed file size relative to the uncompressed data.
    pub fn file_ratio(&self) -> f64 {
        ratio(self.compressed_bytes(), self.plain_bytes)
    }

    /// Bits per symbol a fixed-length code over the same alphabet would need.
    pub fn fixed_length_bits(&self) -> u32 {
        match self.unique_symbols {
            0 | 1 => 0,
            unique => u16::BITS - (unique - 1).leading_zeros(),
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

/// Result of [`transform`].
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub codes: CodeTable,
    pub stats: Stats,
}

/// How bytes reaching the console are shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Raw,
    Binary,
}

/// Output window that hands its destination whole [`CHUNK_SIZE`] blocks.
/// Whatever is left over is carried to the front of the window.
pub struct Sink<W: Write> {
    inner: W,
    format: OutputFormat,
    buffer: Vec<u8>,
    written: u64,
}

impl<W: Write> Sink<W> {
    pub fn new(inner: W, format: OutputFormat) -> Self {
        Sink {
            inner,
            format,
            buffer: Vec::with_capacity(CHUNK_SIZE + 8),
            written: 0,
        }
    }

    /// Bytes handed to the destination so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    fn emit(&mut self, count: usize) -> IoResult<()> {
        match self.format {
            OutputFormat::Raw => self.inner.write_all(&self.buffer[..count])?,
            OutputFormat::Binary => {
                let bits: String = self.buffer[..count]
                    .iter()
                    .map(|byte| bit_string(u32::from(*byte), 8))
                    .collect();
                self.inner.write_all(bits.as_bytes())?;
            }
        }
        self.written += count as u64;
        self.buffer.drain(..count);
        Ok(())
    }

    /// Writes out what is left. In binary format only `final_bits` bits of
    /// the last byte are shown, zero meaning all of them.
    pub fn finish(mut self, final_bits: u8) -> IoResult<W> {
        match (self.format, self.buffer.last().copied()) {
            (OutputFormat::Binary, Some(last)) if final_bits % 8 != 0 => {
                self.emit(self.buffer.len() - 1)?;
                let bits = bit_string(u32::from(last >> (8 - final_bits)), final_bits);
                self.inner.write_all(bits.as_bytes())?;
                self.written += 1;
                self.buffer.clear();
            }
            _ => self.emit(self.buffer.len())?,
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for Sink<W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.buffer.extend_from_slice(buf);
        // keep the newest byte back so `finish` can render it partially
        while self.buffer.len() > CHUNK_SIZE {
            trace!(carried = self.buffer.len() - CHUNK_SIZE, "flushing output block");
            self.emit(CHUNK_SIZE)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush()
    }
}

/// Packs the code of every byte it is given into `W`.
pub struct Encoder<H: Borrow<CodeTable>, W: Write> {
    codes: H,
    writer: BitWriter<W>,
    header_bits: u64,
}

impl<H: Borrow<CodeTable>, W: Write> Encoder<H, W> {
    pub fn new(codes: H, writer: W) -> Self {
        Encoder {
            codes,
            writer: BitWriter::new(writer),
            header_bits: 0,
        }
    }

    /// Writes the dictionary for a payload of `payload_bits` bits. Must come
    /// before any payload.
    pub fn write_header(&mut self, payload_bits: u64) -> Result<u8> {
        let final_bits = write_dictionary(self.codes.borrow(), payload_bits, &mut self.writer)?;
        self.header_bits = self.writer.bits();
        Ok(final_bits)
    }

    pub fn encode(&mut self, input: &[u8]) -> Result<()> {
        let codes = self.codes.borrow();
        for &byte in input {
            let code = codes.get(byte);
            if !code.is_present() {
                return Err(Error::UnknownSymbol(byte));
            }
            self.writer.write_code(code)?;
        }
        Ok(())
    }

    /// Encodes everything `reader` yields, [`CHUNK_SIZE`] bytes at a time.
    /// Returns the number of bytes read.
    pub fn encode_reader<R: Read>(&mut self, mut reader: R) -> Result<u64> {
        let mut buffer = [0u8; CHUNK_SIZE];
        let mut total = 0;
        loop {
            let count = read_full(&mut reader, &mut buffer)?;
            self.encode(&buffer[..count])?;
            total += count as u64;
            if count < CHUNK_SIZE {
                return Ok(total);
            }
        }
    }

    pub fn header_bits(&self) -> u64 {
        self.header_bits
    }

    pub fn payload_bits(&self) -> u64 {
        self.writer.bits() - self.header_bits
    }

    /// Zero-pads the last byte and returns the destination.
    pub fn finish(self) -> Result<W> {
        debug!(
            header_bits = self.header_bits,
            payload_bits = self.payload_bits(),
            "finishing encode"
        );
        Ok(self.writer.finish()?)
    }
}

impl<H: Borrow<CodeTable>, W: Write> Write for Encoder<H, W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.encode(buf).map_err(|error| match error {
            Error::Io(error) => error,
            error => io::Error::new(ErrorKind::InvalidData, error),
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// Reads a dictionary header, then turns the payload back into bytes.
pub struct Decoder<R: Read> {
    reader: BitReader<R>,
    codes: CodeTable,
    lookup: HashMap<(u8, u32), u8>,
    depths: Vec<u8>,
    header_bits: u64,
    decoded: FrequencyTable,
    state: State,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut decoder = Decoder {
            reader: BitReader::new(reader)?,
            codes: CodeTable::default(),
            lookup: HashMap::new(),
            depths: Vec::new(),
            header_bits: 0,
            decoded: FrequencyTable::new(),
            state: State::ReadingHeader,
        };
        decoder.read_header()?;
        Ok(decoder)
    }

    fn read_header(&mut self) -> Result<()> {
        let header = read_dictionary(&mut self.reader)?;
        for (symbol, code) in header.codes.iter() {
            if self.lookup.insert((code.depth, code.bits), symbol).is_some() {
                return Err(Error::CorruptDictionary("duplicate code"));
            }
        }
        self.depths = self.lookup.keys().map(|(depth, _)| *depth).collect();
        self.depths.sort_unstable();
        self.depths.dedup();

        self.codes = header.codes;
        self.header_bits = self.reader.consumed();
        self.state = State::Streaming;
        Ok(())
    }

    pub fn codes(&self) -> &CodeTable {
        &self.codes
    }

    pub fn header_bits(&self) -> u64 {
        self.header_bits
    }

    pub fn payload_bits(&self) -> u64 {
        self.reader.consumed() - self.header_bits
    }

    /// Counts of everything decoded so far.
    pub fn decoded(&self) -> &FrequencyTable {
        &self.decoded
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Decodes one symbol, or returns `None` once the payload is used up.
    pub fn next_symbol(&mut self) -> Result<Option<u8>> {
        if self.reader.is_exhausted()? {
            self.state = State::Flushing;
            return Ok(None);
        }
        match self.matching() {
            Some((symbol, depth)) => {
                self.reader.skip(usize::from(depth));
                self.decoded.insert(&[symbol]);
                Ok(Some(symbol))
            }
            None => Err(Error::CorruptPayload {
                bit: self.reader.consumed(),
            }),
        }
    }

    /// Probes code lengths shortest first, growing the input value one bit
    /// per length so shared prefixes are only read once.
    fn matching(&self) -> Option<(u8, u8)> {
        let bits = self.reader.bits();
        let mut value = 0u32;
        let mut read = 0;
        for &depth in &self.depths {
            if usize::from(depth) > bits.len() {
                break;
            }
            while read < usize::from(depth) {
                value = (value << 1) | u32::from(bits[read]);
                read += 1;
            }
            if let Some(symbol) = self.lookup.get(&(depth, value)) {
                return Some((*symbol, depth));
            }
        }
        None
    }

    /// Decodes the whole payload into `writer`, returning the byte count.
    pub fn decode<W: Write>(&mut self, writer: &mut W) -> Result<u64> {
        let mut count = 0;
        while let Some(symbol) = self.next_symbol()? {
            writer.write_all(&[symbol])?;
            count += 1;
        }
        writer.flush()?;
        self.state = State::Done;
        debug!(count, payload_bits = self.payload_bits(), "decoded payload");
        Ok(count)
    }
}

/// Runs one encode or decode pass as described by `config`.
pub fn transform(config: &Config, input: Input<'_>) -> Result<Summary> {
    let start = Instant::now();
    let sink = Sink::new(open_output(config)?, config.format());
    let mut summary = if config.decode {
        decode_input(input, sink)?
    } else {
        encode_input(input, sink, config.output_path.is_some())?
    };
    summary.stats.elapsed = start.elapsed();
    debug!(elapsed = ?summary.stats.elapsed, "transform done");
    Ok(summary)
}

fn open_output(config: &Config) -> Result<Box<dyn Write>> {
    if config.suppress_output {
        return Ok(Box::new(io::sink()));
    }
    match &config.output_path {
        Some(path) => {
            let file = File::create(path).map_err(|source| Error::OutputOpen {
                path: path.clone(),
                source,
            })?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|error| match error.kind() {
        ErrorKind::NotFound => Error::InputNotFound { path: path.into() },
        _ => error.into(),
    })
}

fn encode_input<W: Write>(input: Input<'_>, sink: Sink<W>, with_header: bool) -> Result<Summary> {
    let frequencies = match input {
        Input::Bytes(bytes) => FrequencyTable::from_bytes(bytes),
        Input::File(path) => FrequencyTable::from_path(path)?,
    };
    let codes = CodeTable::from_frequencies(&frequencies)?;
    let stats = Stats::new(&frequencies, &codes);

    let mut encoder = Encoder::new(&codes, sink);
    if with_header {
        encoder.write_header(stats.payload_bits)?;
    }
    match input {
        Input::Bytes(bytes) => encoder.encode(bytes)?,
        Input::File(path) => {
            let count = encoder.encode_reader(open_input(path)?)?;
            if count != frequencies.total() {
                return Err(Error::Io(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "input changed between passes",
                )));
            }
        }
    }
    let final_bits = ((encoder.payload_bits() + encoder.header_bits()) % 8) as u8;
    encoder.finish()?.finish(final_bits)?;

    Ok(Summary { codes, stats })
}

fn decode_input<W: Write>(input: Input<'_>, mut sink: Sink<W>) -> Result<Summary> {
    let Input::File(path) = input else {
        return Err(Error::DecodeFromMemory);
    };
    let mut decoder = Decoder::new(open_input(path)?)?;
    decoder.decode(&mut sink)?;
    sink.finish(0)?;

    let codes = decoder.codes().clone();
    let mut stats = Stats::new(decoder.decoded(), &codes);
    stats.payload_bits = decoder.payload_bits();
    Ok(Summary { codes, stats })
}

/// Compresses `input` into a complete in-memory file, header included.
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    let frequencies = FrequencyTable::from_bytes(input);
    let codes = CodeTable::from_frequencies(&frequencies)?;
    let mut encoder = Encoder::new(&codes, Vec::new());
    encoder.write_header(codes.payload_bits(&frequencies))?;
    encoder.encode(input)?;
    encoder.finish()
}

pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = Decoder::new(input)?;
    let mut output = Vec::new();
    decoder.decode(&mut output)?;
    Ok(output)
}
