//! Huffman compression of byte streams.
//!
//! Codes are built from a single counting pass over the input and shipped in
//! a compact header ahead of the bit-packed payload, so a compressed file can
//! be decoded on its own.

pub mod bits;
pub mod dictionary;
pub mod error;
pub mod frequency;
pub mod huffman;
pub mod transform;
pub(crate) mod util;

pub use self::{
    error::{Error, Result},
    frequency::FrequencyTable,
    huffman::{Code, CodeTable, Tree},
    transform::{compress, decompress, transform, Config, Decoder, Encoder, Input, Stats, Summary},
};
