use std::{io, path::PathBuf};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("input file {path:?} does not exist")]
    InputNotFound { path: PathBuf },

    #[error("huffman code depth {depth} exceeds the maximum of {max}", max = crate::huffman::MAX_CODE_BITS)]
    DepthLimitExceeded { depth: u8 },

    #[error("byte {0:#04x} has no code in the dictionary")]
    UnknownSymbol(u8),

    #[error("corrupt dictionary: {0}")]
    CorruptDictionary(&'static str),

    #[error("corrupt payload: no code matches the input at bit {bit}")]
    CorruptPayload { bit: u64 },

    #[error("decoding is only supported for file inputs")]
    DecodeFromMemory,

    #[error("cannot open output file {path:?}")]
    OutputOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
