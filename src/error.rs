//! Typed error taxonomy for the core library.
//!
//! The CLI binary works in `anyhow::Result` and attaches context as it crosses
//! module boundaries; everything below `src/tools/` returns this enum so a
//! caller embedding the library can match on failure kind.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("offset {offset:#x} is outside the ROM buffer of size {size:#x}")]
    OutOfBounds { offset: u64, size: u64 },

    #[error("script header at {0:#x} claims a size past end of ROM")]
    TruncatedScript(u64),

    #[error("malformed strtab: {0}")]
    MalformedStrtab(String),

    #[error("strtab index {index} is out of range (nentries={nentries})")]
    InvalidIndex { index: u32, nentries: u32 },

    #[error("output buffer too small: needed at least {needed} bytes, had {have}")]
    BufferTooSmall { needed: usize, have: usize },

    #[error("huffman dictionary exceeds its fixed capacity")]
    DictTooLarge,

    #[error("encoder ran out of destination space")]
    OutOfSpace,

    #[error("message offset {0:#x} exceeds the 3-byte field's range")]
    OffsetOverflow(u32),

    #[error("emitted label offset {0:#x} exceeds 0xFFFF")]
    JumpOutOfRange(u32),

    #[error("branch at command offset {branch:#x} targets label {label:#x} which precedes it")]
    BackwardBranch { branch: u16, label: u16 },

    #[error("branch at command offset {branch:#x} would be intercepted by opcode at {intercepted:#x} before reaching label {label:#x}")]
    IntermediateBranchTarget {
        branch: u16,
        label: u16,
        intercepted: u16,
    },

    #[error("script is missing its `.begin branch_info` / `.end branch_info` section markers")]
    MissingBranchInfo,

    #[error("strtab index-file entry index {0} is out of range (must be < 10000)")]
    EmbedIndexOutOfRange(u32),

    #[error("bit stream exhausted before the requested bit/byte could be read")]
    EndOfBuffer,
}

pub type Result<T> = std::result::Result<T, Error>;
