use thiserror::Error;

/// Failures while decoding or encoding a DNS packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("packet truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("unsupported label type {0:#04x}")]
    BadLabel(u8),

    #[error("compression pointer to {pointer} at offset {offset} does not point backwards")]
    BadPointer { pointer: usize, offset: usize },

    #[error("name exceeds 255 bytes")]
    NameTooLong,

    #[error("label is not valid UTF-8")]
    InvalidUtf8,

    #[error("label of {0} bytes exceeds 63")]
    LabelTooLong(usize),

    #[error("name {0:?} contains an empty label")]
    EmptyLabel(String),

    #[error("TXT entry of {0} bytes exceeds 255")]
    TxtEntryTooLong(usize),

    #[error("NSEC bitmap window {0} is not supported")]
    UnsupportedWindow(u8),

    #[error("NSEC bitmap of {0} bytes exceeds 32")]
    BitmapTooLong(usize),

    #[error("record data overruns its declared length of {0} bytes")]
    RdataOverrun(usize),

    #[error("{rtype} record for {name:?} has no address of its family")]
    AddressMismatch { name: String, rtype: &'static str },

    #[error("TXT key {0:?} is empty or contains '='")]
    InvalidTxtKey(String),

    #[error("{0} entries do not fit in one message")]
    TooManyEntries(usize),
}
