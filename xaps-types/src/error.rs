//! Error types for xaps-types.

/// Errors raised while encoding a notification frame.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The device token is not valid hex.
    #[error("device token is not valid hex: {0}")]
    TokenNotHex(#[from] hex::FromHexError),

    /// The device token decodes to the wrong number of bytes.
    #[error("device token must decode to 32 bytes, got {len}")]
    TokenLength {
        /// Decoded length in bytes.
        len: usize,
    },

    /// The payload could not be serialized to JSON.
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),

    /// An item payload exceeds the 16-bit item length field.
    #[error("item too large for wire format: {len} bytes")]
    ItemTooLarge {
        /// Item payload length in bytes.
        len: usize,
    },
}

/// Errors raised while parsing a command line.
#[derive(Debug, thiserror::Error)]
pub enum CommandParseError {
    /// The line has no space-separated command name.
    #[error("no command name found")]
    MissingName,

    /// A key/value pair has no `=` separator.
    #[error("no key/value pair found in {pair:?}")]
    MissingSeparator {
        /// The offending pair text.
        pair: String,
    },

    /// A value is neither a quoted string nor a quoted list.
    #[error("invalid value for key {key:?}")]
    InvalidValue {
        /// The key whose value is malformed.
        key: String,
    },
}
