//! Closed error taxonomy for the payload decoder.
//!
//! Every fallible decode path bottoms out in one of these values; callers
//! stack free-form context on top with `anyhow::Context`, so the rendered
//! chain reads as a trace from the failing read back up to the top-level
//! decode call. Use `Error::downcast_ref::<DecodeError>()` to get the
//! typed value back out of an `anyhow::Error`.

/// The error type used by the decoder
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    // container errors
    /// the file does not start with an MZ stub
    #[error("invalid EXE signature")]
    InvalidExeSignature,
    /// the MZ stub does not point at a PE\0\0 header
    #[error("invalid PE signature")]
    InvalidPeSignature,
    /// no game magic found after the PE sections
    #[error("invalid game signature")]
    InvalidGameSignature,

    // walker errors
    /// an operation was attempted before the decoder reached the required state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// a chunk carried an encoding mode outside 0..=3
    #[error("invalid encoding mode {0}")]
    InvalidMode(u16),
    /// a chunk was structurally malformed
    #[error("invalid chunk {0:#06x}")]
    InvalidChunk(u16),

    // missing-section errors
    /// expected a mode-0 section that is not present
    #[error("no MODE0 section")]
    NoMode0,
    /// expected a mode-1 section that is not present
    #[error("no MODE1 section")]
    NoMode1,
    /// expected a mode-2 section that is not present
    #[error("no MODE2 section")]
    NoMode2,
    /// expected a mode-3 section that is not present
    #[error("no MODE3 section")]
    NoMode3,

    /// a bounded read ran past the end of the buffer
    #[error("out of data: {remaining} bytes remaining, expected {expected}")]
    OutOfData { remaining: usize, expected: usize },

    // codec errors
    /// DEFLATE stream was malformed or overran the output bound
    #[error("inflate failed")]
    InflateFailed,
    /// ciphertext too short or its length prefix inconsistent
    #[error("decrypt failed")]
    DecryptFailed,

    // dispatch errors
    /// no decoder is registered for mode 0 in this context
    #[error("no MODE0 decoder")]
    NoMode0Decoder,
    /// no decoder is registered for mode 1 in this context
    #[error("no MODE1 decoder")]
    NoMode1Decoder,
    /// no decoder is registered for mode 2 in this context
    #[error("no MODE2 decoder")]
    NoMode2Decoder,
    /// no decoder is registered for mode 3 in this context
    #[error("no MODE3 decoder")]
    NoMode3Decoder,

    /// the caller's cancellation flag was observed at a chunk boundary
    #[error("cancelled")]
    Cancelled,

    /// any other error if a function has nothing more structured to report
    #[error("{0}")]
    Str(String),
}

impl DecodeError {
    /// Out-of-data constructor used by the stream and walker bounds checks.
    pub fn out_of_data(remaining: usize, expected: usize) -> Self {
        DecodeError::OutOfData {
            remaining,
            expected,
        }
    }
}
