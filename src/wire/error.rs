//! Decode failures for the wire codecs.
//!
//! A buffer that fails an invariant check is rejected whole: partial
//! decoding (returning the good prefix) is forbidden by the wire contract.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer ended before a complete record could be read.
    #[error("truncated buffer: {context}")]
    Truncated { context: String },

    /// Buffer length does not satisfy the record-size invariant for this kind.
    #[error("misaligned buffer: {context}")]
    Misaligned { context: String },
}

impl DecodeError {
    pub fn truncated(context: impl Into<String>) -> Self {
        Self::Truncated {
            context: context.into(),
        }
    }

    pub fn misaligned(context: impl Into<String>) -> Self {
        Self::Misaligned {
            context: context.into(),
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;
