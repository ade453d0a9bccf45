//! Error taxonomy for the KEL/TEL/ACDC core.
//!
//! Every variant here corresponds to a named error class from the system's
//! design: codec failures, SAID mismatches, signature/threshold failures,
//! chain violations, and storage/indexer integrity problems.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid derivation code: {0}")]
    InvalidCode(String),

    #[error("insufficient material: need {0} more characters")]
    InsufficientMaterial(usize),

    #[error("non-zero midpad bytes: 0x{0}")]
    NonZeroMidpad(String),

    #[error("misaligned code: {0}")]
    MisalignedCode(String),

    #[error("invalid raw size for code {code}: expected {expected}, got {actual}")]
    InvalidRawSize {
        code: String,
        expected: usize,
        actual: usize,
    },

    #[error("SAID mismatch: expected {expected}, computed {computed}")]
    SaidMismatch { expected: String, computed: String },

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("integrity error at {said}: {reason}")]
    Integrity { said: String, reason: String },

    #[error("chain violation: {0}")]
    ChainViolation(String),

    #[error("threshold not met: {verified} of {required} required signatures verified")]
    ThresholdNotMet { verified: usize, required: usize },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedEvent(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Error::Codec(format!("UTF-8 error: {err}"))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Codec(format!("base64 decode error: {err}"))
    }
}
