// Copyright (c) 2023 The MobileCoin Foundation

//! Errors that can occur while decoding certificates, evaluating trust, and
//! persisting trust decisions

use crate::persistence::Capability;
use crate::CertificateType;

/// Error decoding certificate data
#[derive(displaydoc::Display, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Malformed certificate DER: {0}
    Der(der::Error),
    /// The certificate decoder rejected the data: {0}
    Backend(String),
    /// Certificate type mismatch, expecting {expected} got {actual}
    #[allow(missing_docs)]
    TypeMismatch {
        expected: CertificateType,
        actual: CertificateType,
    },
}

impl From<der::Error> for DecodeError {
    fn from(e: der::Error) -> Self {
        DecodeError::Der(e)
    }
}

/// Error extracting the public key from a certificate
#[derive(displaydoc::Display, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The certificate could not be decoded: {0}
    Decode(DecodeError),
    /// The subject public key is missing or has unused bits
    KeyMissing,
    /// The subject public key could not be parsed
    KeyDecoding,
}

impl From<DecodeError> for ExtractionError {
    fn from(e: DecodeError) -> Self {
        ExtractionError::Decode(e)
    }
}

/// Error reading or writing durable preferences
#[derive(displaydoc::Display, Debug)]
pub enum PersistenceError {
    /// The persistence backend failed: {0}
    Backend(String),
    /// Error encoding or decoding a stored record: {0}
    Serde(serde_json::Error),
    /// A stored certificate could not be decoded: {0}
    Decode(DecodeError),
    /// The platform does not support {0}
    Unsupported(Capability),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Serde(e)
    }
}

impl From<DecodeError> for PersistenceError {
    fn from(e: DecodeError) -> Self {
        PersistenceError::Decode(e)
    }
}

/// Error from the trust anchor service while building or validating a chain
#[derive(displaydoc::Display, Debug, Clone, PartialEq, Eq)]
pub enum AnchorError {
    /// Evaluation was cancelled
    Cancelled,
    /// A certificate in the chain could not be decoded: {0}
    Decode(DecodeError),
    /// Unsupported signature or key algorithm: {0}
    UnsupportedAlgorithm(String),
    /// The trust anchor service failed: {0}
    Service(String),
}

impl From<der::Error> for AnchorError {
    fn from(e: der::Error) -> Self {
        AnchorError::Decode(e.into())
    }
}

impl From<Cancelled> for AnchorError {
    fn from(_: Cancelled) -> Self {
        AnchorError::Cancelled
    }
}

/// The evaluation was cancelled before a verdict was reached
#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;
