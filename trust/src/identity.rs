// Copyright (c) 2023 The MobileCoin Foundation

//! The stable identity of a certificate, derived from its raw bytes

use core::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The SHA-256 digest of a certificate's DER bytes.
///
/// Two certificates with identical bytes always have the same identity, so
/// this is what user trust overrides are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CertificateIdentity(#[serde(with = "hex::serde")] [u8; 32]);

impl CertificateIdentity {
    /// Compute the identity of the provided DER bytes
    pub fn of(der_bytes: &[u8]) -> Self {
        Self(Sha256::digest(der_bytes).into())
    }

    /// The raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for CertificateIdentity {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for CertificateIdentity {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for CertificateIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
