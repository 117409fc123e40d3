// Copyright (c) 2023 The MobileCoin Foundation

//! Decoding of X509 certificates into the identity fields exposed by
//! [`Certificate`](crate::Certificate), and public key extraction.

pub(crate) mod extensions;
pub(crate) mod name;

use crate::{CertificateType, DecodeError, ExtractionError};
use const_oid::ObjectIdentifier;
use core::fmt::Debug;
use p256::ecdsa::VerifyingKey;
use x509_cert::certificate::Version;
use x509_cert::der::Decode;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::Certificate as X509Certificate;

/// id-ecPublicKey
pub(crate) const EC_PUBLIC_KEY: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
/// The NIST P-256 curve, secp256r1
pub(crate) const PRIME256V1: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// The identity fields of a decoded certificate.
///
/// These are computed once per [`Certificate`](crate::Certificate) and cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFields {
    /// The structural type of the certificate
    pub certificate_type: CertificateType,
    /// The most specific subject common name, if any
    pub common_name: Option<String>,
    /// The subject email addresses, from both the subject name and the
    /// subject alternative names
    pub email_addresses: Vec<String>,
    /// The subject public key
    pub public_key_info: PublicKeyInfo,
}

/// The subject public key as stored in the certificate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKeyInfo {
    /// The key algorithm
    pub algorithm: ObjectIdentifier,
    /// The algorithm parameters when they are an object identifier, like the
    /// named curve of an EC key
    pub parameters: Option<ObjectIdentifier>,
    /// The encoded key, empty if the bit string was not octet aligned
    pub subject_public_key: Vec<u8>,
}

impl From<&SubjectPublicKeyInfoOwned> for PublicKeyInfo {
    fn from(spki: &SubjectPublicKeyInfoOwned) -> Self {
        Self {
            algorithm: spki.algorithm.oid,
            parameters: spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|parameters| parameters.decode_as::<ObjectIdentifier>().ok()),
            subject_public_key: spki
                .subject_public_key
                .as_bytes()
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
        }
    }
}

/// A handle to a certificate's public key.
///
/// Cryptographic operations on the key belong to the key's own library, this
/// only identifies which key the certificate holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// A NIST P-256 ECDSA key
    P256(VerifyingKey),
    /// A key of an algorithm this crate does not interpret
    Opaque(PublicKeyInfo),
}

impl PublicKey {
    /// The key algorithm
    pub fn algorithm(&self) -> ObjectIdentifier {
        match self {
            PublicKey::P256(_) => EC_PUBLIC_KEY,
            PublicKey::Opaque(info) => info.algorithm,
        }
    }
}

impl TryFrom<&PublicKeyInfo> for PublicKey {
    type Error = ExtractionError;

    fn try_from(info: &PublicKeyInfo) -> Result<Self, Self::Error> {
        if info.subject_public_key.is_empty() {
            return Err(ExtractionError::KeyMissing);
        }
        if info.algorithm == EC_PUBLIC_KEY && info.parameters == Some(PRIME256V1) {
            let key = VerifyingKey::from_sec1_bytes(&info.subject_public_key)
                .map_err(|_| ExtractionError::KeyDecoding)?;
            Ok(PublicKey::P256(key))
        } else {
            Ok(PublicKey::Opaque(info.clone()))
        }
    }
}

/// Decodes certificate bytes and extracts public keys.
///
/// This is the seam to the secure store's decode primitive and the public key
/// service. [`X509Backend`] is the implementation used unless another is
/// provided.
pub trait CertificateBackend: Debug + Send + Sync {
    /// Decode the identity fields of `der_bytes`.
    ///
    /// Must fail for anything that is not a complete, well formed certificate.
    fn decode(&self, der_bytes: &[u8]) -> Result<DecodedFields, DecodeError>;

    /// Extract the public key from previously decoded fields.
    fn extract_public_key(&self, fields: &DecodedFields) -> Result<PublicKey, ExtractionError> {
        PublicKey::try_from(&fields.public_key_info)
    }
}

/// A [`CertificateBackend`] for DER encoded X509 certificates
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct X509Backend;

impl CertificateBackend for X509Backend {
    fn decode(&self, der_bytes: &[u8]) -> Result<DecodedFields, DecodeError> {
        let certificate = X509Certificate::from_der(der_bytes)?;
        let tbs = &certificate.tbs_certificate;

        let common_name = name::common_name(&tbs.subject)?.map(str::to_string);

        let mut email_addresses: Vec<String> =
            name::attribute_values(&tbs.subject, name::EMAIL_ADDRESS)?
                .into_iter()
                .map(str::to_string)
                .collect();
        for email in extensions::rfc822_names(tbs)? {
            if !email_addresses
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(&email))
            {
                email_addresses.push(email);
            }
        }

        Ok(DecodedFields {
            certificate_type: tbs.version.into(),
            common_name,
            email_addresses,
            public_key_info: PublicKeyInfo::from(&tbs.subject_public_key_info),
        })
    }
}

impl From<Version> for CertificateType {
    fn from(version: Version) -> Self {
        match version {
            Version::V1 => CertificateType::X509V1,
            Version::V2 => CertificateType::X509V2,
            Version::V3 => CertificateType::X509V3,
        }
    }
}
