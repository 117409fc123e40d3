// Copyright (c) 2023 The MobileCoin Foundation

//! An immutable X509 certificate with lazily decoded identity fields

use crate::x509::{CertificateBackend, DecodedFields, PublicKey, X509Backend};
use crate::{CertificateIdentity, DecodeError, ExtractionError, StoreHandle};
use core::fmt::{Debug, Display, Formatter};
use core::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use subtle::ConstantTimeEq;
use tracing::{trace, warn};
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate as X509Certificate;

/// The structural type of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateType {
    /// X.509 version 1
    X509V1,
    /// X.509 version 2
    X509V2,
    /// X.509 version 3
    X509V3,
}

impl Display for CertificateType {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            CertificateType::X509V1 => "X.509v1",
            CertificateType::X509V2 => "X.509v2",
            CertificateType::X509V3 => "X.509v3",
        };
        f.write_str(name)
    }
}

/// The encoding of imported certificate data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateEncoding {
    /// Binary DER
    Der,
    /// PEM armored DER with the `CERTIFICATE` label
    Pem,
}

/// An item that may be backed by the secure store.
///
/// Retrieval by handle is a capability an item has, not something it
/// inherits, so each stored entity type implements this on its own.
pub trait KeychainItem {
    /// The store handle this item was created from, if any.
    fn store_handle(&self) -> Option<&StoreHandle>;

    /// Whether this item came from the secure store.
    fn is_stored(&self) -> bool {
        self.store_handle().is_some()
    }
}

/// An X509 certificate.
///
/// The identity of a certificate is its DER bytes, two instances with the same
/// bytes compare equal no matter how they were created. Decoded fields are
/// computed at most once and shared between clones, so a certificate can be
/// read from many threads at once.
#[derive(Clone)]
pub struct Certificate {
    inner: Arc<Inner>,
}

struct Inner {
    der_bytes: Arc<[u8]>,
    handle: Option<StoreHandle>,
    backend: Arc<dyn CertificateBackend>,
    fields: OnceLock<Result<DecodedFields, DecodeError>>,
    public_key: OnceLock<Result<PublicKey, ExtractionError>>,
}

impl Certificate {
    /// Wrap a certificate that already lives in the secure store.
    ///
    /// This never fails. The store bytes are decoded on first field access,
    /// so field accessors may still return a [`DecodeError`].
    pub fn from_store_handle(handle: StoreHandle) -> Self {
        Self::from_store_handle_with_backend(handle, Arc::new(X509Backend))
    }

    /// Wrap a stored certificate, decoding it with `backend`.
    pub fn from_store_handle_with_backend(
        handle: StoreHandle,
        backend: Arc<dyn CertificateBackend>,
    ) -> Self {
        let der_bytes = handle.der_bytes().clone();
        Self::new(der_bytes, Some(handle), backend, OnceLock::new())
    }

    /// Create a certificate from DER bytes without adding it to any store.
    ///
    /// The bytes are fully decoded up front, malformed data never produces a
    /// [`Certificate`].
    pub fn from_raw_data(der_bytes: impl Into<Arc<[u8]>>) -> Result<Self, DecodeError> {
        Self::from_raw_data_with_backend(der_bytes, Arc::new(X509Backend))
    }

    /// Create a certificate from DER bytes, decoding it with `backend`.
    pub fn from_raw_data_with_backend(
        der_bytes: impl Into<Arc<[u8]>>,
        backend: Arc<dyn CertificateBackend>,
    ) -> Result<Self, DecodeError> {
        let der_bytes = der_bytes.into();
        let decoded = backend.decode(&der_bytes)?;
        let fields = OnceLock::new();
        let _ = fields.set(Ok(decoded));
        Ok(Self::new(der_bytes, None, backend, fields))
    }

    /// Create a certificate from data of an explicit type and encoding.
    ///
    /// PEM data is converted to DER. The decoded certificate must be of
    /// `certificate_type`.
    pub fn from_raw_data_with_type(
        data: &[u8],
        certificate_type: CertificateType,
        encoding: CertificateEncoding,
    ) -> Result<Self, DecodeError> {
        let certificate = match encoding {
            CertificateEncoding::Der => Self::from_raw_data(data)?,
            CertificateEncoding::Pem => Self::from_pem_bytes(data)?,
        };
        let actual = certificate.certificate_type()?;
        if actual != certificate_type {
            return Err(DecodeError::TypeMismatch {
                expected: certificate_type,
                actual,
            });
        }
        Ok(certificate)
    }

    /// Create a certificate from a PEM `CERTIFICATE` block.
    pub fn from_pem(pem: &str) -> Result<Self, DecodeError> {
        Self::from_pem_bytes(pem.trim().as_bytes())
    }

    fn from_pem_bytes(pem: &[u8]) -> Result<Self, DecodeError> {
        let der_bytes = X509Certificate::from_pem(pem)?.to_der()?;
        Self::from_raw_data(der_bytes)
    }

    fn new(
        der_bytes: Arc<[u8]>,
        handle: Option<StoreHandle>,
        backend: Arc<dyn CertificateBackend>,
        fields: OnceLock<Result<DecodedFields, DecodeError>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                der_bytes,
                handle,
                backend,
                fields,
                public_key: OnceLock::new(),
            }),
        }
    }

    /// The certificate's DER bytes, exactly as provided
    pub fn raw_data(&self) -> &[u8] {
        &self.inner.der_bytes
    }

    /// The SHA-256 identity of the certificate's bytes
    pub fn identity(&self) -> CertificateIdentity {
        CertificateIdentity::of(self.raw_data())
    }

    /// Whether both certificates have bit-for-bit identical data.
    pub fn equals(&self, other: &Certificate) -> bool {
        self.raw_data().ct_eq(other.raw_data()).into()
    }

    /// The backend used to decode this certificate
    pub fn backend(&self) -> &Arc<dyn CertificateBackend> {
        &self.inner.backend
    }

    fn decoded(&self) -> Result<&DecodedFields, DecodeError> {
        self.inner
            .fields
            .get_or_init(|| {
                trace!(identity = %self.identity(), "decoding certificate");
                self.inner.backend.decode(self.raw_data())
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The subject public key.
    pub fn public_key(&self) -> Result<&PublicKey, ExtractionError> {
        self.inner
            .public_key
            .get_or_init(|| {
                let fields = self.decoded()?;
                self.inner.backend.extract_public_key(fields)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The most specific subject common name.
    ///
    /// `Ok(None)` when the subject has no common name attribute.
    pub fn common_name(&self) -> Result<Option<&str>, DecodeError> {
        Ok(self.decoded()?.common_name.as_deref())
    }

    /// The subject's email addresses, possibly empty.
    ///
    /// A stored certificate that cannot be decoded has no addresses.
    pub fn email_addresses(&self) -> &[String] {
        match self.decoded() {
            Ok(fields) => &fields.email_addresses,
            Err(error) => {
                warn!(
                    identity = %self.identity(),
                    %error,
                    "no email addresses for undecodable certificate"
                );
                &[]
            }
        }
    }

    /// The structural type of the certificate
    pub fn certificate_type(&self) -> Result<CertificateType, DecodeError> {
        Ok(self.decoded()?.certificate_type)
    }
}

impl KeychainItem for Certificate {
    fn store_handle(&self) -> Option<&StoreHandle> {
        self.inner.handle.as_ref()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Certificate {}

impl Hash for Certificate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw_data().hash(state);
    }
}

impl Debug for Certificate {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Certificate")
            .field("identity", &self.identity())
            .field("stored", &self.is_stored())
            .finish()
    }
}

impl TryFrom<&[u8]> for Certificate {
    type Error = DecodeError;

    fn try_from(der_bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_raw_data(der_bytes)
    }
}

impl TryFrom<&str> for Certificate {
    type Error = DecodeError;

    fn try_from(pem: &str) -> Result<Self, Self::Error> {
        Self::from_pem(pem)
    }
}
