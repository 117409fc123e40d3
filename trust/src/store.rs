// Copyright (c) 2023 The MobileCoin Foundation

//! Handles to certificates held by the secure store

use crate::{Certificate, CertificateIdentity, PersistenceError};
use core::fmt::Debug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// An opaque reference to a certificate in the secure store, along with the
/// certificate bytes the store holds for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreHandle {
    reference: Vec<u8>,
    der_bytes: Arc<[u8]>,
}

impl StoreHandle {
    /// Create a new instance
    ///
    /// # Arguments
    /// * `reference` - The store's persistent reference to the item
    /// * `der_bytes` - The certificate bytes held by the store
    pub fn new(reference: Vec<u8>, der_bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            reference,
            der_bytes: der_bytes.into(),
        }
    }

    /// The store's persistent reference to the item
    pub fn reference(&self) -> &[u8] {
        &self.reference
    }

    pub(crate) fn der_bytes(&self) -> &Arc<[u8]> {
        &self.der_bytes
    }
}

/// The secure certificate store.
///
/// Decoding the stored bytes is the job of a
/// [`CertificateBackend`](crate::CertificateBackend).
pub trait CertificateStore: Debug {
    /// Find the certificate for a persistent reference.
    fn lookup_by_handle(&self, reference: &[u8]) -> Result<Option<StoreHandle>, PersistenceError>;

    /// Add a certificate to the store, returning its handle.
    ///
    /// Importing a certificate that is already present returns the existing
    /// handle.
    fn import_raw_certificate(
        &self,
        certificate: &Certificate,
    ) -> Result<StoreHandle, PersistenceError>;
}

/// A process local [`CertificateStore`].
///
/// Persistent references are the certificate identity.
#[derive(Debug, Default)]
pub struct MemoryCertificateStore {
    certificates: RwLock<HashMap<Vec<u8>, Arc<[u8]>>>,
}

impl MemoryCertificateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CertificateStore for MemoryCertificateStore {
    fn lookup_by_handle(&self, reference: &[u8]) -> Result<Option<StoreHandle>, PersistenceError> {
        let certificates = self
            .certificates
            .read()
            .map_err(|_| PersistenceError::Backend("certificate store lock poisoned".into()))?;
        Ok(certificates
            .get(reference)
            .map(|der_bytes| StoreHandle::new(reference.to_vec(), der_bytes.clone())))
    }

    fn import_raw_certificate(
        &self,
        certificate: &Certificate,
    ) -> Result<StoreHandle, PersistenceError> {
        let reference = CertificateIdentity::of(certificate.raw_data())
            .as_bytes()
            .to_vec();
        let mut certificates = self
            .certificates
            .write()
            .map_err(|_| PersistenceError::Backend("certificate store lock poisoned".into()))?;
        let der_bytes = certificates
            .entry(reference.clone())
            .or_insert_with(|| {
                debug!(identity = %certificate.identity(), "importing certificate");
                certificate.raw_data().into()
            })
            .clone();
        Ok(StoreHandle::new(reference, der_bytes))
    }
}
