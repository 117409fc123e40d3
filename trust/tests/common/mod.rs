// Copyright (c) 2023 The MobileCoin Foundation

// Each test crate uses a different subset of these helpers
#![allow(dead_code)]

use mc_certificate_trust::{
    AnchorSet, Capability, Certificate, MemoryPersistence, Persistence, PersistenceError,
};
use std::sync::Arc;
use std::time::Duration;

pub const SGX_ROOT_CA: &str = include_str!("../../data/tests/root_ca.pem");
pub const SGX_PROCESSOR_CA: &str = include_str!("../../data/tests/processor_ca.pem");
pub const SGX_LEAF: &str = include_str!("../../data/tests/leaf_cert.pem");
pub const EXAMPLE_ROOT_CA: &str = include_str!("../../data/tests/example_root_ca.pem");
pub const EXAMPLE_ISSUING_CA: &str = include_str!("../../data/tests/example_issuing_ca.pem");
pub const EXAMPLE_SERVER: &str = include_str!("../../data/tests/example_server.pem");
pub const EXAMPLE_MAIL: &str = include_str!("../../data/tests/example_mail.pem");
pub const EXAMPLE_REKEYED_ROOT_CA: &str =
    include_str!("../../data/tests/example_rekeyed_root_ca.pem");
pub const EXAMPLE_RENEWED_ISSUING_CA: &str =
    include_str!("../../data/tests/example_renewed_issuing_ca.pem");
pub const EXAMPLE_RSA_ROOT_CA: &str = include_str!("../../data/tests/example_rsa_root_ca.pem");
pub const EXAMPLE_RSA_ISSUED: &str = include_str!("../../data/tests/example_rsa_issued.pem");

/// 2026-01-01, inside the validity of every fixture chain
pub const NOW: Duration = Duration::from_secs(1_767_225_600);

pub fn certificate(pem: &str) -> Certificate {
    Certificate::from_pem(pem).expect("Failed decoding PEM")
}

/// Trust both the SGX root and the example root.
pub fn anchors() -> AnchorSet {
    AnchorSet::new(&[certificate(SGX_ROOT_CA), certificate(EXAMPLE_ROOT_CA)])
        .expect("Failed decoding anchors")
}

/// A [`Persistence`] shared between preference stores, standing in for
/// preferences written by an earlier session.
#[derive(Debug, Clone, Default)]
pub struct SharedPersistence(Arc<MemoryPersistence>);

impl SharedPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for SharedPersistence {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        self.0.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.0.remove(key)
    }

    fn supports(&self, capability: Capability) -> bool {
        self.0.supports(capability)
    }
}
