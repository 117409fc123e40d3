// Copyright (c) 2023 The MobileCoin Foundation

#![doc = include_str!("../README.md")]
#![deny(missing_docs, missing_debug_implementations, unsafe_code)]

mod anchors;
mod cancel;
mod certificate;
mod error;
mod evaluator;
mod identity;
mod persistence;
mod policy;
mod preferences;
mod store;
pub mod x509;

pub use anchors::{AnchorConfig, AnchorOutcome, AnchorSet, RawOutcome, TrustAnchorService};
pub use cancel::CancellationToken;
pub use certificate::{Certificate, CertificateEncoding, CertificateType, KeychainItem};
pub use error::{AnchorError, Cancelled, DecodeError, ExtractionError, PersistenceError};
pub use evaluator::{EvaluationOptions, TrustEvaluator, TrustResult, ValidationTime, Verdict};
pub use identity::CertificateIdentity;
pub use persistence::{Capability, MemoryPersistence, Persistence};
pub use policy::{policy_for, KeyUsage, Policy, PolicyConstraints, PolicyName, PolicyRegistry};
pub use preferences::{
    PreferenceStore, PreferredCertificateMapping, TrustSetting, UserTrustOverride,
};
pub use store::{CertificateStore, MemoryCertificateStore, StoreHandle};
pub use x509::{CertificateBackend, DecodedFields, PublicKey, PublicKeyInfo, X509Backend};
