// Copyright (c) 2023 The MobileCoin Foundation

//! Durable user decisions: which certificate is preferred for a name, and
//! explicit per policy trust overrides

use crate::x509::{CertificateBackend, X509Backend};
use crate::{
    Capability, Certificate, CertificateIdentity, Persistence, PersistenceError, Policy,
    PolicyName, PolicyRegistry,
};
use core::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const PREFERRED_CERTIFICATE_PREFIX: &str = "preferred-certificate";
const TRUST_OVERRIDE_PREFIX: &str = "trust-override";

/// A user's explicit trust decision for a certificate under a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustSetting {
    /// No decision, evaluation falls through to the trust anchors
    Unspecified,
    /// Always trust
    Proceed,
    /// Trust after asking the user
    Confirm,
    /// Never trust
    Deny,
}

impl Display for TrustSetting {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            TrustSetting::Unspecified => "unspecified",
            TrustSetting::Proceed => "always trust",
            TrustSetting::Confirm => "confirm",
            TrustSetting::Deny => "never trust",
        };
        f.write_str(name)
    }
}

/// A stored [`TrustSetting`], unique per certificate identity and policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserTrustOverride {
    identity: CertificateIdentity,
    policy: PolicyName,
    setting: TrustSetting,
}

impl UserTrustOverride {
    /// The certificate this override applies to
    pub fn identity(&self) -> CertificateIdentity {
        self.identity
    }

    /// The policy this override applies to
    pub fn policy(&self) -> PolicyName {
        self.policy
    }

    /// The user's decision
    pub fn setting(&self) -> TrustSetting {
        self.setting
    }
}

/// The certificate a user prefers for a name, like an email address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferredCertificateMapping {
    name: String,
    certificate: Certificate,
}

impl PreferredCertificateMapping {
    /// The name the certificate is preferred for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The preferred certificate
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

#[derive(Serialize, Deserialize)]
struct StoredMapping {
    name: String,
    #[serde(with = "hex::serde")]
    certificate: Vec<u8>,
}

/// Reads and writes user preferences through a [`Persistence`] backend.
///
/// Every write replaces exactly one key, so a failed write leaves the
/// previous value in place.
#[derive(Debug)]
pub struct PreferenceStore<P> {
    persistence: P,
    backend: Arc<dyn CertificateBackend>,
}

impl<P: Persistence> PreferenceStore<P> {
    /// Create a new instance, decoding stored certificates as X509
    pub fn new(persistence: P) -> Self {
        Self::with_backend(persistence, Arc::new(X509Backend))
    }

    /// Create a new instance, decoding stored certificates with `backend`
    pub fn with_backend(persistence: P, backend: Arc<dyn CertificateBackend>) -> Self {
        Self {
            persistence,
            backend,
        }
    }

    /// The underlying persistence
    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Whether the platform supports `capability`
    pub fn supports(&self, capability: Capability) -> bool {
        self.persistence.supports(capability)
    }

    fn require(&self, capability: Capability) -> Result<(), PersistenceError> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(PersistenceError::Unsupported(capability))
        }
    }

    /// The certificate currently preferred for `name`.
    pub fn preferred_certificate(
        &self,
        name: &str,
    ) -> Result<Option<Certificate>, PersistenceError> {
        Ok(self
            .preferred_certificate_mapping(name)?
            .map(|mapping| mapping.certificate))
    }

    /// The full mapping currently stored for `name`.
    pub fn preferred_certificate_mapping(
        &self,
        name: &str,
    ) -> Result<Option<PreferredCertificateMapping>, PersistenceError> {
        self.require(Capability::PreferredCertificates)?;
        let Some(bytes) = self.persistence.get(&preferred_certificate_key(name))? else {
            return Ok(None);
        };
        let stored: StoredMapping = serde_json::from_slice(&bytes)?;
        if stored.name != name {
            return Err(PersistenceError::Backend(format!(
                "preference for {name:?} holds a mapping for {:?}",
                stored.name
            )));
        }
        let certificate =
            Certificate::from_raw_data_with_backend(stored.certificate, self.backend.clone())?;
        Ok(Some(PreferredCertificateMapping {
            name: stored.name,
            certificate,
        }))
    }

    /// Make `certificate` the preferred certificate for `name`, replacing any
    /// previous preference.
    pub fn set_preferred_certificate(
        &self,
        name: &str,
        certificate: &Certificate,
    ) -> Result<(), PersistenceError> {
        self.require(Capability::PreferredCertificates)?;
        let stored = StoredMapping {
            name: name.to_string(),
            certificate: certificate.raw_data().to_vec(),
        };
        let bytes = serde_json::to_vec(&stored)?;
        self.persistence
            .set(&preferred_certificate_key(name), &bytes)?;
        info!(name, identity = %certificate.identity(), "set preferred certificate");
        Ok(())
    }

    /// Forget the preferred certificate for `name`.
    pub fn remove_preferred_certificate(&self, name: &str) -> Result<(), PersistenceError> {
        self.require(Capability::PreferredCertificates)?;
        self.persistence.remove(&preferred_certificate_key(name))?;
        info!(name, "removed preferred certificate");
        Ok(())
    }

    /// The user's override for a certificate under `policy`.
    pub fn user_trust_override(
        &self,
        identity: CertificateIdentity,
        policy: &Policy,
    ) -> Result<Option<UserTrustOverride>, PersistenceError> {
        self.require(Capability::TrustSettings)?;
        let Some(bytes) = self
            .persistence
            .get(&trust_override_key(identity, policy.name()))?
        else {
            return Ok(None);
        };
        let record: UserTrustOverride = serde_json::from_slice(&bytes)?;
        if record.identity != identity || record.policy != policy.name() {
            return Err(PersistenceError::Backend(format!(
                "trust override for {identity} under {} holds a record for {} under {}",
                policy.name(),
                record.identity,
                record.policy
            )));
        }
        Ok(Some(record))
    }

    /// Record the user's decision for a certificate under `policy`,
    /// replacing any previous decision.
    pub fn set_user_trust_override(
        &self,
        identity: CertificateIdentity,
        policy: &Policy,
        setting: TrustSetting,
    ) -> Result<(), PersistenceError> {
        self.require(Capability::TrustSettings)?;
        let record = UserTrustOverride {
            identity,
            policy: policy.name(),
            setting,
        };
        let bytes = serde_json::to_vec(&record)?;
        self.persistence
            .set(&trust_override_key(identity, policy.name()), &bytes)?;
        info!(%identity, policy = %policy.name(), %setting, "set user trust override");
        Ok(())
    }

    /// Forget the user's decision for a certificate under `policy`.
    pub fn remove_user_trust_override(
        &self,
        identity: CertificateIdentity,
        policy: &Policy,
    ) -> Result<(), PersistenceError> {
        self.require(Capability::TrustSettings)?;
        self.persistence
            .remove(&trust_override_key(identity, policy.name()))?;
        info!(%identity, policy = %policy.name(), "removed user trust override");
        Ok(())
    }

    /// Every override stored for a certificate, across all policies.
    pub fn trust_settings(
        &self,
        identity: CertificateIdentity,
    ) -> Result<Vec<UserTrustOverride>, PersistenceError> {
        let mut settings = Vec::new();
        for name in PolicyName::ALL {
            let policy = PolicyRegistry::policy_for(name);
            if let Some(record) = self.user_trust_override(identity, policy)? {
                settings.push(record);
            }
        }
        Ok(settings)
    }
}

fn preferred_certificate_key(name: &str) -> String {
    format!("{PREFERRED_CERTIFICATE_PREFIX}/{name}")
}

fn trust_override_key(identity: CertificateIdentity, policy: PolicyName) -> String {
    let policy = match policy {
        PolicyName::X509 => "x509",
        PolicyName::Ssl => "ssl",
        PolicyName::Smime => "smime",
    };
    format!("{TRUST_OVERRIDE_PREFIX}/{identity}/{policy}")
}
