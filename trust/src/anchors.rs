// Copyright (c) 2023 The MobileCoin Foundation

//! The trust anchor service, which builds a certificate chain from a leaf to
//! a trusted root and validates it against a policy's constraints

use crate::x509::{extensions, name, PublicKey, PublicKeyInfo};
use crate::{
    AnchorError, CancellationToken, Certificate, DecodeError, KeyUsage, PolicyConstraints,
};
use const_oid::ObjectIdentifier;
use core::fmt::Debug;
use core::time::Duration;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::Signature;
use serde::Deserialize;
use tracing::{debug, trace};
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate as X509Certificate;

/// ecdsa-with-SHA256
const ECDSA_WITH_SHA_256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

const DEFAULT_MAX_CHAIN_DEPTH: usize = 8;

/// The raw result code of a chain validation.
///
/// The values follow the platform trust result codes, so services backed by
/// the system trust store can pass their result through unchanged. Codes
/// outside the known set are possible and must be treated as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawOutcome(pub u32);

#[allow(missing_docs)]
impl RawOutcome {
    pub const INVALID: Self = Self(0);
    pub const PROCEED: Self = Self(1);
    pub const CONFIRM: Self = Self(2);
    pub const DENY: Self = Self(3);
    pub const UNSPECIFIED: Self = Self(4);
    pub const RECOVERABLE_TRUST_FAILURE: Self = Self(5);
    pub const FATAL_TRUST_FAILURE: Self = Self(6);
    pub const OTHER_ERROR: Self = Self(7);
}

/// What the trust anchor service concluded about a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorOutcome {
    /// The result code
    pub outcome: RawOutcome,
    /// The certificates used, starting with the leaf
    pub chain: Vec<Certificate>,
    /// Why the chain is not trusted, empty on success
    pub reasons: Vec<String>,
}

/// The system trust anchor service.
pub trait TrustAnchorService: Debug {
    /// Build a chain from `leaf` to a trust anchor and validate it.
    ///
    /// # Arguments
    /// * `leaf` - The certificate being evaluated.
    /// * `intermediates` - Candidate issuing certificates, in any order.
    /// * `constraints` - What the policy requires of the chain.
    /// * `cancellation` - Checked between steps, a cancelled evaluation
    ///   returns [`AnchorError::Cancelled`].
    fn build_and_validate_chain(
        &self,
        leaf: &Certificate,
        intermediates: &[Certificate],
        constraints: &PolicyConstraints<'_>,
        cancellation: &CancellationToken,
    ) -> Result<AnchorOutcome, AnchorError>;
}

/// Configuration for an [`AnchorSet`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnchorConfig {
    /// PEM encoded trust anchors
    pub anchors: Vec<String>,
    /// The most certificates, not counting the anchor, a chain may have
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,
}

fn default_max_chain_depth() -> usize {
    DEFAULT_MAX_CHAIN_DEPTH
}

impl AnchorConfig {
    /// Load the configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone)]
struct Parsed {
    certificate: Certificate,
    x509: X509Certificate,
}

impl Parsed {
    fn new(certificate: &Certificate) -> Result<Self, DecodeError> {
        Ok(Self {
            certificate: certificate.clone(),
            x509: X509Certificate::from_der(certificate.raw_data())?,
        })
    }

    fn label(&self) -> String {
        match name::common_name(&self.x509.tbs_certificate.subject) {
            Ok(Some(common_name)) => format!("\"{common_name}\""),
            _ => format!("certificate {}", self.certificate.identity()),
        }
    }

    fn is_issued_by(&self, issuer: &Parsed) -> bool {
        self.x509.tbs_certificate.issuer == issuer.x509.tbs_certificate.subject
    }

    fn is_self_issued(&self) -> bool {
        self.is_issued_by(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Severity {
    Recoverable,
    Fatal,
}

#[derive(Debug, Default)]
struct Findings(Vec<(Severity, String)>);

impl Findings {
    fn recoverable(&mut self, reason: String) {
        self.0.push((Severity::Recoverable, reason));
    }

    fn fatal(&mut self, reason: String) {
        self.0.push((Severity::Fatal, reason));
    }

    fn outcome(&self) -> RawOutcome {
        match self.0.iter().map(|(severity, _)| *severity).max() {
            None => RawOutcome::PROCEED,
            Some(Severity::Recoverable) => RawOutcome::RECOVERABLE_TRUST_FAILURE,
            Some(Severity::Fatal) => RawOutcome::FATAL_TRUST_FAILURE,
        }
    }

    fn reasons(self) -> Vec<String> {
        self.0.into_iter().map(|(_, reason)| reason).collect()
    }
}

/// A [`TrustAnchorService`] over a fixed set of trusted root certificates.
///
/// Only ECDSA P-256 with SHA-256 signatures can be verified. Chains that need
/// any other algorithm are reported as [`AnchorError::UnsupportedAlgorithm`].
#[derive(Debug, Clone)]
pub struct AnchorSet {
    anchors: Vec<Parsed>,
    max_chain_depth: usize,
}

impl AnchorSet {
    /// Create a new instance trusting `anchors`
    pub fn new(anchors: &[Certificate]) -> Result<Self, DecodeError> {
        let anchors = anchors
            .iter()
            .map(Parsed::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            anchors,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        })
    }

    /// Limit the number of certificates, not counting the anchor, a chain may
    /// have.
    pub fn with_max_chain_depth(mut self, max_chain_depth: usize) -> Self {
        self.max_chain_depth = max_chain_depth;
        self
    }

    /// The trusted certificates
    pub fn anchors(&self) -> impl Iterator<Item = &Certificate> {
        self.anchors.iter().map(|anchor| &anchor.certificate)
    }

    fn anchor_for(&self, certificate: &Parsed) -> Option<&Parsed> {
        self.anchors
            .iter()
            .find(|anchor| anchor.certificate == certificate.certificate)
    }

    fn issuing_anchors(&self, certificate: &Parsed) -> Vec<&Parsed> {
        self.anchors
            .iter()
            .filter(|anchor| certificate.is_issued_by(anchor))
            .collect()
    }
}

impl TryFrom<&AnchorConfig> for AnchorSet {
    type Error = DecodeError;

    fn try_from(config: &AnchorConfig) -> Result<Self, Self::Error> {
        let anchors = config
            .anchors
            .iter()
            .map(|pem| Certificate::from_pem(pem))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(&anchors)?.with_max_chain_depth(config.max_chain_depth))
    }
}

impl TrustAnchorService for AnchorSet {
    fn build_and_validate_chain(
        &self,
        leaf: &Certificate,
        intermediates: &[Certificate],
        constraints: &PolicyConstraints<'_>,
        cancellation: &CancellationToken,
    ) -> Result<AnchorOutcome, AnchorError> {
        cancellation.check()?;
        let leaf = Parsed::new(leaf).map_err(AnchorError::Decode)?;
        let candidates = intermediates
            .iter()
            .filter(|candidate| **candidate != leaf.certificate)
            .map(Parsed::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AnchorError::Decode)?;

        let mut findings = Findings::default();
        check_leaf(&leaf, constraints, &mut findings)?;
        check_validity(&leaf, constraints.time, &mut findings);

        let mut chain = vec![leaf.certificate.clone()];
        let mut used = vec![false; candidates.len()];
        let mut current = leaf.clone();
        let mut anchored = self.anchor_for(&leaf).is_some();

        while !anchored {
            cancellation.check()?;
            if chain.len() > self.max_chain_depth {
                findings.recoverable(format!(
                    "chain is longer than {} certificates",
                    self.max_chain_depth
                ));
                break;
            }

            // Re-keyed roots and renewed intermediates keep their names, so
            // every certificate with the issuer's name is a candidate.
            let issuing_anchors = self.issuing_anchors(&current);
            if let Some(index) = first_verifying(&current, &issuing_anchors)? {
                let anchor = issuing_anchors[index];
                check_validity(anchor, constraints.time, &mut findings);
                chain.push(anchor.certificate.clone());
                anchored = true;
                break;
            }

            if current.is_self_issued() {
                findings.recoverable(format!("root {} is not trusted", current.label()));
                break;
            }

            let (indices, issuers): (Vec<_>, Vec<_>) = candidates
                .iter()
                .enumerate()
                .filter(|(index, candidate)| !used[*index] && current.is_issued_by(candidate))
                .unzip();
            let Some(found) = first_verifying(&current, &issuers)? else {
                if let Some(anchor) = issuing_anchors.first() {
                    findings.fatal(format!(
                        "signature of {} does not verify with trust anchor {}",
                        current.label(),
                        anchor.label()
                    ));
                } else if let Some(issuer) = issuers.first() {
                    findings.fatal(format!(
                        "signature of {} does not verify with issuer {}",
                        current.label(),
                        issuer.label()
                    ));
                } else {
                    let reason = format!("issuer of {} was not found", current.label());
                    findings.recoverable(reason);
                }
                break;
            };
            used[indices[found]] = true;
            let issuer = issuers[found];

            check_issuer(issuer, &mut findings)?;
            check_validity(issuer, constraints.time, &mut findings);
            trace!(issuer = %issuer.label(), "found issuer");
            chain.push(issuer.certificate.clone());
            current = issuer.clone();
        }

        let outcome = findings.outcome();
        debug!(
            policy = %constraints.policy,
            length = chain.len(),
            anchored,
            outcome = outcome.0,
            "validated chain"
        );
        Ok(AnchorOutcome {
            outcome,
            chain,
            reasons: findings.reasons(),
        })
    }
}

fn check_leaf(
    leaf: &Parsed,
    constraints: &PolicyConstraints<'_>,
    findings: &mut Findings,
) -> Result<(), AnchorError> {
    let tbs = &leaf.x509.tbs_certificate;
    let key_usage = extensions::key_usage(tbs)?;
    if !constraints.permits_key_usage(key_usage.as_deref()) {
        findings.recoverable(format!(
            "key usage of {} does not permit {}",
            leaf.label(),
            constraints.policy
        ));
    }

    let extended_key_usage = extensions::extended_key_usage(tbs)?;
    if !constraints.permits_extended_key_usage(extended_key_usage.as_deref()) {
        findings.recoverable(format!(
            "extended key usage of {} does not permit {}",
            leaf.label(),
            constraints.policy
        ));
    }

    if let Some(hostname) = constraints.hostname {
        let mut names = extensions::dns_names(tbs)?;
        if names.is_empty() {
            names.extend(name::common_name(&tbs.subject)?.map(str::to_string));
        }
        if !names.iter().any(|name| hostname_matches(name, hostname)) {
            findings.recoverable(format!(
                "{} does not match hostname {hostname}",
                leaf.label()
            ));
        }
    }
    Ok(())
}

fn check_issuer(issuer: &Parsed, findings: &mut Findings) -> Result<(), AnchorError> {
    let tbs = &issuer.x509.tbs_certificate;
    let can_sign = extensions::key_usage(tbs)?
        .map_or(true, |usage| usage.contains(&KeyUsage::KeyCertSign));
    if !extensions::is_ca(tbs)? || !can_sign {
        findings.fatal(format!(
            "{} is not a certificate authority",
            issuer.label()
        ));
    }
    Ok(())
}

fn check_validity(certificate: &Parsed, time: Option<Duration>, findings: &mut Findings) {
    let Some(time) = time else {
        return;
    };
    let validity = &certificate.x509.tbs_certificate.validity;
    if time < validity.not_before.to_unix_duration() {
        findings.recoverable(format!("{} is not yet valid", certificate.label()));
    } else if time > validity.not_after.to_unix_duration() {
        findings.recoverable(format!("{} has expired", certificate.label()));
    }
}

/// The position of the first of `issuers` whose key verifies the signature of
/// `subject`, `None` when none do.
///
/// An issuer whose key cannot be used only produces an error when no other
/// issuer verifies.
fn first_verifying(
    subject: &Parsed,
    issuers: &[&Parsed],
) -> Result<Option<usize>, AnchorError> {
    let mut error = None;
    for (index, issuer) in issuers.iter().enumerate() {
        match verify_signature(subject, issuer) {
            Ok(true) => return Ok(Some(index)),
            Ok(false) => {}
            Err(e) => {
                error.get_or_insert(e);
            }
        }
    }
    error.map_or(Ok(None), Err)
}

fn verify_signature(subject: &Parsed, issuer: &Parsed) -> Result<bool, AnchorError> {
    let algorithm = subject.x509.signature_algorithm.oid;
    if algorithm != ECDSA_WITH_SHA_256 {
        return Err(AnchorError::UnsupportedAlgorithm(format!(
            "signature algorithm {algorithm}"
        )));
    }

    let key_info = PublicKeyInfo::from(&issuer.x509.tbs_certificate.subject_public_key_info);
    let key = match PublicKey::try_from(&key_info) {
        Ok(PublicKey::P256(key)) => key,
        Ok(PublicKey::Opaque(info)) => {
            return Err(AnchorError::UnsupportedAlgorithm(format!(
                "issuer key algorithm {}",
                info.algorithm
            )))
        }
        Err(_) => return Ok(false),
    };

    let Some(signature) = subject
        .x509
        .signature
        .as_bytes()
        .and_then(|bytes| Signature::from_der(bytes).ok())
    else {
        return Ok(false);
    };
    let tbs = subject.x509.tbs_certificate.to_der()?;
    Ok(key.verify(&tbs, &signature).is_ok())
}

/// Whether `pattern`, a DNS name from a certificate, matches `hostname`.
///
/// A leading `*.` matches exactly one non empty label.
fn hostname_matches(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => match hostname.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        },
        None => pattern == hostname,
    }
}
