// Copyright (c) 2023 The MobileCoin Foundation

//! The well known trust evaluation policies and the usage constraints each one
//! places on a certificate

use const_oid::ObjectIdentifier;
use core::fmt::{Display, Formatter};
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// id-kp-serverAuth
const SERVER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");
/// id-kp-emailProtection
const EMAIL_PROTECTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.4");
/// anyExtendedKeyUsage
const ANY_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37.0");

/// The name of an evaluation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PolicyName {
    /// Basic X.509 path validation
    X509,
    /// TLS server authentication
    Ssl,
    /// Secure mail
    Smime,
}

impl PolicyName {
    /// Every policy name
    pub const ALL: [PolicyName; 3] = [PolicyName::X509, PolicyName::Ssl, PolicyName::Smime];
}

impl Display for PolicyName {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            PolicyName::X509 => "X.509",
            PolicyName::Ssl => "SSL",
            PolicyName::Smime => "S/MIME",
        };
        f.write_str(name)
    }
}

/// Key usage bits from section
/// [4.2.1.3](https://datatracker.ietf.org/doc/html/rfc5280#section-4.2.1.3) of
/// RFC5280
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    DigitalSignature,
    NonRepudiation,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    KeyCertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

/// A trust evaluation policy.
///
/// Policies are process wide constants, obtain them from [`PolicyRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Policy {
    name: PolicyName,
    required_key_usage: &'static [KeyUsage],
    extended_key_usage: Option<ObjectIdentifier>,
    requires_hostname_match: bool,
}

impl Policy {
    /// The name of the policy
    pub fn name(&self) -> PolicyName {
        self.name
    }

    /// Key usages of which the leaf must assert at least one, when it has a
    /// key usage extension
    pub fn required_key_usage(&self) -> &'static [KeyUsage] {
        self.required_key_usage
    }

    /// The purpose the leaf must assert, when it has an extended key usage
    /// extension
    pub fn extended_key_usage(&self) -> Option<ObjectIdentifier> {
        self.extended_key_usage
    }

    /// Whether the leaf must match the hostname being connected to
    pub fn requires_hostname_match(&self) -> bool {
        self.requires_hostname_match
    }

    /// The constraints handed to the trust anchor service.
    ///
    /// `hostname` is dropped for policies that do not match hostnames.
    pub fn constraints<'a>(
        &self,
        hostname: Option<&'a str>,
        time: Option<Duration>,
    ) -> PolicyConstraints<'a> {
        PolicyConstraints {
            policy: self.name,
            required_key_usage: self.required_key_usage,
            extended_key_usage: self.extended_key_usage,
            hostname: hostname.filter(|_| self.requires_hostname_match),
            time,
        }
    }
}

/// What a certificate chain must satisfy for one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConstraints<'a> {
    /// The policy being evaluated
    pub policy: PolicyName,
    /// See [`Policy::required_key_usage`]
    pub required_key_usage: &'static [KeyUsage],
    /// See [`Policy::extended_key_usage`]
    pub extended_key_usage: Option<ObjectIdentifier>,
    /// The DNS name the leaf must match, if any
    pub hostname: Option<&'a str>,
    /// The time, since the unix epoch, at which the chain must be valid.
    /// `None` skips validity period checks.
    pub time: Option<Duration>,
}

impl<'a> PolicyConstraints<'a> {
    /// Whether the asserted key usages satisfy the policy.
    ///
    /// `None` means the certificate has no key usage extension, which places
    /// no restriction.
    pub fn permits_key_usage(&self, asserted: Option<&[KeyUsage]>) -> bool {
        match asserted {
            None => true,
            Some(_) if self.required_key_usage.is_empty() => true,
            Some(asserted) => self
                .required_key_usage
                .iter()
                .any(|usage| asserted.contains(usage)),
        }
    }

    /// Whether the asserted extended key usages satisfy the policy.
    ///
    /// `None` means the certificate has no extended key usage extension.
    pub fn permits_extended_key_usage(&self, asserted: Option<&[ObjectIdentifier]>) -> bool {
        match (self.extended_key_usage, asserted) {
            (None, _) | (_, None) => true,
            (Some(required), Some(asserted)) => asserted
                .iter()
                .any(|purpose| *purpose == required || *purpose == ANY_EXTENDED_KEY_USAGE),
        }
    }
}

static POLICIES: OnceLock<[Policy; 3]> = OnceLock::new();

/// Lookup of the well known policies.
///
/// This is the only place usage constraints are defined.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyRegistry;

impl PolicyRegistry {
    /// The policy for `name`
    pub fn policy_for(name: PolicyName) -> &'static Policy {
        let policies = POLICIES.get_or_init(|| {
            [
                Policy {
                    name: PolicyName::X509,
                    required_key_usage: &[],
                    extended_key_usage: None,
                    requires_hostname_match: false,
                },
                Policy {
                    name: PolicyName::Ssl,
                    required_key_usage: &[
                        KeyUsage::DigitalSignature,
                        KeyUsage::KeyEncipherment,
                        KeyUsage::KeyAgreement,
                    ],
                    extended_key_usage: Some(SERVER_AUTH),
                    requires_hostname_match: true,
                },
                Policy {
                    name: PolicyName::Smime,
                    required_key_usage: &[
                        KeyUsage::DigitalSignature,
                        KeyUsage::NonRepudiation,
                        KeyUsage::KeyEncipherment,
                    ],
                    extended_key_usage: Some(EMAIL_PROTECTION),
                    requires_hostname_match: false,
                },
            ]
        });
        match name {
            PolicyName::X509 => &policies[0],
            PolicyName::Ssl => &policies[1],
            PolicyName::Smime => &policies[2],
        }
    }

    /// Basic X.509 path validation
    pub fn x509() -> &'static Policy {
        Self::policy_for(PolicyName::X509)
    }

    /// TLS server authentication
    pub fn ssl() -> &'static Policy {
        Self::policy_for(PolicyName::Ssl)
    }

    /// Secure mail
    pub fn smime() -> &'static Policy {
        Self::policy_for(PolicyName::Smime)
    }
}

/// Shorthand for [`PolicyRegistry::policy_for`]
pub fn policy_for(name: PolicyName) -> &'static Policy {
    PolicyRegistry::policy_for(name)
}

#[cfg(test)]
mod test {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        x509 = { PolicyName::X509, "X.509" },
        ssl = { PolicyName::Ssl, "SSL" },
        smime = { PolicyName::Smime, "S/MIME" },
    )]
    fn lookup_by_name(name: PolicyName, display: &str) {
        let policy = policy_for(name);
        assert_eq!(policy.name(), name);
        assert_eq!(policy.name().to_string(), display);
    }

    #[test]
    fn lookup_is_idempotent() {
        for name in PolicyName::ALL {
            assert!(core::ptr::eq(policy_for(name), policy_for(name)));
        }
    }

    #[test]
    fn only_ssl_matches_hostnames() {
        assert!(PolicyRegistry::ssl().requires_hostname_match());
        assert!(!PolicyRegistry::x509().requires_hostname_match());
        assert!(!PolicyRegistry::smime().requires_hostname_match());
    }

    #[test]
    fn hostname_dropped_when_not_matched() {
        let constraints = PolicyRegistry::x509().constraints(Some("example.com"), None);
        assert_eq!(constraints.hostname, None);

        let constraints = PolicyRegistry::ssl().constraints(Some("example.com"), None);
        assert_eq!(constraints.hostname, Some("example.com"));
    }

    #[test]
    fn key_usage_any_of() {
        let constraints = PolicyRegistry::ssl().constraints(None, None);
        assert!(constraints.permits_key_usage(None));
        assert!(constraints.permits_key_usage(Some(&[KeyUsage::KeyAgreement])));
        assert!(!constraints.permits_key_usage(Some(&[KeyUsage::KeyCertSign])));
        assert!(!constraints.permits_key_usage(Some(&[])));

        let constraints = PolicyRegistry::x509().constraints(None, None);
        assert!(constraints.permits_key_usage(Some(&[KeyUsage::KeyCertSign])));
    }

    #[test]
    fn extended_key_usage() {
        let constraints = PolicyRegistry::smime().constraints(None, None);
        assert!(constraints.permits_extended_key_usage(None));
        assert!(constraints.permits_extended_key_usage(Some(&[EMAIL_PROTECTION])));
        assert!(constraints.permits_extended_key_usage(Some(&[ANY_EXTENDED_KEY_USAGE])));
        assert!(!constraints.permits_extended_key_usage(Some(&[SERVER_AUTH])));

        let constraints = PolicyRegistry::x509().constraints(None, None);
        assert!(constraints.permits_extended_key_usage(Some(&[SERVER_AUTH])));
    }
}
