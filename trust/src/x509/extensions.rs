// Copyright (c) 2023 The MobileCoin Foundation

//! Lookup of the certificate extensions used for trust evaluation, see
//! section [4.2](https://datatracker.ietf.org/doc/html/rfc5280#section-4.2) of
//! [RFC5280](https://datatracker.ietf.org/doc/html/rfc5280)

use crate::KeyUsage;
use const_oid::ObjectIdentifier;
use x509_cert::der::Decode;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage as X509KeyUsage, SubjectAltName,
};
use x509_cert::TbsCertificate;

const SUBJECT_ALT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.17");
const KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");
const EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37");
const BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");

type Result<T> = core::result::Result<T, x509_cert::der::Error>;

fn extension_value(tbs: &TbsCertificate, oid: ObjectIdentifier) -> Option<&[u8]> {
    tbs.extensions
        .as_ref()?
        .iter()
        .find(|extension| extension.extn_id == oid)
        .map(|extension| extension.extn_value.as_bytes())
}

fn subject_alt_names(tbs: &TbsCertificate) -> Result<Vec<GeneralName>> {
    match extension_value(tbs, SUBJECT_ALT_NAME) {
        Some(bytes) => Ok(SubjectAltName::from_der(bytes)?.0),
        None => Ok(Vec::new()),
    }
}

/// The `rfc822Name` entries of the subject alternative name extension
pub(crate) fn rfc822_names(tbs: &TbsCertificate) -> Result<Vec<String>> {
    Ok(subject_alt_names(tbs)?
        .into_iter()
        .filter_map(|name| match name {
            GeneralName::Rfc822Name(email) => Some(email.to_string()),
            _ => None,
        })
        .collect())
}

/// The `dNSName` entries of the subject alternative name extension
pub(crate) fn dns_names(tbs: &TbsCertificate) -> Result<Vec<String>> {
    Ok(subject_alt_names(tbs)?
        .into_iter()
        .filter_map(|name| match name {
            GeneralName::DnsName(dns) => Some(dns.to_string()),
            _ => None,
        })
        .collect())
}

/// The asserted key usages, `None` when the extension is absent.
pub(crate) fn key_usage(tbs: &TbsCertificate) -> Result<Option<Vec<KeyUsage>>> {
    let Some(bytes) = extension_value(tbs, KEY_USAGE) else {
        return Ok(None);
    };
    let usage = X509KeyUsage::from_der(bytes)?;
    let flags = [
        (usage.digital_signature(), KeyUsage::DigitalSignature),
        (usage.non_repudiation(), KeyUsage::NonRepudiation),
        (usage.key_encipherment(), KeyUsage::KeyEncipherment),
        (usage.data_encipherment(), KeyUsage::DataEncipherment),
        (usage.key_agreement(), KeyUsage::KeyAgreement),
        (usage.key_cert_sign(), KeyUsage::KeyCertSign),
        (usage.crl_sign(), KeyUsage::CrlSign),
        (usage.encipher_only(), KeyUsage::EncipherOnly),
        (usage.decipher_only(), KeyUsage::DecipherOnly),
    ];
    Ok(Some(
        flags
            .into_iter()
            .filter_map(|(set, usage)| set.then_some(usage))
            .collect(),
    ))
}

/// The asserted extended key usage purposes, `None` when the extension is
/// absent.
pub(crate) fn extended_key_usage(tbs: &TbsCertificate) -> Result<Option<Vec<ObjectIdentifier>>> {
    extension_value(tbs, EXTENDED_KEY_USAGE)
        .map(|bytes| Ok(ExtendedKeyUsage::from_der(bytes)?.0))
        .transpose()
}

/// Whether the certificate asserts it is a certificate authority.
pub(crate) fn is_ca(tbs: &TbsCertificate) -> Result<bool> {
    match extension_value(tbs, BASIC_CONSTRAINTS) {
        Some(bytes) => Ok(BasicConstraints::from_der(bytes)?.ca),
        None => Ok(false),
    }
}
