// Copyright (c) 2023 The MobileCoin Foundation

//! Attribute lookup within an X509 distinguished name as defined in section
//! [4.1.2.4](https://datatracker.ietf.org/doc/html/rfc5280#section-4.1.2.4) of
//! [RFC5280](https://datatracker.ietf.org/doc/html/rfc5280)
//!
//! ```ignore
//!     Name ::= RDNSequence
//!     RDNSequence ::= SEQUENCE OF RelativeDistinguishedName
//!     RelativeDistinguishedName ::= SET OF AttributeTypeAndValue
//!     AttributeTypeAndValue ::= SEQUENCE {
//!         AttributeType,
//!         AttributeValue
//!     }
//!     AttributeType ::= OBJECT IDENTIFIER
//!     AttributeValue ::= DirectoryString
//!
//!     DirectoryString ::= CHOICE {
//!         TeletexString (Unsupported in this implementation).
//!         PrintableString
//!         UniversalString (Unsupported in this implementation)
//!         UTF8String
//!         BMPString (Unsupported in this implementation)
//!         IA5String (See note below)
//!     }
//! ```
//!
//! IA5String is not part of `DirectoryString`, but it is the encoding used for
//! the PKCS#9 `emailAddress` attribute and the domain component attribute, so
//! it is accepted here as well.

use const_oid::ObjectIdentifier;
use x509_cert::attr::AttributeValue;
use x509_cert::der::asn1::{Ia5StringRef, PrintableStringRef, Utf8StringRef};
use x509_cert::der::ErrorKind::TagUnknown;
use x509_cert::der::{Length, Tag, Tagged};
use x509_cert::name::Name;

/// id-at-commonName
pub(crate) const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
/// PKCS#9 emailAddress
pub(crate) const EMAIL_ADDRESS: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

#[derive(Debug)]
enum DirectoryString<'a> {
    Printable(PrintableStringRef<'a>),
    Utf8(Utf8StringRef<'a>),
    Ia5(Ia5StringRef<'a>),
}

impl<'a> TryFrom<&'a AttributeValue> for DirectoryString<'a> {
    type Error = x509_cert::der::Error;

    fn try_from(value: &'a AttributeValue) -> Result<Self, Self::Error> {
        match value.tag() {
            Tag::PrintableString => Ok(DirectoryString::Printable(PrintableStringRef::try_from(
                value,
            )?)),
            Tag::Utf8String => Ok(DirectoryString::Utf8(Utf8StringRef::try_from(value)?)),
            Tag::Ia5String => Ok(DirectoryString::Ia5(Ia5StringRef::try_from(value)?)),
            tag => Err(Self::Error::new(
                TagUnknown { byte: tag.octet() },
                Length::from(0u8),
            )),
        }
    }
}

impl<'a> From<&DirectoryString<'a>> for &'a str {
    fn from(value: &DirectoryString<'a>) -> &'a str {
        match value {
            DirectoryString::Printable(s) => s.as_str(),
            DirectoryString::Utf8(s) => s.as_str(),
            DirectoryString::Ia5(s) => s.as_str(),
        }
    }
}

/// All string values of the attribute `oid` in `name`, in encoded order.
///
/// Values in an unsupported string encoding are an error rather than being
/// skipped, so a name is never silently reported as lacking an attribute it
/// actually has.
pub(crate) fn attribute_values<'a>(
    name: &'a Name,
    oid: ObjectIdentifier,
) -> Result<Vec<&'a str>, x509_cert::der::Error> {
    let mut values = Vec::new();
    for rdn in name.0.iter() {
        for attribute in rdn.0.iter().filter(|attribute| attribute.oid == oid) {
            let value = DirectoryString::try_from(&attribute.value)?;
            values.push((&value).into());
        }
    }
    Ok(values)
}

/// The most specific common name of `name`, the last one encoded.
pub(crate) fn common_name(name: &Name) -> Result<Option<&str>, x509_cert::der::Error> {
    Ok(attribute_values(name, COMMON_NAME)?.pop())
}

#[cfg(test)]
mod test {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn common_name_present() {
        let name =
            Name::from_str("CN=www.example.com,O=Example Org").expect("Failed to parse name");
        assert_eq!(common_name(&name), Ok(Some("www.example.com")));
    }

    #[test]
    fn common_name_absent() {
        let name = Name::from_str("O=Example Org,OU=Devices").expect("Failed to parse name");
        assert_eq!(common_name(&name), Ok(None));
    }

    #[test]
    fn attribute_values_collects_every_match() {
        let name = Name::from_str("OU=one,OU=two,O=Example Org").expect("Failed to parse name");
        let ou = ObjectIdentifier::new_unwrap("2.5.4.11");
        let mut values = attribute_values(&name, ou).expect("Failed to read attributes");
        values.sort();
        assert_eq!(values, vec!["one", "two"]);
    }
}
