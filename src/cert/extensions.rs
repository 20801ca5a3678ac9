use const_oid::AssociatedOid;
use der::{Decode, Encode, asn1::OctetString, oid::ObjectIdentifier};

use crate::error::{Error, ErrorCode};

pub use der::flagset::FlagSet;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

/// Trait for converting to and from X.509 extensions.
///
/// This trait provides methods to encode and decode X.509 extension values.
///
/// # Example
/// ```
/// use trustkit::cert::extensions::{BasicConstraints, ToAndFromX509Extension};
/// let bc = BasicConstraints { is_ca: true, max_path_length: Some(1) };
/// let encoded = bc.to_x509_extension_value().unwrap();
/// let decoded = BasicConstraints::from_x509_extension_value(&encoded).unwrap();
/// assert_eq!(bc, decoded);
/// ```
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>, Error>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, Error>
    where
        Self: Sized;
}

fn decoding<E: std::fmt::Display>(name: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::coded(ErrorCode::ParseCert, format!("malformed {name} extension: {e}"))
}

fn encoding(e: der::Error) -> Error {
    Error::coded(ErrorCode::Encode, e.to_string())
}

/// Represents the Basic Constraints extension.
///
/// This extension indicates whether the certificate is a CA certificate and its path length.
///
/// # Fields
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `max_path_length` - The maximum number of intermediate CAs allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicConstraints {
    pub is_ca: bool,
    pub max_path_length: Option<u32>,
}

impl ToAndFromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::BasicConstraints::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, Error> {
        let path_len_constraint = self
            .max_path_length
            .map(u8::try_from)
            .transpose()
            .map_err(|_| Error::coded(ErrorCode::Encode, "path length must fit in a byte"))?;
        let bc = x509_cert::ext::pkix::BasicConstraints {
            ca: self.is_ca,
            path_len_constraint,
        };

        bc.to_der().map_err(encoding)
    }

    fn from_x509_extension_value(der_bytes: &[u8]) -> Result<Self, Error> {
        let bc = x509_cert::ext::pkix::BasicConstraints::from_der(der_bytes)
            .map_err(decoding("basicConstraints"))?;
        Ok(Self {
            is_ca: bc.ca,
            max_path_length: bc.path_len_constraint.map(u32::from),
        })
    }
}

/// Represents the Key Usage extension.
///
/// This extension defines the purpose of the key contained in the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, Error> {
        let ku = X509KeyUsage::from(self.0);
        ku.to_der().map_err(encoding)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, Error> {
        let ku = X509KeyUsage::from_der(extension).map_err(decoding("keyUsage"))?;
        Ok(Self(ku.0))
    }
}

/// Represents the Extended Key Usage extension.
///
/// This extension indicates purposes for which the public key may be used.
#[derive(Debug, Clone, Default)]
pub struct ExtendedKeyUsage {
    pub usage: Vec<ExtendedKeyUsageOption>,
}

impl ToAndFromX509Extension for ExtendedKeyUsage {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::ExtendedKeyUsage::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, Error> {
        let oids: Vec<ObjectIdentifier> = self.usage.iter().map(|v| (*v).into()).collect();
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage(oids);
        eku.to_der().map_err(encoding)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, Error> {
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(extension)
            .map_err(decoding("extKeyUsage"))?;
        // Purposes outside the known set are ignored rather than rejected.
        let usage = eku
            .0
            .iter()
            .filter_map(|v| match *v {
                const_oid::db::rfc5912::ID_KP_OCSP_SIGNING => {
                    Some(ExtendedKeyUsageOption::OcspSigning)
                }
                const_oid::db::rfc5912::ID_KP_SERVER_AUTH => Some(ExtendedKeyUsageOption::ServerAuth),
                const_oid::db::rfc5912::ID_KP_CLIENT_AUTH => Some(ExtendedKeyUsageOption::ClientAuth),
                const_oid::db::rfc5912::ID_KP_CODE_SIGNING => {
                    Some(ExtendedKeyUsageOption::CodeSigning)
                }
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION => {
                    Some(ExtendedKeyUsageOption::EmailProtection)
                }
                const_oid::db::rfc5912::ID_KP_TIME_STAMPING => {
                    Some(ExtendedKeyUsageOption::TimeStamping)
                }
                _ => None,
            })
            .collect();
        Ok(Self { usage })
    }
}

/// Represents an option for the Extended Key Usage extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtendedKeyUsageOption {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

impl From<ExtendedKeyUsageOption> for ObjectIdentifier {
    fn from(value: ExtendedKeyUsageOption) -> Self {
        match value {
            ExtendedKeyUsageOption::OcspSigning => const_oid::db::rfc5912::ID_KP_OCSP_SIGNING,
            ExtendedKeyUsageOption::ServerAuth => const_oid::db::rfc5912::ID_KP_SERVER_AUTH,
            ExtendedKeyUsageOption::ClientAuth => const_oid::db::rfc5912::ID_KP_CLIENT_AUTH,
            ExtendedKeyUsageOption::CodeSigning => const_oid::db::rfc5912::ID_KP_CODE_SIGNING,
            ExtendedKeyUsageOption::EmailProtection => {
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION
            }
            ExtendedKeyUsageOption::TimeStamping => const_oid::db::rfc5912::ID_KP_TIME_STAMPING,
        }
    }
}

/// Represents the Subject Key Identifier (SKI) extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectKeyIdentifier(pub Vec<u8>);

impl ToAndFromX509Extension for SubjectKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, Error> {
        let octets = OctetString::new(self.0.as_slice()).map_err(encoding)?;
        x509_cert::ext::pkix::SubjectKeyIdentifier(octets)
            .to_der()
            .map_err(encoding)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, Error> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(extension)
            .map_err(decoding("subjectKeyIdentifier"))?;
        Ok(Self(ski.0.as_bytes().to_vec()))
    }
}

/// Represents the Authority Key Identifier (AKI) extension.
///
/// Only the `keyIdentifier` field is used for issuer matching; the
/// issuer-name/serial form is accepted but not retained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityKeyIdentifier {
    pub key_identifier: Option<Vec<u8>>,
}

impl ToAndFromX509Extension for AuthorityKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::AuthorityKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, Error> {
        let key_identifier = self
            .key_identifier
            .as_deref()
            .map(OctetString::new)
            .transpose()
            .map_err(encoding)?;
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier {
            key_identifier,
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };

        aki.to_der().map_err(encoding)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, Error> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier::from_der(extension)
            .map_err(decoding("authorityKeyIdentifier"))?;

        Ok(Self {
            key_identifier: aki.key_identifier.map(|id| id.as_bytes().to_vec()),
        })
    }
}
