use der::Encode;
use der::asn1::{GeneralizedTime, OctetString, UtcTime};
use time::OffsetDateTime;
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;

use crate::cert::SignatureAlgorithm;
use crate::cert::params::ExtensionParam;
use crate::error::{Error, ErrorCode, Result};
use crate::key::PublicKey;

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
///
/// # Fields
/// * `serial_number` - The unique identifier for the certificate.
/// * `signature_algorithm` - The algorithm used to sign the certificate.
/// * `issuer` - The name of the certificate issuer.
/// * `not_before` - The start of the certificate's validity period.
/// * `not_after` - The end of the certificate's validity period.
/// * `subject` - The name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `extensions` - X.509 extensions for the certificate.
pub struct TbsCertificate {
    pub serial_number: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    pub issuer: Name,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub subject: Name,
    pub subject_public_key: PublicKey,
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let extensions = self
            .extensions
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone()).map_err(encoding)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let validity = x509_cert::time::Validity {
            not_before: x509_time(self.not_before)?,
            not_after: x509_time(self.not_after)?,
        };

        let serial_number = SerialNumber::new(self.serial_number.as_slice()).map_err(encoding)?;

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number,
            signature: self.signature_algorithm.into(),
            issuer: self.issuer.clone(),
            validity,
            subject: self.subject.clone(),
            subject_public_key_info: self.subject_public_key.to_spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: (!extensions.is_empty()).then_some(extensions),
        })
    }

    /// Encodes the `TbsCertificate` into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.to_tbs_certificate_inner()?.to_der().map_err(encoding)
    }
}

/// RFC 5280 section 4.1.2.5: UTCTime through 2049, GeneralizedTime after.
fn x509_time(at: OffsetDateTime) -> Result<Time> {
    let system_time = std::time::SystemTime::from(at);
    if at.year() < 2050 {
        Ok(Time::UtcTime(
            UtcTime::from_system_time(system_time).map_err(encoding)?,
        ))
    } else {
        Ok(Time::GeneralTime(
            GeneralizedTime::from_system_time(system_time).map_err(encoding)?,
        ))
    }
}

fn encoding(e: der::Error) -> Error {
    Error::coded(ErrorCode::Encode, format!("cannot encode certificate: {e}"))
}
