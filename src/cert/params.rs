use std::str::FromStr;

use bon::Builder;
use const_oid::ObjectIdentifier;
use time::Duration;
use time::OffsetDateTime;
use x509_cert::name::RdnSequence;

use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtendedKeyUsage;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::error::{Error, ErrorCode, Result};
use crate::key::PublicKey;

/// Parameters for building an X.509 certificate.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `usages` - A list of extended key usage options.
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `path_len` - The path length constraint written for CA certificates.
/// * `extensions` - Additional X.509 extensions.
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub is_ca: bool,
    pub path_len: Option<u8>,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// Distinguished name parameters for building an X.509 certificate.
///
/// Attributes left as `None` (or empty) are omitted from the encoded name.
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    #[builder(into)]
    pub common_name: String,
    #[builder(into)]
    pub country: Option<String>,
    #[builder(into)]
    pub state: Option<String>,
    #[builder(into)]
    pub locality: Option<String>,
    #[builder(into)]
    pub organization: Option<String>,
    #[builder(into)]
    pub organization_unit: Option<String>,
}

impl DistinguishedName {
    /// Converts the distinguished name to an X.509 `Name`.
    pub fn as_x509_name(&self) -> Result<x509_cert::name::Name> {
        let attributes = [
            ("CN", Some(&self.common_name)),
            ("OU", self.organization_unit.as_ref()),
            ("O", self.organization.as_ref()),
            ("L", self.locality.as_ref()),
            ("ST", self.state.as_ref()),
            ("C", self.country.as_ref()),
        ];
        let rfc4514_name = attributes
            .iter()
            .filter_map(|(key, value)| {
                value
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("{key}={}", escape_rfc4514(v)))
            })
            .collect::<Vec<_>>()
            .join(",");

        RdnSequence::from_str(&rfc4514_name).map_err(|e| {
            Error::coded(
                ErrorCode::Encode,
                format!("invalid distinguished name '{rfc4514_name}': {e}"),
            )
        })
    }

    /// Reads the supported attributes back out of an X.509 `Name`.
    pub fn from_x509_name(x509dn: &x509_cert::name::Name) -> Self {
        let mut map = super::name::attribute_map(x509dn);
        DistinguishedName {
            common_name: map.remove("CN").unwrap_or_default(),
            country: map.remove("C"),
            state: map.remove("ST"),
            locality: map.remove("L"),
            organization: map.remove("O"),
            organization_unit: map.remove("OU"),
        }
    }
}

fn escape_rfc4514(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (i == 0 && matches!(c, '#' | ' '))
            || (i == last && c == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Copy, Debug)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            not_before: now,
            not_after: now + Duration::days(days),
        }
    }

    /// A validity period with explicit bounds.
    pub fn between(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Self {
        Self {
            not_before,
            not_after,
        }
    }
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::BasicConstraints;

    #[test]
    fn test_distinguished_name_round_trip() {
        let dn = DistinguishedName::builder()
            .common_name("Example Root")
            .organization("Example, Inc.")
            .country("US")
            .build();
        let name = dn.as_x509_name().unwrap();
        assert_eq!(DistinguishedName::from_x509_name(&name), dn);
    }

    #[test]
    fn test_empty_attributes_are_omitted() {
        let dn = DistinguishedName {
            common_name: "Only CN".to_string(),
            organization: Some(String::new()),
            ..Default::default()
        };
        let name = dn.as_x509_name().unwrap();
        assert_eq!(name.0.len(), 1);
    }

    #[test]
    fn test_escape_rfc4514() {
        assert_eq!(escape_rfc4514("a,b"), "a\\,b");
        assert_eq!(escape_rfc4514("#lead"), "\\#lead");
        assert_eq!(escape_rfc4514("trail "), "trail\\ ");
        assert_eq!(escape_rfc4514("plain"), "plain");
    }

    #[test]
    fn test_extension_param_round_trip() {
        let bc = BasicConstraints {
            is_ca: true,
            max_path_length: Some(0),
        };
        let param = ExtensionParam::from_extension(bc, true).unwrap();
        assert_eq!(param.oid, BasicConstraints::OID);
        assert_eq!(param.to_extension::<BasicConstraints>().unwrap(), bc);
    }
}
