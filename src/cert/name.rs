//! Attribute maps for X.509 names.

use std::collections::BTreeMap;

use const_oid::ObjectIdentifier;
use const_oid::db::{DB, rfc3280, rfc4519};
use der::asn1::{
    Any, BmpString, Ia5StringRef, PrintableStringRef, TeletexStringRef, Utf8StringRef,
};
use der::{Tag, Tagged};
use x509_cert::name::Name;

/// `organizationIdentifier` (X.520); absent from the const-oid database.
const ORGANIZATION_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.97");

const SHORT_NAMES: &[(ObjectIdentifier, &str)] = &[
    (rfc4519::CN, "CN"),
    (rfc4519::SN, "SN"),
    (rfc4519::SERIAL_NUMBER, "serialNumber"),
    (rfc4519::C, "C"),
    (rfc4519::L, "L"),
    (rfc4519::ST, "ST"),
    (rfc4519::STREET, "STREET"),
    (rfc4519::O, "O"),
    (rfc4519::OU, "OU"),
    (rfc4519::TITLE, "title"),
    (rfc4519::GIVEN_NAME, "GN"),
    (ORGANIZATION_IDENTIFIER, "organizationIdentifier"),
    (rfc4519::UID, "UID"),
    (rfc4519::DC, "DC"),
    (rfc3280::EMAIL_ADDRESS, "emailAddress"),
];

/// Preferred short name, then the database name, then the dotted form.
fn short_name(oid: &ObjectIdentifier) -> String {
    SHORT_NAMES
        .iter()
        .find(|(known, _)| known == oid)
        .map(|(_, short)| *short)
        .or_else(|| DB.by_oid(oid))
        .map_or_else(|| oid.to_string(), str::to_owned)
}

fn decode_value(value: &Any) -> String {
    let decoded = match value.tag() {
        Tag::Utf8String => value.decode_as::<Utf8StringRef<'_>>().map(|s| s.to_string()),
        Tag::PrintableString => value
            .decode_as::<PrintableStringRef<'_>>()
            .map(|s| s.to_string()),
        Tag::Ia5String => value.decode_as::<Ia5StringRef<'_>>().map(|s| s.to_string()),
        Tag::TeletexString => value
            .decode_as::<TeletexStringRef<'_>>()
            .map(|s| s.to_string()),
        Tag::BmpString => value.decode_as::<BmpString>().map(|s| s.to_string()),
        Tag::VisibleString => std::str::from_utf8(value.value())
            .map(str::to_owned)
            .map_err(der::Error::from),
        _ => return value.value().iter().map(|b| format!("{b:02x}")).collect(),
    };
    // T.61 strings in the wild carry Latin-1 that der rejects.
    decoded.unwrap_or_else(|_| value.value().iter().copied().map(char::from).collect())
}

/// Flattens `name` into a map from attribute short name to value.
///
/// Attribute types outside the short-name table are keyed by their
/// const-oid database name, or by the dotted OID when unnamed. Repeated
/// attributes are joined with `", "` in encoding order.
pub fn attribute_map(name: &Name) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for rdn in name.0.iter() {
        for attr in rdn.0.iter() {
            let value = decode_value(&attr.value);
            map.entry(short_name(&attr.oid))
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_attribute_map_short_names() {
        let name = Name::from_str("CN=Example Root,O=Example,C=US").unwrap();
        let map = attribute_map(&name);
        assert_eq!(map.get("CN").map(String::as_str), Some("Example Root"));
        assert_eq!(map.get("O").map(String::as_str), Some("Example"));
        assert_eq!(map.get("C").map(String::as_str), Some("US"));
    }

    #[test]
    fn test_repeated_attributes_are_joined() {
        let name = Name::from_str("OU=Second,OU=First,CN=Multi").unwrap();
        let map = attribute_map(&name);
        let ou = map.get("OU").unwrap();
        assert!(ou.contains("First") && ou.contains("Second"));
        assert!(ou.contains(", "));
    }

    #[test]
    fn test_database_name_fallback() {
        assert_eq!(short_name(&rfc4519::POSTAL_CODE), "postalCode");
        assert_eq!(short_name(&rfc3280::EMAIL_ADDRESS), "emailAddress");
    }

    #[test]
    fn test_bmp_and_teletex_values() {
        let bmp = Any::new(Tag::BmpString, vec![0x00, 0x52, 0x00, 0xe9, 0x00, 0x73]).unwrap();
        assert_eq!(decode_value(&bmp), "Rés");

        let latin1 = Any::new(Tag::TeletexString, b"Soci\xe9t\xe9".to_vec()).unwrap();
        assert_eq!(decode_value(&latin1), "Société");

        let ascii = Any::new(Tag::TeletexString, b"Plain".to_vec()).unwrap();
        assert_eq!(decode_value(&ascii), "Plain");

        let octets = Any::new(Tag::OctetString, vec![0xde, 0xad]).unwrap();
        assert_eq!(decode_value(&octets), "dead");
    }

    #[test]
    fn test_unknown_attribute_uses_dotted_oid() {
        assert_eq!(
            short_name(&ObjectIdentifier::new_unwrap("1.2.3.4")),
            "1.2.3.4"
        );
    }
}
