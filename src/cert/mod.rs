pub mod extensions;
pub mod name;
pub mod params;

use std::collections::BTreeMap;
use std::fmt;

use const_oid::ObjectIdentifier;
use const_oid::db::{rfc5912, rfc8410};
use der::asn1::AnyRef;
use der::{Decode, Encode, EncodePem, SliceReader};
use sha2::{Digest, Sha256, Sha384, Sha512};
use time::OffsetDateTime;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{Error, ErrorCode, Result};
use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};
use extensions::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, KeyUsages, SubjectKeyIdentifier,
    ToAndFromX509Extension,
};
use params::{CertificationRequestInfo, Validity};

/// Represents the supported signature algorithms for certificates.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-1 with RSA encryption. Accepted, but reported as weak.
    Sha1WithRSA,
    /// SHA-256 with RSA encryption.
    Sha256WithRSA,
    /// SHA-384 with RSA encryption.
    Sha384WithRSA,
    /// SHA-512 with RSA encryption.
    Sha512WithRSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
    /// SHA-384 with ECDSA.
    Sha384WithECDSA,
    /// SHA-512 with ECDSA.
    Sha512WithECDSA,
    /// Pure EdDSA over Ed25519.
    Ed25519,
}

impl SignatureAlgorithm {
    /// Looks up the algorithm for a signature OID.
    pub fn from_oid(oid: ObjectIdentifier) -> Result<Self> {
        match oid {
            rfc5912::SHA_1_WITH_RSA_ENCRYPTION => Ok(SignatureAlgorithm::Sha1WithRSA),
            rfc5912::SHA_256_WITH_RSA_ENCRYPTION => Ok(SignatureAlgorithm::Sha256WithRSA),
            rfc5912::SHA_384_WITH_RSA_ENCRYPTION => Ok(SignatureAlgorithm::Sha384WithRSA),
            rfc5912::SHA_512_WITH_RSA_ENCRYPTION => Ok(SignatureAlgorithm::Sha512WithRSA),
            rfc5912::ECDSA_WITH_SHA_256 => Ok(SignatureAlgorithm::Sha256WithECDSA),
            rfc5912::ECDSA_WITH_SHA_384 => Ok(SignatureAlgorithm::Sha384WithECDSA),
            rfc5912::ECDSA_WITH_SHA_512 => Ok(SignatureAlgorithm::Sha512WithECDSA),
            rfc8410::ID_ED_25519 => Ok(SignatureAlgorithm::Ed25519),
            other => Err(Error::coded(
                ErrorCode::UnsupportedAlgorithm,
                format!("unsupported signature algorithm {other}"),
            )),
        }
    }

    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            SignatureAlgorithm::Sha1WithRSA => rfc5912::SHA_1_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha256WithRSA => rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha384WithRSA => rfc5912::SHA_384_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha512WithRSA => rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha256WithECDSA => rfc5912::ECDSA_WITH_SHA_256,
            SignatureAlgorithm::Sha384WithECDSA => rfc5912::ECDSA_WITH_SHA_384,
            SignatureAlgorithm::Sha512WithECDSA => rfc5912::ECDSA_WITH_SHA_512,
            SignatureAlgorithm::Ed25519 => rfc8410::ID_ED_25519,
        }
    }

    /// Weak algorithms are accepted but produce a verification warning.
    pub fn is_weak(&self) -> bool {
        matches!(self, SignatureAlgorithm::Sha1WithRSA)
    }

    pub(crate) fn is_ecdsa(&self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::Sha256WithECDSA
                | SignatureAlgorithm::Sha384WithECDSA
                | SignatureAlgorithm::Sha512WithECDSA
        )
    }

    /// Digest of `message` for the ECDSA variants.
    pub(crate) fn prehash(&self, message: &[u8]) -> Vec<u8> {
        match self {
            SignatureAlgorithm::Sha384WithECDSA => Sha384::digest(message).to_vec(),
            SignatureAlgorithm::Sha512WithECDSA => Sha512::digest(message).to_vec(),
            _ => Sha256::digest(message).to_vec(),
        }
    }
}

impl From<SignatureAlgorithm> for AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA algorithms carry an explicit NULL parameter, as RFC 4055 requires.
    fn from(value: SignatureAlgorithm) -> Self {
        let parameters = match value {
            SignatureAlgorithm::Sha1WithRSA
            | SignatureAlgorithm::Sha256WithRSA
            | SignatureAlgorithm::Sha384WithRSA
            | SignatureAlgorithm::Sha512WithRSA => Some(der::Any::from(AnyRef::NULL)),
            _ => None,
        };
        AlgorithmIdentifierOwned {
            oid: value.oid(),
            parameters,
        }
    }
}

/// SHA-256 digest of a certificate's DER encoding.
///
/// Used as the certificate's stable identity inside trust stores.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub const ALGORITHM: &'static str = "SHA-256";

    pub fn of(der: &[u8]) -> Self {
        Fingerprint(Sha256::digest(der).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    /// Colon separated upper-case hex, e.g. `AA:FF:1E:...`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// Represents a parsed X.509 certificate.
///
/// All metadata is derived once, when the certificate is decoded, and never
/// recomputed. The value is immutable; trust stores and verification chains
/// share it through `Arc`.
#[derive(Clone)]
pub struct Certificate {
    inner: x509_cert::Certificate,
    der: Vec<u8>,
    tbs_der: Vec<u8>,
    subject: String,
    issuer: String,
    subject_der: Vec<u8>,
    issuer_der: Vec<u8>,
    subject_map: BTreeMap<String, String>,
    issuer_map: BTreeMap<String, String>,
    fingerprint: Fingerprint,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    public_key: Option<PublicKey>,
    basic_constraints: Option<BasicConstraints>,
    key_usage: Option<KeyUsage>,
    subject_key_id: Option<Vec<u8>>,
    authority_key_id: Option<Vec<u8>>,
}

impl Certificate {
    /// Decodes a single DER-encoded certificate.
    ///
    /// Trailing data after the certificate is rejected.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(der)
            .map_err(|e| Error::coded(ErrorCode::ParseCert, format!("invalid certificate: {e}")))?;
        let tbs = &inner.tbs_certificate;

        let mut basic_constraints = None;
        let mut key_usage = None;
        let mut subject_key_id = None;
        let mut authority_key_id = None;
        for ext in tbs.extensions.iter().flatten() {
            let value = ext.extn_value.as_bytes();
            if ext.extn_id == BasicConstraints::OID {
                basic_constraints = Some(BasicConstraints::from_x509_extension_value(value)?);
            } else if ext.extn_id == KeyUsage::OID {
                key_usage = Some(KeyUsage::from_x509_extension_value(value)?);
            } else if ext.extn_id == SubjectKeyIdentifier::OID {
                subject_key_id = Some(SubjectKeyIdentifier::from_x509_extension_value(value)?.0);
            } else if ext.extn_id == AuthorityKeyIdentifier::OID {
                authority_key_id =
                    AuthorityKeyIdentifier::from_x509_extension_value(value)?.key_identifier;
            }
        }

        let public_key = PublicKey::from_x509spki(&tbs.subject_public_key_info).ok();

        Ok(Self {
            der: der.to_vec(),
            tbs_der: raw_tbs(der)?,
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            subject_der: tbs.subject.to_der()?,
            issuer_der: tbs.issuer.to_der()?,
            subject_map: name::attribute_map(&tbs.subject),
            issuer_map: name::attribute_map(&tbs.issuer),
            fingerprint: Fingerprint::of(der),
            not_before: OffsetDateTime::from(tbs.validity.not_before.to_system_time()),
            not_after: OffsetDateTime::from(tbs.validity.not_after.to_system_time()),
            public_key,
            basic_constraints,
            key_usage,
            subject_key_id,
            authority_key_id,
            inner,
        })
    }

    /// Decodes a single PEM-encoded certificate.
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let block = pem::parse(pem_str)?;
        if block.tag() != "CERTIFICATE" {
            return Err(Error::coded(
                ErrorCode::UnexpectedPemLabel,
                format!("expected CERTIFICATE, found {}", block.tag()),
            ));
        }
        Self::from_der(block.contents())
    }

    /// The DER encoding the certificate was decoded from.
    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| Error::coded(ErrorCode::Encode, e.to_string()))
    }

    /// The decoded ASN.1 structure.
    pub fn inner(&self) -> &x509_cert::Certificate {
        &self.inner
    }

    /// Subject distinguished name in RFC 4514 form.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name in RFC 4514 form.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Subject attributes keyed by short name (`CN`, `O`, ...).
    pub fn subject_map(&self) -> &BTreeMap<String, String> {
        &self.subject_map
    }

    /// Issuer attributes keyed by short name (`CN`, `O`, ...).
    pub fn issuer_map(&self) -> &BTreeMap<String, String> {
        &self.issuer_map
    }

    pub fn fingerprint_algorithm(&self) -> &'static str {
        Fingerprint::ALGORITHM
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The fingerprint as colon separated hex.
    pub fn fingerprint_human(&self) -> String {
        self.fingerprint.to_string()
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    pub fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    /// The subject public key, when its algorithm is supported.
    pub fn public_key(&self) -> Result<&PublicKey> {
        self.public_key.as_ref().ok_or_else(|| {
            Error::coded(
                ErrorCode::UnsupportedAlgorithm,
                format!(
                    "unsupported public key algorithm {} in '{}'",
                    self.inner.tbs_certificate.subject_public_key_info.algorithm.oid, self.subject
                ),
            )
        })
    }

    /// The algorithm the issuer used to sign this certificate.
    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_oid(self.inner.signature_algorithm.oid)
    }

    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.subject_key_id.as_deref()
    }

    pub fn authority_key_id(&self) -> Option<&[u8]> {
        self.authority_key_id.as_deref()
    }

    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.key_usage
    }

    pub fn path_len_constraint(&self) -> Option<u32> {
        self.basic_constraints
            .as_ref()
            .and_then(|bc| bc.max_path_length)
    }

    /// `true` when BasicConstraints marks this certificate as a CA.
    pub fn is_ca(&self) -> bool {
        self.basic_constraints.as_ref().is_some_and(|bc| bc.is_ca)
    }

    /// `true` when the key usage, if present, permits signing certificates.
    pub fn may_sign_certificates(&self) -> bool {
        self.key_usage
            .is_none_or(|usage| usage.0.contains(KeyUsages::KeyCertSign))
    }

    /// Subject and issuer names are identical.
    pub fn is_self_issued(&self) -> bool {
        self.subject_der == self.issuer_der
    }

    /// Self-issued, with matching key identifiers where both are present.
    ///
    /// The signature itself is not checked here.
    pub fn is_self_signed(&self) -> bool {
        self.is_self_issued()
            && match (&self.subject_key_id, &self.authority_key_id) {
                (Some(ski), Some(aki)) => ski == aki,
                _ => true,
            }
    }

    /// `true` when `candidate` may be the issuer of `self` by name and key
    /// identifier. Signatures are not checked.
    pub fn names_issuer(&self, candidate: &Certificate) -> bool {
        self.issuer_der == candidate.subject_der
            && match (&self.authority_key_id, &candidate.subject_key_id) {
                (Some(aki), Some(ski)) => aki == ski,
                _ => true,
            }
    }

    /// Verifies this certificate's signature with `issuer`'s public key.
    pub fn verify_signed_by(&self, issuer: &Certificate) -> Result<()> {
        issuer
            .public_key()?
            .verify(
                &self.inner.signature_algorithm,
                &self.tbs_der,
                self.inner.signature.raw_bytes(),
            )
            .map_err(|e| e.context(format!("'{}' signed by '{}'", self.subject, issuer.subject)))
    }

    /// Returns `true` when the certificate is valid at `at`.
    ///
    /// Both bounds are inclusive.
    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    /// Creates a new self-signed certificate.
    ///
    /// # Arguments
    /// * `cert_info` - The certification request information.
    /// * `key` - The key pair used to sign the certificate.
    /// * `validity` - The validity window of the certificate.
    pub fn new_self_signed(
        cert_info: &CertificationRequestInfo,
        key: &KeyPair,
        validity: Validity,
    ) -> Result<Self> {
        let self_issuer = SelfIssuer {
            name: cert_info.subject.as_x509_name()?,
            key,
        };
        self_issuer.issue(cert_info, validity)
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("fingerprint", &self.fingerprint)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("is_ca", &self.is_ca())
            .finish()
    }
}

/// The `tbsCertificate` bytes exactly as they appear in `der`.
///
/// Signatures cover the original encoding, so the field is sliced out rather
/// than re-encoded.
fn raw_tbs(der: &[u8]) -> Result<Vec<u8>> {
    let outer = AnyRef::from_der(der)?;
    let mut reader = SliceReader::new(outer.value())?;
    let tbs = AnyRef::decode(&mut reader)?;
    Ok(tbs.to_der()?)
}

// Helper struct for self-signed certificates
struct SelfIssuer<'a> {
    name: x509_cert::name::Name,
    key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Result<x509_cert::name::Name> {
        Ok(self.name.clone())
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}

/// A certificate together with the key pair that can issue under it.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issuer for CertificateWithPrivateKey {
    fn issuer_name(&self) -> Result<x509_cert::name::Name> {
        // The name of the issuer is the subject of the certificate
        Ok(self.cert.inner.tbs_certificate.subject.clone())
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn test_derived_metadata() {
        let root = testutil::root("Metadata Root");
        let cert = &root.cert;

        assert_eq!(cert.subject_map().get("CN").map(String::as_str), Some("Metadata Root"));
        assert_eq!(cert.subject_map().get("O").map(String::as_str), Some("Trustkit Tests"));
        assert_eq!(cert.subject(), cert.issuer());
        assert!(cert.is_ca());
        assert!(cert.is_self_signed());
        assert!(cert.subject_key_id().is_some());
        assert_eq!(cert.subject_key_id(), cert.authority_key_id());
        assert_eq!(cert.fingerprint_algorithm(), "SHA-256");
        assert_eq!(cert.fingerprint_human().len(), 32 * 3 - 1);
        assert!(cert.not_before() < cert.not_after());
        cert.verify_signed_by(cert).unwrap();
    }

    #[test]
    fn test_leaf_is_not_ca() {
        let root = testutil::root("Leaf Root");
        let leaf = testutil::leaf(&root, "leaf.example");
        assert!(!leaf.is_ca());
        assert!(!leaf.is_self_signed());
        assert!(leaf.names_issuer(&root.cert));
        assert!(!root.cert.names_issuer(&leaf));
        leaf.verify_signed_by(&root.cert).unwrap();
    }

    #[test]
    fn test_pem_round_trip_preserves_identity() {
        let root = testutil::root("Pem Root");
        let pem = root.cert.to_pem().unwrap();
        let decoded = Certificate::from_pem(&pem).unwrap();
        assert_eq!(decoded, root.cert);
        assert_eq!(decoded.to_der(), root.cert.to_der());
    }

    #[test]
    fn test_trailing_data_is_rejected() {
        let root = testutil::root("Trailing Root");
        let mut der = root.cert.to_der().to_vec();
        der.push(0);
        let err = Certificate::from_der(&der).unwrap_err();
        assert!(err.has_code(ErrorCode::ParseCert));
    }

    #[test]
    fn test_validity_bounds_are_inclusive() {
        let root = testutil::root("Bounds Root");
        let cert = &root.cert;
        assert!(cert.is_valid_at(cert.not_before()));
        assert!(cert.is_valid_at(cert.not_after()));
        assert!(!cert.is_valid_at(cert.not_after() + time::Duration::seconds(1)));
        assert!(!cert.is_valid_at(cert.not_before() - time::Duration::seconds(1)));
    }

    #[test]
    fn test_fingerprint_display() {
        let fp = Fingerprint([0xAB; 32]);
        assert!(fp.to_string().starts_with("AB:AB:"));
    }
}
