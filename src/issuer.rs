use der::Encode;
use der::flagset::FlagSet;
use sha1::{Digest, Sha1};
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages,
    SubjectKeyIdentifier,
};
use crate::cert::params::{CertificationRequestInfo, ExtensionParam, Validity};
use crate::error::{Error, ErrorCode, Result};
use crate::key::{KeyPair, PublicKey};
use crate::tbs_certificate::TbsCertificate;

/// SHA-1 over the `subjectPublicKey` bits (RFC 5280 section 4.2.1.2, method 1).
pub fn key_identifier_for(public_key: &PublicKey) -> Result<Vec<u8>> {
    let spki = public_key.to_spki()?;
    Ok(Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec())
}

/// Represents an entity capable of issuing certificates.
pub trait Issuer {
    /// Returns the name written into the issuer field of issued certificates.
    fn issuer_name(&self) -> Result<Name>;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Key identifier written as the authority key identifier.
    fn key_identifier(&self) -> Result<Vec<u8>> {
        key_identifier_for(&self.signing_key().public_key())
    }

    /// Issues a certificate based on the provided certification request information.
    ///
    /// The certificate gets a random 128-bit serial number, critical basic
    /// constraints and key usage, and subject/authority key identifiers.
    fn issue(
        &self,
        cert_request: &CertificationRequestInfo,
        validity: Validity,
    ) -> Result<Certificate> {
        let signature_algorithm = self.signing_key().signature_algorithm();

        let basic_constraints = BasicConstraints {
            is_ca: cert_request.is_ca,
            max_path_length: cert_request
                .path_len
                .filter(|_| cert_request.is_ca)
                .map(u32::from),
        };
        let key_usage: FlagSet<KeyUsages> = if cert_request.is_ca {
            KeyUsages::KeyCertSign | KeyUsages::CRLSign
        } else {
            KeyUsages::DigitalSignature.into()
        };
        let subject_key_id =
            SubjectKeyIdentifier(key_identifier_for(&cert_request.subject_public_key)?);
        let authority_key_id = AuthorityKeyIdentifier {
            key_identifier: Some(self.key_identifier()?),
        };

        let mut extensions = vec![
            ExtensionParam::from_extension(basic_constraints, true)?,
            ExtensionParam::from_extension(KeyUsage(key_usage), true)?,
            ExtensionParam::from_extension(subject_key_id, false)?,
            ExtensionParam::from_extension(authority_key_id, false)?,
        ];
        if !cert_request.usages.is_empty() {
            let extended_key_usage = ExtendedKeyUsage {
                usage: cert_request.usages.clone(),
            };
            extensions.push(ExtensionParam::from_extension(extended_key_usage, false)?);
        }
        extensions.extend(cert_request.extensions.iter().cloned());

        let mut serial_number: [u8; 16] = rand::random();
        // Positive and without a leading zero byte.
        serial_number[0] &= 0x7f;
        serial_number[0] |= 0x01;

        let tbs_cert = TbsCertificate {
            serial_number: serial_number.to_vec(),
            signature_algorithm,
            issuer: self.issuer_name()?,
            not_before: validity.not_before,
            not_after: validity.not_after,
            subject: cert_request.subject.as_x509_name()?,
            subject_public_key: cert_request.subject_public_key.clone(),
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let tbs_der = tbs_cert_inner.to_der().map_err(encoding)?;
        let signature = self.signing_key().sign_data(&tbs_der)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algorithm.into(),
            signature: der::asn1::BitString::from_bytes(&signature).map_err(encoding)?,
        };

        let der = cert_inner.to_der().map_err(encoding)?;
        tracing::trace!(subject = %cert_request.subject.common_name, "issued certificate");
        Certificate::from_der(&der)
    }
}

fn encoding(e: der::Error) -> Error {
    Error::coded(ErrorCode::Encode, format!("cannot encode certificate: {e}"))
}
