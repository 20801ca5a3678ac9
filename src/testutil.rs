//! Certificate hierarchies for unit tests.
#![allow(dead_code)]

use crate::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};
use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::issuer::Issuer;
use crate::key::KeyPair;

pub fn dn(common_name: &str) -> DistinguishedName {
    DistinguishedName::builder()
        .common_name(common_name)
        .organization("Trustkit Tests")
        .build()
}

pub fn request(common_name: &str, key: &KeyPair, is_ca: bool) -> CertificationRequestInfo {
    CertificationRequestInfo::builder()
        .subject(dn(common_name))
        .subject_public_key(key.public_key())
        .is_ca(is_ca)
        .build()
}

pub fn root_with(common_name: &str, validity: Validity) -> CertificateWithPrivateKey {
    let key = KeyPair::generate_ecdsa_p256();
    let cert = Certificate::new_self_signed(&request(common_name, &key, true), &key, validity)
        .unwrap();
    CertificateWithPrivateKey { cert, key }
}

pub fn root(common_name: &str) -> CertificateWithPrivateKey {
    root_with(common_name, Validity::for_days(365))
}

pub fn issue_ca(
    issuer: &impl Issuer,
    common_name: &str,
    path_len: Option<u8>,
) -> CertificateWithPrivateKey {
    let key = KeyPair::generate_ecdsa_p256();
    let mut info = request(common_name, &key, true);
    info.path_len = path_len;
    let cert = issuer.issue(&info, Validity::for_days(180)).unwrap();
    CertificateWithPrivateKey { cert, key }
}

pub fn intermediate(issuer: &impl Issuer, common_name: &str) -> CertificateWithPrivateKey {
    issue_ca(issuer, common_name, None)
}

pub fn leaf_with(issuer: &impl Issuer, common_name: &str, validity: Validity) -> Certificate {
    let key = KeyPair::generate_ecdsa_p256();
    issuer
        .issue(&request(common_name, &key, false), validity)
        .unwrap()
}

pub fn leaf(issuer: &impl Issuer, common_name: &str) -> Certificate {
    leaf_with(issuer, common_name, Validity::for_days(30))
}
