#![allow(dead_code)]

use trustkit::cert::extensions::ExtendedKeyUsageOption;
use trustkit::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};
use trustkit::cert::{Certificate, CertificateWithPrivateKey};
use trustkit::issuer::Issuer;
use trustkit::key::{KeyPair, PublicKey};

/// A root, an intermediate under it, and a server leaf under the intermediate.
pub struct Hierarchy {
    pub root: CertificateWithPrivateKey,
    pub intermediate: CertificateWithPrivateKey,
    pub leaf: Certificate,
}

pub fn request(common_name: &str, key: &KeyPair, is_ca: bool) -> CertificationRequestInfo {
    CertificationRequestInfo::builder()
        .subject(
            DistinguishedName::builder()
                .common_name(common_name)
                .organization("Trustkit Integration")
                .build(),
        )
        .subject_public_key(PublicKey::from_key_pair(key))
        .is_ca(is_ca)
        .build()
}

pub fn generate_ca_cert_with(common_name: &str, validity: Validity) -> CertificateWithPrivateKey {
    let ca_key = KeyPair::generate_ecdsa_p256();
    CertificateWithPrivateKey {
        cert: Certificate::new_self_signed(&request(common_name, &ca_key, true), &ca_key, validity)
            .unwrap(),
        key: ca_key,
    }
}

pub fn generate_ca_cert(common_name: &str) -> CertificateWithPrivateKey {
    generate_ca_cert_with(common_name, Validity::for_days(365))
}

pub fn generate_intermediate(issuer: &impl Issuer, common_name: &str) -> CertificateWithPrivateKey {
    let key = KeyPair::generate_ecdsa_p256();
    let cert = issuer
        .issue(&request(common_name, &key, true), Validity::for_days(180))
        .unwrap();
    CertificateWithPrivateKey { cert, key }
}

pub fn generate_leaf_with(issuer: &impl Issuer, common_name: &str, validity: Validity) -> Certificate {
    let key = KeyPair::generate_ecdsa_p256();
    let mut info = request(common_name, &key, false);
    info.usages = vec![ExtendedKeyUsageOption::ServerAuth];
    issuer.issue(&info, validity).unwrap()
}

pub fn generate_leaf(issuer: &impl Issuer, common_name: &str) -> Certificate {
    generate_leaf_with(issuer, common_name, Validity::for_days(30))
}

pub fn generate_hierarchy(prefix: &str) -> Hierarchy {
    let root = generate_ca_cert(&format!("{prefix} Root"));
    let intermediate = generate_intermediate(&root, &format!("{prefix} Intermediate"));
    let leaf = generate_leaf(&intermediate, &format!("{}.example", prefix.to_lowercase()));
    Hierarchy {
        root,
        intermediate,
        leaf,
    }
}

/// Routes `tracing` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
