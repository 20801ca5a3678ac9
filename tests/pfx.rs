mod util;

use std::fs;

use tempfile::TempDir;
use trustkit::cert::Certificate;
use trustkit::error::ErrorCode;
use trustkit::pfx::{Pfx, load_pfx_from_file};

#[test]
fn test_pfx_round_trip_preserves_cert_and_key() {
    let temp_dir = TempDir::new().unwrap();
    let root = util::generate_ca_cert("Pfx Root");
    let path = temp_dir.path().join("bundle.p12");

    let pfx = Pfx::new(root.cert.clone(), Some(&root.key)).unwrap();
    pfx.save_to_file(&path, "s3cret").unwrap();

    let loaded = load_pfx_from_file(&path, "s3cret").unwrap();
    assert_eq!(*loaded.cert(), root.cert);
    assert!(loaded.has_key());
    let key = loaded.key_pair().unwrap().unwrap();
    assert_eq!(key.as_spki().unwrap(), root.key.as_spki().unwrap());

    // The recovered key still signs for the certificate.
    let leaf = util::generate_leaf(
        &trustkit::cert::CertificateWithPrivateKey {
            cert: loaded.cert().clone(),
            key,
        },
        "pfx.example",
    );
    leaf.verify_signed_by(&root.cert).unwrap();
}

#[test]
fn test_wrong_password() {
    let temp_dir = TempDir::new().unwrap();
    let root = util::generate_ca_cert("Pfx Password Root");
    let path = temp_dir.path().join("bundle.p12");
    Pfx::new(root.cert.clone(), Some(&root.key))
        .unwrap()
        .save_to_file(&path, "right")
        .unwrap();

    let err = load_pfx_from_file(&path, "wrong").unwrap_err();
    assert!(err.has_code(ErrorCode::BadPassword));
}

#[test]
fn test_save_without_key_fails() {
    let temp_dir = TempDir::new().unwrap();
    let root = util::generate_ca_cert("Pfx Keyless Root");
    let path = temp_dir.path().join("bundle.p12");

    let pfx = Pfx::new(root.cert.clone(), None).unwrap();
    assert!(!pfx.has_key());
    assert!(pfx.key_pair().unwrap().is_none());
    let err = pfx.save_to_file(&path, "pw").unwrap_err();
    assert!(err.has_code(ErrorCode::MissingKey));
    assert!(!path.exists());
}

#[test]
fn test_save_cert_to_file_writes_pem() {
    let temp_dir = TempDir::new().unwrap();
    let root = util::generate_ca_cert("Pfx Pem Root");
    let path = temp_dir.path().join("out/root.pem");

    Pfx::new(root.cert.clone(), None)
        .unwrap()
        .save_cert_to_file(&path)
        .unwrap();
    let pem = fs::read_to_string(&path).unwrap();
    assert_eq!(Certificate::from_pem(&pem).unwrap(), root.cert);
}

#[test]
fn test_missing_file() {
    let err = load_pfx_from_file("/nonexistent/trustkit/bundle.p12", "pw").unwrap_err();
    assert!(err.has_code(ErrorCode::FileRead));
}
