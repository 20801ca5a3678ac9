//! PKCS#12 (PFX) bundles of a certificate and its private key.

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::debug;
use zeroize::Zeroizing;

use crate::cert::Certificate;
use crate::error::{Error, ErrorCode, Result};
use crate::fsutil::write_atomic;
use crate::key::{KeyPair, PublicKey};

/// PKCS#8 DER private key, wiped on drop.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<Vec<u8>>);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A certificate with an optional private key.
#[derive(Debug, Clone)]
pub struct Pfx {
    cert: Certificate,
    key: Option<SecretKey>,
}

impl Pfx {
    pub fn new(cert: Certificate, key: Option<&KeyPair>) -> Result<Self> {
        let key = key
            .map(|key| key.to_pkcs8_der().map(SecretKey))
            .transpose()?;
        Ok(Self { cert, key })
    }

    /// Decodes a PKCS#12 container protected by `password`.
    pub fn from_pkcs12_der(bytes: &[u8], password: &str) -> Result<Self> {
        let pfx = p12::PFX::parse(bytes).map_err(|e| {
            Error::coded(
                ErrorCode::DecodePkcs12,
                format!("malformed PKCS#12 container: {e:?}"),
            )
        })?;
        if !pfx.verify_mac(password) {
            return Err(Error::coded(
                ErrorCode::BadPassword,
                "PKCS#12 MAC verification failed; wrong password?",
            ));
        }

        let key = pfx
            .key_bags(password)
            .map_err(|e| {
                Error::coded(
                    ErrorCode::DecodePkcs12,
                    format!("cannot decrypt key bags: {e:?}"),
                )
            })?
            .into_iter()
            .next()
            .map(|der| SecretKey(Zeroizing::new(der)));

        let certs = pfx
            .cert_x509_bags(password)
            .map_err(|e| {
                Error::coded(
                    ErrorCode::DecodePkcs12,
                    format!("cannot decrypt certificate bags: {e:?}"),
                )
            })?
            .iter()
            .map(|der| Certificate::from_der(der))
            .collect::<Result<Vec<_>>>()?;
        let cert = certificate_for_key(certs, key.as_ref())?;

        debug!(subject = cert.subject(), has_key = key.is_some(), "decoded PKCS#12");
        Ok(Self { cert, key })
    }

    pub fn cert(&self) -> &Certificate {
        &self.cert
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Parses the private key, if present.
    pub fn key_pair(&self) -> Result<Option<KeyPair>> {
        self.key
            .as_ref()
            .map(|key| KeyPair::from_pkcs8_der(&key.0))
            .transpose()
    }

    /// Writes the certificate to `path` as PEM.
    pub fn save_cert_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let pem = self.cert.to_pem()?;
        write_atomic(path, pem.as_bytes()).map_err(|e| write_failed(path, e))
    }

    /// Writes certificate and key to `path` as a PKCS#12 container.
    pub fn save_to_file(&self, path: impl AsRef<Path>, password: &str) -> Result<()> {
        let path = path.as_ref();
        let key = self.key.as_ref().ok_or_else(|| {
            Error::coded(
                ErrorCode::MissingKey,
                "a private key is required to write a PKCS#12 container",
            )
        })?;
        let friendly_name = self
            .cert
            .subject_map()
            .get("CN")
            .cloned()
            .unwrap_or_default();
        let pfx = p12::PFX::new(self.cert.to_der(), &key.0, None, password, &friendly_name)
            .ok_or_else(|| {
                Error::coded(ErrorCode::EncodePkcs12, "cannot build PKCS#12 container")
            })?;
        let der = Zeroizing::new(pfx.to_der());
        write_atomic(path, &der).map_err(|e| write_failed(path, e))
    }
}

/// The certificate whose public key matches `key`, or the first one when the
/// container holds no key. CA certificates may precede the end-entity one.
fn certificate_for_key(certs: Vec<Certificate>, key: Option<&SecretKey>) -> Result<Certificate> {
    let no_certificate =
        || Error::coded(ErrorCode::DecodePkcs12, "PKCS#12 container has no certificate");
    let Some(key) = key else {
        return certs.into_iter().next().ok_or_else(no_certificate);
    };
    if certs.is_empty() {
        return Err(no_certificate());
    }

    let spki = KeyPair::from_pkcs8_der(&key.0)?.as_spki()?;
    certs
        .into_iter()
        .find(|cert| {
            cert.public_key()
                .and_then(PublicKey::to_spki)
                .is_ok_and(|candidate| candidate == spki)
        })
        .ok_or_else(|| {
            Error::coded(
                ErrorCode::DecodePkcs12,
                "no certificate in the PKCS#12 container matches its private key",
            )
        })
}

fn write_failed(path: &Path, e: std::io::Error) -> Error {
    Error::coded(
        ErrorCode::FileWrite,
        format!("cannot write {}: {e}", path.display()),
    )
}

/// Reads and decodes the PKCS#12 file at `path`.
pub fn load_pfx_from_file(path: impl AsRef<Path>, password: &str) -> Result<Pfx> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
        Error::coded(
            ErrorCode::FileRead,
            format!("cannot read {}: {e}", path.display()),
        )
    })?;
    Pfx::from_pkcs12_der(&bytes, password).map_err(|e| e.context(path.display()))
}
