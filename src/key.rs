//! Public keys for signature verification and key pairs for signing.

use std::fmt;

use const_oid::db::{rfc5912, rfc8410};
use const_oid::{AssociatedOid, ObjectIdentifier};
use ecdsa::signature::hazmat::PrehashVerifier;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::VerifyingKey as Ed25519VerifyingKey;
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use zeroize::Zeroizing;

use crate::cert::SignatureAlgorithm;
use crate::error::{Error, ErrorCode, Result};

/// A public key extracted from a certificate.
#[derive(Clone, Debug)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
    Ed25519(Ed25519VerifyingKey),
}

impl PublicKey {
    /// Derives the public half of `key_pair`.
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        key_pair.public_key()
    }

    /// Decodes a `SubjectPublicKeyInfo`.
    ///
    /// Fails with [`ErrorCode::UnsupportedAlgorithm`] for key types outside
    /// RSA, ECDSA P-256/P-384 and Ed25519.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let key_bytes = spki.subject_public_key.raw_bytes();
        match spki.algorithm.oid {
            rfc5912::RSA_ENCRYPTION => Ok(PublicKey::Rsa(
                RsaPublicKey::from_pkcs1_der(key_bytes)
                    .map_err(|e| invalid_key(format!("RSA public key: {e}")))?,
            )),
            rfc5912::ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .and_then(|params| params.decode_as::<ObjectIdentifier>().ok());
                match curve {
                    Some(rfc5912::SECP_256_R_1) => Ok(PublicKey::EcdsaP256(
                        P256VerifyingKey::from_sec1_bytes(key_bytes)
                            .map_err(|e| invalid_key(format!("P-256 public key: {e}")))?,
                    )),
                    Some(rfc5912::SECP_384_R_1) => Ok(PublicKey::EcdsaP384(
                        P384VerifyingKey::from_sec1_bytes(key_bytes)
                            .map_err(|e| invalid_key(format!("P-384 public key: {e}")))?,
                    )),
                    Some(other) => Err(Error::coded(
                        ErrorCode::UnsupportedAlgorithm,
                        format!("unsupported elliptic curve {other}"),
                    )),
                    None => Err(invalid_key("EC public key without named curve")),
                }
            }
            rfc8410::ID_ED_25519 => {
                let bytes: [u8; 32] = key_bytes
                    .try_into()
                    .map_err(|_| invalid_key("Ed25519 public key must be 32 bytes"))?;
                Ok(PublicKey::Ed25519(
                    Ed25519VerifyingKey::from_bytes(&bytes)
                        .map_err(|e| invalid_key(format!("Ed25519 public key: {e}")))?,
                ))
            }
            other => Err(Error::coded(
                ErrorCode::UnsupportedAlgorithm,
                format!("unsupported public key algorithm {other}"),
            )),
        }
    }

    /// Encodes the key as a `SubjectPublicKeyInfo`.
    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        match self {
            PublicKey::Rsa(public) => Ok(SubjectPublicKeyInfoOwned::from_key(public.clone())?),
            PublicKey::EcdsaP256(verifying_key) => {
                Ok(SubjectPublicKeyInfoOwned::from_key(*verifying_key)?)
            }
            PublicKey::EcdsaP384(verifying_key) => {
                Ok(SubjectPublicKeyInfoOwned::from_key(*verifying_key)?)
            }
            PublicKey::Ed25519(verifying_key) => Ok(SubjectPublicKeyInfoOwned {
                algorithm: AlgorithmIdentifierOwned {
                    oid: rfc8410::ID_ED_25519,
                    parameters: None,
                },
                subject_public_key: der::asn1::BitString::from_bytes(verifying_key.as_bytes())?,
            }),
        }
    }

    /// Size of the key in bits, as used for strength advisories.
    pub fn bits(&self) -> usize {
        match self {
            PublicKey::Rsa(public) => public.size() * 8,
            PublicKey::EcdsaP256(_) => 256,
            PublicKey::EcdsaP384(_) => 384,
            PublicKey::Ed25519(_) => 256,
        }
    }

    /// Verifies `signature` over `message` under `algorithm`.
    ///
    /// Fails with [`ErrorCode::UnsupportedAlgorithm`] when the algorithm is
    /// unknown or does not fit the key type, and with
    /// [`ErrorCode::BadSignature`] when verification fails.
    pub fn verify(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let algorithm = SignatureAlgorithm::from_oid(algorithm.oid)?;
        match (self, &algorithm) {
            (PublicKey::Rsa(key), SignatureAlgorithm::Sha1WithRSA) => {
                verify_rsa::<Sha1>(key, message, signature)
            }
            (PublicKey::Rsa(key), SignatureAlgorithm::Sha256WithRSA) => {
                verify_rsa::<Sha256>(key, message, signature)
            }
            (PublicKey::Rsa(key), SignatureAlgorithm::Sha384WithRSA) => {
                verify_rsa::<Sha384>(key, message, signature)
            }
            (PublicKey::Rsa(key), SignatureAlgorithm::Sha512WithRSA) => {
                verify_rsa::<Sha512>(key, message, signature)
            }
            (PublicKey::EcdsaP256(key), alg) if alg.is_ecdsa() => {
                let sig = p256::ecdsa::Signature::from_der(signature).map_err(bad_signature)?;
                key.verify_prehash(&alg.prehash(message), &sig)
                    .map_err(bad_signature)
            }
            (PublicKey::EcdsaP384(key), alg) if alg.is_ecdsa() => {
                let sig = p384::ecdsa::Signature::from_der(signature).map_err(bad_signature)?;
                key.verify_prehash(&alg.prehash(message), &sig)
                    .map_err(bad_signature)
            }
            (PublicKey::Ed25519(key), SignatureAlgorithm::Ed25519) => {
                let sig =
                    ed25519_dalek::Signature::from_slice(signature).map_err(bad_signature)?;
                key.verify(message, &sig).map_err(bad_signature)
            }
            (key, alg) => Err(Error::coded(
                ErrorCode::UnsupportedAlgorithm,
                format!("{alg:?} cannot be verified with a {} key", key.kind()),
            )),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PublicKey::Rsa(_) => "RSA",
            PublicKey::EcdsaP256(_) => "P-256",
            PublicKey::EcdsaP384(_) => "P-384",
            PublicKey::Ed25519(_) => "Ed25519",
        }
    }
}

fn verify_rsa<D>(key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> Result<()>
where
    D: Digest + AssociatedOid,
{
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<D>::new(key.clone());
    let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(bad_signature)?;
    verifying_key.verify(message, &sig).map_err(bad_signature)
}

fn bad_signature(err: impl fmt::Display) -> Error {
    Error::coded(
        ErrorCode::BadSignature,
        format!("signature verification failed: {err}"),
    )
}

fn invalid_key(message: impl Into<String>) -> Error {
    Error::coded(ErrorCode::InvalidKey, message)
}

/// Supported key types for signing.
#[derive(Clone)]
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
    EcdsaP384 {
        signing_key: P384SigningKey,
        verifying_key: P384VerifyingKey,
    },
    Ed25519 {
        signing_key: Ed25519SigningKey,
    },
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.signature_algorithm())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair::Rsa {
            private: Box::new(private),
            public,
        })
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let signing_key = P256SigningKey::random(&mut rand_core::OsRng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an ECDSA P-384 key pair.
    pub fn generate_ecdsa_p384() -> Self {
        let signing_key = P384SigningKey::random(&mut rand_core::OsRng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP384 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an Ed25519 key pair.
    pub fn generate_ed25519() -> Self {
        let signing_key = Ed25519SigningKey::generate(&mut rand_core::OsRng);
        KeyPair::Ed25519 { signing_key }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
            KeyPair::EcdsaP384 { verifying_key, .. } => PublicKey::EcdsaP384(*verifying_key),
            KeyPair::Ed25519 { signing_key } => PublicKey::Ed25519(signing_key.verifying_key()),
        }
    }

    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        self.public_key().to_spki()
    }

    /// The algorithm used by [`KeyPair::sign_data`].
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyPair::Rsa { .. } => SignatureAlgorithm::Sha256WithRSA,
            KeyPair::EcdsaP256 { .. } => SignatureAlgorithm::Sha256WithECDSA,
            KeyPair::EcdsaP384 { .. } => SignatureAlgorithm::Sha384WithECDSA,
            KeyPair::Ed25519 { .. } => SignatureAlgorithm::Ed25519,
        }
    }

    /// Signs `data`, returning the signature in its X.509 encoding
    /// (DER `Ecdsa-Sig-Value` for ECDSA).
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyPair::Rsa { private, .. } => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new((**private).clone());
                Ok(signing_key.sign(data).to_vec())
            }
            KeyPair::EcdsaP256 { signing_key, .. } => {
                let signature: p256::ecdsa::Signature = signing_key.sign(data);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384 { signing_key, .. } => {
                let signature: p384::ecdsa::Signature = signing_key.sign(data);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::Ed25519 { signing_key } => Ok(signing_key.sign(data).to_bytes().to_vec()),
        }
    }

    /// Exports the private key as PKCS#8 DER.
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let document = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der()?,
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_der()?,
            KeyPair::EcdsaP384 { signing_key, .. } => signing_key.to_pkcs8_der()?,
            KeyPair::Ed25519 { signing_key } => signing_key.to_pkcs8_der()?,
        };
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// Imports a PKCS#8 DER private key of any supported type.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        if let Ok(private) = RsaPrivateKey::from_pkcs8_der(der) {
            let public = RsaPublicKey::from(&private);
            return Ok(KeyPair::Rsa {
                private: Box::new(private),
                public,
            });
        }
        if let Ok(signing_key) = P256SigningKey::from_pkcs8_der(der) {
            let verifying_key = *signing_key.verifying_key();
            return Ok(KeyPair::EcdsaP256 {
                signing_key,
                verifying_key,
            });
        }
        if let Ok(signing_key) = P384SigningKey::from_pkcs8_der(der) {
            let verifying_key = *signing_key.verifying_key();
            return Ok(KeyPair::EcdsaP384 {
                signing_key,
                verifying_key,
            });
        }
        if let Ok(signing_key) = Ed25519SigningKey::from_pkcs8_der(der) {
            return Ok(KeyPair::Ed25519 { signing_key });
        }
        Err(invalid_key("unsupported or malformed PKCS#8 private key"))
    }
}
