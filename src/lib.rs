//! # Trustkit - A Pure Rust Trust-Anchor Store and Chain Verifier
//!
//! Trustkit keeps a set of trusted CA certificates and decides whether other
//! certificates chain to them. It is built entirely with rustcrypto libraries,
//! without ring or OpenSSL (except for testing).
//!
//! ## Supported Algorithms
//!
//! - **RSA**: PKCS#1 v1.5 with SHA-256, SHA-384 and SHA-512 (SHA-1 accepted
//!   with a warning)
//! - **ECDSA**: P-256 and P-384 curves
//! - **Ed25519**: Edwards curve digital signature algorithm
//!
//! ## Supported Formats
//!
//! - **DER**: a single certificate or several concatenated
//! - **PEM**: any number of `CERTIFICATE` blocks, with text in between
//! - **PKCS#12**: certificate plus private key, password protected
//!
//! ## Quick Start
//!
//! ### Building a Store and Verifying a Certificate
//!
//! ```rust,no_run
//! use trustkit::{loader, store::CaStore};
//!
//! # fn main() -> Result<(), trustkit::error::Error> {
//! let store = CaStore::new();
//! let report = store.add_all_cas_from_dir("/etc/ssl/certs")?;
//! println!("{} anchors added, {} problems", report.added, report.errors.len());
//!
//! let server = loader::load_certs_from_file("server-chain.pem");
//! if let Some((leaf, intermediates)) = server.certs.split_first() {
//!     let result = store.verify_with_intermediates(leaf, intermediates);
//!     if result.is_trusted() {
//!         for cert in &result.chain {
//!             println!("  {}", cert.subject());
//!         }
//!     } else {
//!         for error in &result.errors {
//!             println!("error: {error} ({:?})", error.code_str());
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Downloading the Public CA Bundle
//!
//! ```rust,no_run
//! use trustkit::store::{CaStore, StoreConfig};
//!
//! # fn main() -> Result<(), trustkit::error::Error> {
//! let store = CaStore::with_config(
//!     StoreConfig::builder()
//!         .auto_download(true)
//!         .cache_path("/var/cache/myapp/ca-bundle.pem")
//!         .build(),
//! );
//!
//! // Use the cached bundle when the network is unavailable.
//! match store.download_all() {
//!     Ok(report) => println!("{} roots fetched", report.fetched),
//!     Err(_) => {
//!         store.load_cache()?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Issuing a Test Hierarchy
//!
//! ```rust,no_run
//! use trustkit::{
//!     cert::{Certificate, CertificateWithPrivateKey, params::{CertificationRequestInfo, DistinguishedName, Validity}},
//!     issuer::Issuer,
//!     key::{KeyPair, PublicKey},
//!     store::CaStore,
//! };
//!
//! # fn main() -> Result<(), trustkit::error::Error> {
//! let ca_key = KeyPair::generate_ecdsa_p256();
//! let ca_info = CertificationRequestInfo::builder()
//!     .subject(DistinguishedName::builder().common_name("Test CA").build())
//!     .subject_public_key(PublicKey::from_key_pair(&ca_key))
//!     .is_ca(true)
//!     .build();
//! let ca = CertificateWithPrivateKey {
//!     cert: Certificate::new_self_signed(&ca_info, &ca_key, Validity::for_days(30))?,
//!     key: ca_key,
//! };
//!
//! let server_key = KeyPair::generate_ecdsa_p256();
//! let server_info = CertificationRequestInfo::builder()
//!     .subject(DistinguishedName::builder().common_name("server.test").build())
//!     .subject_public_key(PublicKey::from_key_pair(&server_key))
//!     .build();
//! let server = ca.issue(&server_info, Validity::for_days(7))?;
//!
//! let store = CaStore::new();
//! store.add_testing_root_ca(&ca.cert).map_err(|mut errors| errors.remove(0))?;
//! assert!(store.verify(&server).is_trusted());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every failure callers branch on carries a stable [`error::ErrorCode`]:
//!
//! ```rust
//! use trustkit::{cert::Certificate, error::ErrorCode};
//!
//! match Certificate::from_der(b"not a certificate") {
//!     Ok(_) => unreachable!(),
//!     Err(e) if e.has_code(ErrorCode::ParseCert) => println!("malformed: {e}"),
//!     Err(e) => println!("other error: {e}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`store`]: The CA store, bulk loading and bundle download
//! - [`verify`]: Path building and chain validation
//! - [`cert`]: Parsed certificates and their derived metadata
//! - [`loader`]: Decoding certificates from files and blobs
//! - [`pfx`]: PKCS#12 bundles
//! - [`key`]: Public keys, key pairs and signatures
//! - [`issuer`]: Certificate issuing, used for test hierarchies
//! - [`error`]: Error type and stable codes
//! - [`tbs_certificate`]: Low-level certificate structure

pub mod cert;
pub mod error;
mod fsutil;
pub mod issuer;
pub mod key;
pub mod loader;
pub mod pfx;
pub mod store;
pub mod tbs_certificate;
pub mod verify;

#[cfg(test)]
mod testutil;

pub use cert::{Certificate, Fingerprint};
pub use error::{Error, ErrorCode, Result};
pub use store::CaStore;
pub use verify::{Verification, VerifyStatus};
