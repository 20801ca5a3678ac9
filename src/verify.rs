//! Certificate path building and validation against a trust set.
//!
//! Paths are built breadth-first from the target towards the trust set, so the
//! first anchors reached give the shortest chains. Among those, the first one
//! that passes validation wins. Chains are reported leaf
//! first: index 0 is the verified certificate, the last entry is the anchor.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use crate::cert::{Certificate, Fingerprint};
use crate::error::{Error, ErrorCode};
use crate::key::PublicKey;
use crate::store::TrustSet;

/// Maximum number of certificates in a chain, target and anchor included.
pub const MAX_CHAIN_DEPTH: usize = 16;

const MIN_RSA_BITS: usize = 2048;

/// Outcome of a chain verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum VerifyStatus {
    /// A path to a trust anchor was found and every check passed.
    Trusted = 0,
    /// No path to a trust anchor could be built.
    UntrustedNoPath = 1,
    /// A path was found but at least one check failed.
    UntrustedValidationFailed = 2,
}

impl VerifyStatus {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Result of verifying one certificate.
#[derive(Debug, Clone)]
pub struct Verification {
    pub status: VerifyStatus,
    /// Leaf first, anchor last. Empty when no path was found.
    pub chain: Vec<Arc<Certificate>>,
    pub errors: Vec<Error>,
    pub warnings: Vec<Error>,
}

impl Verification {
    pub fn is_trusted(&self) -> bool {
        self.status == VerifyStatus::Trusted
    }

    /// The anchor the chain ends at, if a path was found.
    pub fn anchor(&self) -> Option<&Arc<Certificate>> {
        self.chain.last()
    }
}

/// Tunables that affect warnings but never trust decisions.
#[derive(Debug, Clone, Copy)]
pub struct VerifyPolicy {
    pub anchor_expiry_warning: time::Duration,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            anchor_expiry_warning: time::Duration::days(30),
        }
    }
}

/// An immutable view of a store's trust set.
///
/// Registrations made after the snapshot was taken are not visible to it.
#[derive(Clone)]
pub struct TrustSnapshot {
    trust: Arc<TrustSet>,
    policy: VerifyPolicy,
}

impl TrustSnapshot {
    pub(crate) fn new(trust: Arc<TrustSet>, policy: VerifyPolicy) -> Self {
        Self { trust, policy }
    }

    pub fn verify(&self, cert: &Certificate) -> Verification {
        self.verify_at(cert, &[], OffsetDateTime::now_utc())
    }

    pub fn verify_with_intermediates(
        &self,
        cert: &Certificate,
        intermediates: &[Certificate],
    ) -> Verification {
        self.verify_at(cert, intermediates, OffsetDateTime::now_utc())
    }

    /// Verifies `cert` as of `at`, with extra untrusted `intermediates`
    /// available for path building.
    pub fn verify_at(
        &self,
        cert: &Certificate,
        intermediates: &[Certificate],
        at: OffsetDateTime,
    ) -> Verification {
        verify_chain(&self.trust, cert, intermediates, at, &self.policy)
    }

    pub fn len(&self) -> usize {
        self.trust.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trust.is_empty()
    }

    pub fn contains(&self, cert: &Certificate) -> bool {
        self.trust.contains_key(&cert.fingerprint())
    }

    /// Trust anchors in fingerprint order.
    pub fn certificates(&self) -> impl Iterator<Item = &Arc<Certificate>> {
        self.trust.values()
    }
}

impl std::fmt::Debug for TrustSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustSnapshot")
            .field("anchors", &self.trust.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Validity-window diagnostics for `cert` at `at`. Both bounds are inclusive.
pub(crate) fn validity_errors(cert: &Certificate, at: OffsetDateTime) -> Vec<Error> {
    let mut errors = Vec::new();
    if at < cert.not_before() {
        errors.push(Error::coded(
            ErrorCode::NotYetValid,
            format!(
                "'{}' is not valid before {}",
                cert.subject(),
                cert.not_before()
            ),
        ));
    }
    if at > cert.not_after() {
        errors.push(Error::coded(
            ErrorCode::Expired,
            format!("'{}' expired at {}", cert.subject(), cert.not_after()),
        ));
    }
    errors
}

struct Candidate {
    cert: Arc<Certificate>,
    trusted: bool,
}

pub(crate) fn verify_chain(
    trust: &TrustSet,
    target: &Certificate,
    intermediates: &[Certificate],
    at: OffsetDateTime,
    policy: &VerifyPolicy,
) -> Verification {
    if let Some(anchor) = trust.get(&target.fingerprint()) {
        let chain = vec![Arc::clone(anchor)];
        return finish(validate(&chain, at, policy), chain, target);
    }

    let mut pool: BTreeMap<Fingerprint, Candidate> = intermediates
        .iter()
        .map(|cert| {
            (
                cert.fingerprint(),
                Candidate {
                    cert: Arc::new(cert.clone()),
                    trusted: false,
                },
            )
        })
        .collect();
    for (fingerprint, anchor) in trust {
        pool.insert(
            *fingerprint,
            Candidate {
                cert: Arc::clone(anchor),
                trusted: true,
            },
        );
    }

    let (untrusted_root, depth_exhausted) = match build_path(target, &pool, at) {
        PathSearch::Found { first, alternatives } => {
            return select_chain(first, alternatives, target, at, policy);
        }
        PathSearch::NotFound {
            untrusted_root,
            depth_exhausted,
        } => (untrusted_root, depth_exhausted),
    };

    let mut warnings = Vec::new();
    match untrusted_root {
        Some(root) => warnings.push(Error::coded(
            ErrorCode::UntrustedRoot,
            format!(
                "'{}' chains to '{}', which is not a trusted root",
                target.subject(),
                root.subject()
            ),
        )),
        None => warnings.push(Error::coded(
            ErrorCode::IssuerNotFound,
            format!("no trusted issuer found for '{}'", target.subject()),
        )),
    }
    if depth_exhausted {
        warnings.push(Error::coded(
            ErrorCode::ChainTooLong,
            format!("path building stopped at {MAX_CHAIN_DEPTH} certificates"),
        ));
    }
    debug!(subject = target.subject(), "no path to a trust anchor");
    Verification {
        status: VerifyStatus::UntrustedNoPath,
        chain: Vec::new(),
        errors: validity_errors(target, at),
        warnings,
    }
}

enum PathSearch {
    /// Every shortest path that reached an anchor, best ranked first.
    Found {
        first: Vec<Arc<Certificate>>,
        alternatives: Vec<Vec<Arc<Certificate>>>,
    },
    NotFound {
        untrusted_root: Option<Arc<Certificate>>,
        depth_exhausted: bool,
    },
}

/// Breadth-first search, one chain length at a time. Stops at the first
/// length that reaches the trust set and returns all paths of that length.
fn build_path(
    target: &Certificate,
    pool: &BTreeMap<Fingerprint, Candidate>,
    at: OffsetDateTime,
) -> PathSearch {
    let target = Arc::new(target.clone());
    let mut untrusted_root = target.is_self_signed().then(|| Arc::clone(&target));
    let mut depth_exhausted = false;

    let mut visited = BTreeSet::from([target.fingerprint()]);
    let mut frontier = vec![vec![target]];

    while !frontier.is_empty() {
        let mut found = Vec::new();
        let mut next_frontier = Vec::new();

        for path in frontier {
            let Some(child) = path.last() else {
                continue;
            };

            // Good signature first, then currently valid, then fingerprint.
            // Pool iteration is in fingerprint order and the sort is stable.
            let mut candidates: Vec<((bool, bool), &Candidate)> = pool
                .iter()
                .filter(|(fingerprint, candidate)| {
                    !visited.contains(*fingerprint) && child.names_issuer(&candidate.cert)
                })
                .map(|(_, candidate)| {
                    let rank = (
                        child.verify_signed_by(&candidate.cert).is_err(),
                        !validity_errors(&candidate.cert, at).is_empty(),
                    );
                    (rank, candidate)
                })
                .collect();
            candidates.sort_by_key(|(rank, _)| *rank);

            for (_, candidate) in candidates {
                let mut next = path.clone();
                next.push(Arc::clone(&candidate.cert));
                if candidate.trusted {
                    found.push(next);
                    continue;
                }
                if next.len() >= MAX_CHAIN_DEPTH {
                    depth_exhausted = true;
                    continue;
                }
                visited.insert(candidate.cert.fingerprint());
                if candidate.cert.is_self_signed() && untrusted_root.is_none() {
                    untrusted_root = Some(Arc::clone(&candidate.cert));
                }
                next_frontier.push(next);
            }
        }

        let mut found = found.into_iter();
        if let Some(first) = found.next() {
            return PathSearch::Found {
                first,
                alternatives: found.collect(),
            };
        }
        frontier = next_frontier;
    }

    PathSearch::NotFound {
        untrusted_root,
        depth_exhausted,
    }
}

/// Validates `first`; when it fails, settles on the first alternative of the
/// same length that passes every check.
fn select_chain(
    first: Vec<Arc<Certificate>>,
    alternatives: Vec<Vec<Arc<Certificate>>>,
    target: &Certificate,
    at: OffsetDateTime,
    policy: &VerifyPolicy,
) -> Verification {
    let checked = validate(&first, at, policy);
    if !checked.0.is_empty() {
        for chain in alternatives {
            let other = validate(&chain, at, policy);
            if other.0.is_empty() {
                return finish(other, chain, target);
            }
        }
    }
    finish(checked, first, target)
}

/// Runs every check over a resolved chain. Returns `(errors, warnings)`.
fn validate(
    chain: &[Arc<Certificate>],
    at: OffsetDateTime,
    policy: &VerifyPolicy,
) -> (Vec<Error>, Vec<Error>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (i, cert) in chain.iter().enumerate() {
        errors.extend(validity_errors(cert, at));

        if i > 0 {
            if !cert.is_ca() {
                errors.push(Error::coded(
                    ErrorCode::NotCa,
                    format!("issuer '{}' is not a CA", cert.subject()),
                ));
            }
            if !cert.may_sign_certificates() {
                errors.push(Error::coded(
                    ErrorCode::KeyUsageViolation,
                    format!("key usage of '{}' does not allow keyCertSign", cert.subject()),
                ));
            }
            if let Some(max) = cert.path_len_constraint() {
                let below = chain[1..i].iter().filter(|c| !c.is_self_issued()).count();
                if below > max as usize {
                    errors.push(Error::coded(
                        ErrorCode::PathLenExceeded,
                        format!(
                            "'{}' allows {max} intermediate(s) below it, found {below}",
                            cert.subject()
                        ),
                    ));
                }
            }
        }

        // The anchor's self-signature is not checked; it is trusted by membership.
        if let Some(issuer) = chain.get(i + 1) {
            if let Err(e) = cert.verify_signed_by(issuer) {
                errors.push(e);
            }
            if cert.signature_algorithm().is_ok_and(|alg| alg.is_weak()) {
                warnings.push(Error::coded(
                    ErrorCode::WeakSignatureAlgorithm,
                    format!("'{}' is signed with SHA-1", cert.subject()),
                ));
            }
        }

        if let Ok(key @ PublicKey::Rsa(_)) = cert.public_key() {
            let bits = key.bits();
            if bits < MIN_RSA_BITS {
                warnings.push(Error::coded(
                    ErrorCode::WeakKey,
                    format!("'{}' has a {bits}-bit RSA key", cert.subject()),
                ));
            }
        }
    }

    if let Some(anchor) = chain.last() {
        let remaining = anchor.not_after() - at;
        if remaining >= time::Duration::ZERO && remaining <= policy.anchor_expiry_warning {
            warnings.push(Error::coded(
                ErrorCode::AnchorNearExpiry,
                format!(
                    "trust anchor '{}' expires at {}",
                    anchor.subject(),
                    anchor.not_after()
                ),
            ));
        }
    }

    (errors, warnings)
}

fn finish(
    (errors, warnings): (Vec<Error>, Vec<Error>),
    chain: Vec<Arc<Certificate>>,
    target: &Certificate,
) -> Verification {
    let status = if errors.is_empty() {
        VerifyStatus::Trusted
    } else {
        VerifyStatus::UntrustedValidationFailed
    };
    debug!(
        subject = target.subject(),
        ?status,
        chain_len = chain.len(),
        errors = errors.len(),
        warnings = warnings.len(),
        "verified certificate"
    );
    Verification {
        status,
        chain,
        errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use der::Encode;
    use der::asn1::BitString;
    use rsa::signature::{SignatureEncoding, Signer};

    use super::*;
    use crate::cert::extensions::{BasicConstraints, KeyUsage, KeyUsages};
    use crate::cert::params::{ExtensionParam, Validity};
    use crate::cert::{CertificateWithPrivateKey, SignatureAlgorithm};
    use crate::key::KeyPair;
    use crate::tbs_certificate::TbsCertificate;
    use crate::testutil;

    fn trust_of(certs: &[&Certificate]) -> TrustSet {
        certs
            .iter()
            .map(|c| (c.fingerprint(), Arc::new((*c).clone())))
            .collect()
    }

    fn codes(errors: &[Error]) -> Vec<ErrorCode> {
        errors.iter().filter_map(Error::code).collect()
    }

    #[test]
    fn test_direct_trust() {
        let root = testutil::root("Direct Root");
        let trust = trust_of(&[&root.cert]);
        let result = verify_chain(
            &trust,
            &root.cert,
            &[],
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
        );
        assert!(result.is_trusted());
        assert_eq!(result.chain.len(), 1);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_path_len_exceeded() {
        let root = testutil::root("PathLen Root");
        let constrained = testutil::issue_ca(&root, "Constrained CA", Some(0));
        let sub = testutil::intermediate(&constrained, "Sub CA");
        let leaf = testutil::leaf(&sub, "leaf.example");

        let trust = trust_of(&[&root.cert]);
        let result = verify_chain(
            &trust,
            &leaf,
            &[constrained.cert.clone(), sub.cert.clone()],
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
        );
        assert_eq!(result.status, VerifyStatus::UntrustedValidationFailed);
        assert_eq!(result.chain.len(), 4);
        assert_eq!(codes(&result.errors), vec![ErrorCode::PathLenExceeded]);
    }

    #[test]
    fn test_anchor_near_expiry_warning() {
        let now = OffsetDateTime::now_utc();
        let root = testutil::root_with(
            "Expiring Root",
            Validity::between(now - time::Duration::days(1), now + time::Duration::days(10)),
        );
        let leaf = testutil::leaf(&root, "leaf.example");
        let trust = trust_of(&[&root.cert]);

        let result = verify_chain(
            &trust,
            &leaf,
            &[],
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
        );
        assert!(result.is_trusted());
        assert_eq!(codes(&result.warnings), vec![ErrorCode::AnchorNearExpiry]);
    }

    #[test]
    fn test_untrusted_self_signed_root_is_named() {
        let root = testutil::root("Unknown Root");
        let leaf = testutil::leaf(&root, "leaf.example");
        let other = testutil::root("Other Root");
        let trust = trust_of(&[&other.cert]);

        let result = verify_chain(
            &trust,
            &leaf,
            &[root.cert.clone()],
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
        );
        assert_eq!(result.status, VerifyStatus::UntrustedNoPath);
        assert!(result.chain.is_empty());
        assert_eq!(codes(&result.warnings), vec![ErrorCode::UntrustedRoot]);
    }

    #[test]
    fn test_chain_too_long() {
        let root = testutil::root("Deep Root");
        let mut intermediates: Vec<CertificateWithPrivateKey> = Vec::new();
        for depth in 0..MAX_CHAIN_DEPTH {
            let next = match intermediates.last() {
                Some(parent) => testutil::intermediate(parent, &format!("Deep CA {depth}")),
                None => testutil::intermediate(&root, &format!("Deep CA {depth}")),
            };
            intermediates.push(next);
        }
        let leaf = testutil::leaf(intermediates.last().unwrap(), "deep.example");
        let pool: Vec<Certificate> = intermediates.iter().map(|i| i.cert.clone()).collect();

        let result = verify_chain(
            &trust_of(&[&root.cert]),
            &leaf,
            &pool,
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
        );
        assert_eq!(result.status, VerifyStatus::UntrustedNoPath);
        assert!(codes(&result.warnings).contains(&ErrorCode::ChainTooLong));

        // One intermediate fewer fits exactly.
        let result = verify_chain(
            &trust_of(&[&root.cert]),
            &intermediates[MAX_CHAIN_DEPTH - 2].cert,
            &pool,
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
        );
        assert!(result.is_trusted(), "{:?}", result.errors);
        assert_eq!(result.chain.len(), MAX_CHAIN_DEPTH);
    }

    #[test]
    fn test_same_length_path_that_validates_wins() {
        let key = KeyPair::generate_ecdsa_p256();
        let validity = Validity::for_days(365);
        let ca = Certificate::new_self_signed(
            &testutil::request("Shared Root", &key, true),
            &key,
            validity,
        )
        .unwrap();
        let not_ca = Certificate::new_self_signed(
            &testutil::request("Shared Root", &key, false),
            &key,
            validity,
        )
        .unwrap();
        let issuer = CertificateWithPrivateKey {
            cert: ca.clone(),
            key,
        };
        let leaf = testutil::leaf(&issuer, "shared.example");

        // Both anchors match the leaf by name, key identifier and signature,
        // so only validation tells them apart.
        let result = verify_chain(
            &trust_of(&[&ca, &not_ca]),
            &leaf,
            &[],
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
        );
        assert!(result.is_trusted(), "{:?}", result.errors);
        assert_eq!(*result.chain[1], ca);
    }

    /// Signs `tbs` with `sign` and decodes the result.
    fn assemble(tbs: &TbsCertificate, sign: impl FnOnce(&[u8]) -> Vec<u8>) -> Certificate {
        let inner = tbs.to_tbs_certificate_inner().unwrap();
        let signature = sign(&inner.to_der().unwrap());
        let cert = x509_cert::Certificate {
            tbs_certificate: inner,
            signature_algorithm: tbs.signature_algorithm.into(),
            signature: BitString::from_bytes(&signature).unwrap(),
        };
        Certificate::from_der(&cert.to_der().unwrap()).unwrap()
    }

    fn tbs_for(
        subject: &str,
        issuer: &str,
        key: &KeyPair,
        signature_algorithm: SignatureAlgorithm,
        extensions: Vec<ExtensionParam>,
    ) -> TbsCertificate {
        let validity = Validity::for_days(30);
        TbsCertificate {
            serial_number: vec![0x01, 0x5a],
            signature_algorithm,
            issuer: testutil::dn(issuer).as_x509_name().unwrap(),
            not_before: validity.not_before,
            not_after: validity.not_after,
            subject: testutil::dn(subject).as_x509_name().unwrap(),
            subject_public_key: key.public_key(),
            extensions,
        }
    }

    #[test]
    fn test_sha1_link_and_small_rsa_key_warn() {
        let root_key = KeyPair::generate_rsa(1024).unwrap();
        let root = Certificate::new_self_signed(
            &testutil::request("Legacy Root", &root_key, true),
            &root_key,
            Validity::for_days(365),
        )
        .unwrap();
        let KeyPair::Rsa { private, .. } = &root_key else {
            unreachable!()
        };

        let leaf_key = KeyPair::generate_ecdsa_p256();
        let tbs = tbs_for(
            "legacy.example",
            "Legacy Root",
            &leaf_key,
            SignatureAlgorithm::Sha1WithRSA,
            Vec::new(),
        );
        let leaf = assemble(&tbs, |data| {
            rsa::pkcs1v15::SigningKey::<sha1::Sha1>::new((**private).clone())
                .sign(data)
                .to_vec()
        });
        assert_eq!(leaf.signature_algorithm().unwrap(), SignatureAlgorithm::Sha1WithRSA);

        let result = verify_chain(
            &trust_of(&[&root]),
            &leaf,
            &[],
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
        );
        assert!(result.is_trusted(), "{:?}", result.errors);
        let warnings = codes(&result.warnings);
        assert!(warnings.contains(&ErrorCode::WeakSignatureAlgorithm));
        assert!(warnings.contains(&ErrorCode::WeakKey));
    }

    #[test]
    fn test_ca_without_key_cert_sign() {
        let root = testutil::root("Usage Root");
        let ca_key = KeyPair::generate_ecdsa_p256();
        let tbs = tbs_for(
            "Signing Only CA",
            "Usage Root",
            &ca_key,
            root.key.signature_algorithm(),
            vec![
                ExtensionParam::from_extension(
                    BasicConstraints {
                        is_ca: true,
                        max_path_length: None,
                    },
                    true,
                )
                .unwrap(),
                ExtensionParam::from_extension(KeyUsage(KeyUsages::DigitalSignature.into()), true)
                    .unwrap(),
            ],
        );
        let ca = assemble(&tbs, |data| root.key.sign_data(data).unwrap());
        assert!(ca.is_ca());
        assert!(!ca.may_sign_certificates());

        let issuer = CertificateWithPrivateKey {
            cert: ca.clone(),
            key: ca_key,
        };
        let leaf = testutil::leaf(&issuer, "usage.example");
        let result = verify_chain(
            &trust_of(&[&root.cert]),
            &leaf,
            &[ca],
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
        );
        assert_eq!(result.status, VerifyStatus::UntrustedValidationFailed);
        assert_eq!(codes(&result.errors), vec![ErrorCode::KeyUsageViolation]);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(VerifyStatus::Trusted.code(), 0);
        assert_eq!(VerifyStatus::UntrustedNoPath.code(), 1);
        assert_eq!(VerifyStatus::UntrustedValidationFailed.code(), 2);
    }
}
