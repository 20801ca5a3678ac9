//! The CA store: a set of trust anchors plus the operations that grow it.
//!
//! The trust set is published as an immutable `Arc` snapshot. Verifications
//! clone the `Arc` under a brief read lock and never block registrations for
//! longer than that. Mutations are serialized on a writer lock, build the new
//! set off to the side, and publish it with a single pointer swap.

pub mod config;
mod dir;
mod download;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use time::OffsetDateTime;
use tracing::warn;

use crate::cert::{Certificate, Fingerprint};
use crate::error::{Error, ErrorCode};
use crate::verify::{self, TrustSnapshot, Verification, VerifyPolicy, VerifyStatus};

pub use config::StoreConfig;
pub use dir::DirLoadReport;
pub use download::{DownloadReport, Fetcher, HttpFetcher};

pub(crate) type TrustSet = BTreeMap<Fingerprint, Arc<Certificate>>;

/// Emits a per-certificate event at `info` when the store's debug flag is
/// set and at `debug` otherwise.
macro_rules! item_event {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A store of trusted CA certificates.
///
/// All methods take `&self`; a store can be shared between threads behind an
/// `Arc`.
pub struct CaStore {
    config: RwLock<StoreConfig>,
    trust: RwLock<Arc<TrustSet>>,
    writer: Mutex<()>,
    fetcher: Arc<dyn Fetcher>,
}

impl Default for CaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaStore")
            .field("config", &*read(&self.config))
            .field("anchors", &self.len())
            .finish_non_exhaustive()
    }
}

impl CaStore {
    /// An empty store with the default configuration. Auto-download is off.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_auto_download(auto_download: bool) -> Self {
        Self::with_config(StoreConfig::builder().auto_download(auto_download).build())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config: RwLock::new(config),
            trust: RwLock::new(Arc::new(TrustSet::new())),
            writer: Mutex::new(()),
            fetcher: Arc::new(HttpFetcher),
        }
    }

    /// Replaces the network collaborator used by [`CaStore::download_all`].
    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> StoreConfig {
        read(&self.config).clone()
    }

    pub fn cache_path(&self) -> PathBuf {
        read(&self.config).cache_path.clone()
    }

    pub fn set_cache_path(&self, path: impl Into<PathBuf>) {
        write(&self.config).cache_path = path.into();
    }

    pub fn auto_download(&self) -> bool {
        read(&self.config).auto_download
    }

    pub fn set_auto_download(&self, auto_download: bool) {
        write(&self.config).auto_download = auto_download;
    }

    pub fn debug(&self) -> bool {
        read(&self.config).debug
    }

    pub fn set_debug(&self, debug: bool) {
        write(&self.config).debug = debug;
    }

    fn policy(&self) -> VerifyPolicy {
        VerifyPolicy {
            anchor_expiry_warning: read(&self.config).anchor_expiry_warning,
        }
    }

    fn current(&self) -> Arc<TrustSet> {
        Arc::clone(&read(&self.trust))
    }

    fn publish(&self, next: TrustSet) {
        *write(&self.trust) = Arc::new(next);
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `cert` as a trust anchor.
    ///
    /// The certificate must be a CA inside its validity window, and either
    /// self-signed or verifiable against the anchors already in the store.
    /// Adding a certificate that is already present succeeds without
    /// re-checking it.
    pub fn add_ca(&self, cert: &Certificate) -> Result<(), Vec<Error>> {
        let _writer = self.lock_writer();
        let current = self.current();
        if current.contains_key(&cert.fingerprint()) {
            return Ok(());
        }

        vet_anchor(cert, &current, OffsetDateTime::now_utc(), &self.policy()).map_err(
            |rejection| match rejection {
                Rejection::NoPath(e) => vec![e],
                Rejection::Invalid(errors) => errors,
            },
        )?;

        let mut next = (*current).clone();
        next.insert(cert.fingerprint(), Arc::new(cert.clone()));
        self.publish(next);
        item_event!(
            self.debug(),
            subject = cert.subject(),
            fingerprint = %cert.fingerprint(),
            "added trust anchor"
        );
        Ok(())
    }

    /// Adds a CA certificate without validity, signature or chain checks.
    ///
    /// Intended for test hierarchies. Hardened stores always refuse.
    pub fn add_testing_root_ca(&self, cert: &Certificate) -> Result<(), Vec<Error>> {
        if read(&self.config).hardened {
            return Err(vec![Error::coded(
                ErrorCode::TestingRootRejected,
                "testing roots are not accepted by a hardened store",
            )]);
        }
        if !cert.is_ca() {
            return Err(vec![not_ca(cert)]);
        }

        let _writer = self.lock_writer();
        let current = self.current();
        if !current.contains_key(&cert.fingerprint()) {
            let mut next = (*current).clone();
            next.insert(cert.fingerprint(), Arc::new(cert.clone()));
            self.publish(next);
        }
        warn!(
            subject = cert.subject(),
            fingerprint = %cert.fingerprint(),
            "registered testing root CA"
        );
        Ok(())
    }

    /// Registers `certs` in one batch under the writer lock.
    fn register(&self, certs: Vec<Certificate>) -> BatchOutcome {
        let _writer = self.lock_writer();
        let mut next = (*self.current()).clone();
        let outcome = register_batch(
            &mut next,
            certs,
            OffsetDateTime::now_utc(),
            &self.policy(),
            self.debug(),
        );
        if outcome.added > 0 {
            self.publish(next);
        }
        outcome
    }

    pub fn len(&self) -> usize {
        read(&self.trust).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.trust).is_empty()
    }

    pub fn contains(&self, cert: &Certificate) -> bool {
        read(&self.trust).contains_key(&cert.fingerprint())
    }

    /// Fingerprints of every anchor, sorted.
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        read(&self.trust).keys().copied().collect()
    }

    /// A consistent view of the trust set for repeated verifications.
    pub fn snapshot(&self) -> TrustSnapshot {
        TrustSnapshot::new(self.current(), self.policy())
    }

    /// Verifies `cert` against the trust anchors, as of now.
    pub fn verify(&self, cert: &Certificate) -> Verification {
        self.snapshot().verify(cert)
    }

    /// Verifies `cert`, using `intermediates` as untrusted path candidates.
    pub fn verify_with_intermediates(
        &self,
        cert: &Certificate,
        intermediates: &[Certificate],
    ) -> Verification {
        self.snapshot().verify_with_intermediates(cert, intermediates)
    }

    /// Verifies `cert` as of `at`.
    pub fn verify_at(
        &self,
        cert: &Certificate,
        intermediates: &[Certificate],
        at: OffsetDateTime,
    ) -> Verification {
        self.snapshot().verify_at(cert, intermediates, at)
    }
}

fn not_ca(cert: &Certificate) -> Error {
    Error::coded(
        ErrorCode::NotCa,
        format!("'{}' is not a CA certificate", cert.subject()),
    )
}

pub(crate) enum Rejection {
    /// The issuer is not trusted yet; a later pass may succeed.
    NoPath(Error),
    Invalid(Vec<Error>),
}

/// Checks that `cert` may join `trust` as an anchor.
pub(crate) fn vet_anchor(
    cert: &Certificate,
    trust: &TrustSet,
    at: OffsetDateTime,
    policy: &VerifyPolicy,
) -> Result<(), Rejection> {
    let mut errors = Vec::new();
    if !cert.is_ca() {
        errors.push(not_ca(cert));
    }

    if cert.is_self_signed() {
        errors.extend(verify::validity_errors(cert, at));
        if let Err(e) = cert.verify_signed_by(cert) {
            errors.push(e);
        }
        return if errors.is_empty() {
            Ok(())
        } else {
            Err(Rejection::Invalid(errors))
        };
    }

    let verification = verify::verify_chain(trust, cert, &[], at, policy);
    match verification.status {
        VerifyStatus::Trusted if errors.is_empty() => Ok(()),
        VerifyStatus::UntrustedNoPath if errors.is_empty() && verification.errors.is_empty() => {
            Err(Rejection::NoPath(Error::coded(
                ErrorCode::UntrustedRoot,
                format!("issuer of '{}' is not trusted", cert.subject()),
            )))
        }
        _ => {
            errors.extend(verification.errors);
            Err(Rejection::Invalid(errors))
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct BatchOutcome {
    pub added: usize,
    pub already_present: usize,
    pub errors: Vec<Error>,
}

/// Adds every acceptable certificate in `certs` to `trust`.
///
/// Certificates whose issuer is not trusted yet are retried after each pass
/// that added something, so input order does not matter.
pub(crate) fn register_batch(
    trust: &mut TrustSet,
    certs: Vec<Certificate>,
    at: OffsetDateTime,
    policy: &VerifyPolicy,
    debug: bool,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let mut pending = certs;

    loop {
        let mut deferred = Vec::new();
        let mut progress = false;

        for cert in pending {
            let fingerprint = cert.fingerprint();
            if trust.contains_key(&fingerprint) {
                outcome.already_present += 1;
                item_event!(debug, subject = cert.subject(), %fingerprint, "already trusted");
                continue;
            }
            match vet_anchor(&cert, trust, at, policy) {
                Ok(()) => {
                    item_event!(debug, subject = cert.subject(), %fingerprint, "added trust anchor");
                    trust.insert(fingerprint, Arc::new(cert));
                    outcome.added += 1;
                    progress = true;
                }
                Err(Rejection::NoPath(e)) => deferred.push((cert, e)),
                Err(Rejection::Invalid(errors)) => {
                    warn!(subject = cert.subject(), %fingerprint, "rejected CA certificate");
                    let subject = cert.subject().to_string();
                    outcome
                        .errors
                        .extend(errors.into_iter().map(|e| e.context(&subject)));
                }
            }
        }

        if deferred.is_empty() || !progress {
            for (cert, e) in deferred {
                warn!(subject = cert.subject(), "no trusted issuer for CA certificate");
                outcome.errors.push(e);
            }
            return outcome;
        }
        pending = deferred.into_iter().map(|(cert, _)| cert).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn test_add_ca_rejects_leaf() {
        let store = CaStore::new();
        let root = testutil::root("Store Root");
        let leaf = testutil::leaf(&root, "leaf.example");

        store.add_ca(&root.cert).unwrap();
        let errors = store.add_ca(&leaf).unwrap_err();
        assert!(errors.iter().any(|e| e.has_code(ErrorCode::NotCa)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_ca_intermediate_requires_trusted_issuer() {
        let store = CaStore::new();
        let root = testutil::root("Store Root");
        let intermediate = testutil::intermediate(&root, "Store Intermediate");

        let errors = store.add_ca(&intermediate.cert).unwrap_err();
        assert!(errors[0].has_code(ErrorCode::UntrustedRoot));

        store.add_ca(&root.cert).unwrap();
        store.add_ca(&intermediate.cert).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_register_batch_is_order_independent() {
        let root = testutil::root("Batch Root");
        let a = testutil::intermediate(&root, "Batch A");
        let b = testutil::intermediate(&a, "Batch B");

        let mut trust = TrustSet::new();
        let outcome = register_batch(
            &mut trust,
            vec![b.cert.clone(), a.cert.clone(), root.cert.clone()],
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
            false,
        );
        assert_eq!(outcome.added, 3);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_register_batch_reports_orphans() {
        let root = testutil::root("Orphan Root");
        let orphan = testutil::intermediate(&root, "Orphan");

        let mut trust = TrustSet::new();
        let outcome = register_batch(
            &mut trust,
            vec![orphan.cert.clone()],
            OffsetDateTime::now_utc(),
            &VerifyPolicy::default(),
            true,
        );
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].has_code(ErrorCode::UntrustedRoot));
    }

    #[test]
    fn test_config_setters_apply_immediately() {
        let store = CaStore::new();
        assert!(!store.auto_download());
        store.set_auto_download(true);
        store.set_debug(true);
        store.set_cache_path("/tmp/trustkit-test/bundle.pem");
        assert!(store.auto_download());
        assert!(store.debug());
        assert_eq!(
            store.cache_path(),
            PathBuf::from("/tmp/trustkit-test/bundle.pem")
        );
    }
}
