use std::time::Duration;

use time::OffsetDateTime;
use tracing::{info, warn};

use super::{CaStore, register_batch};
use crate::error::{Error, ErrorCode, Result};
use crate::fsutil::write_atomic;
use crate::loader;
use crate::verify::VerifyPolicy;

/// Retrieves a CA bundle from a URL.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

/// [`Fetcher`] backed by a blocking `reqwest` client.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let failed = |e: reqwest::Error| {
            Error::coded(ErrorCode::DownloadFailed, format!("GET {url} failed: {e}"))
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(failed)?;
        let response = client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(failed)?;
        Ok(response.bytes().map_err(failed)?.to_vec())
    }
}

/// Summary of a [`CaStore::download_all`] call.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Certificates decoded from the downloaded bundle.
    pub fetched: usize,
    pub added: usize,
    pub already_present: usize,
    pub errors: Vec<Error>,
}

impl CaStore {
    /// Downloads the configured CA bundle, caches it and registers its roots.
    ///
    /// Fails with `DownloadDisabled` when auto-download is off. On any failure
    /// the trust set and the cache file keep their previous state.
    pub fn download_all(&self) -> Result<DownloadReport> {
        let config = self.config();
        if !config.auto_download {
            return Err(Error::coded(
                ErrorCode::DownloadDisabled,
                "automatic CA download is disabled",
            ));
        }

        let _writer = self.lock_writer();
        info!(url = %config.download_url, "downloading CA bundle");
        let bytes = self
            .fetcher
            .fetch(&config.download_url, config.download_timeout)
            .map_err(|e| {
                warn!(url = %config.download_url, error = %e, "CA bundle download failed");
                if e.has_code(ErrorCode::DownloadFailed) {
                    e
                } else {
                    Error::coded(
                        ErrorCode::DownloadFailed,
                        format!("GET {} failed: {e}", config.download_url),
                    )
                }
            })?;

        let outcome = loader::load_certs_from_bytes(&bytes);
        if outcome.count() == 0 {
            return Err(Error::coded(
                ErrorCode::DownloadFailed,
                format!(
                    "{} contained no certificates ({} errors)",
                    config.download_url,
                    outcome.errors.len()
                ),
            ));
        }

        let fetched = outcome.count();
        let mut next = (*self.current()).clone();
        let batch = register_batch(
            &mut next,
            outcome.certs,
            OffsetDateTime::now_utc(),
            &VerifyPolicy {
                anchor_expiry_warning: config.anchor_expiry_warning,
            },
            config.debug,
        );

        write_atomic(&config.cache_path, &bytes).map_err(|e| {
            Error::coded(
                ErrorCode::CacheWrite,
                format!("cannot write CA cache {}: {e}", config.cache_path.display()),
            )
        })?;
        self.publish(next);

        let mut errors = outcome.errors;
        errors.extend(batch.errors);
        info!(
            fetched,
            added = batch.added,
            already_present = batch.already_present,
            errors = errors.len(),
            cache = %config.cache_path.display(),
            "downloaded CA bundle"
        );
        Ok(DownloadReport {
            fetched,
            added: batch.added,
            already_present: batch.already_present,
            errors,
        })
    }
}
