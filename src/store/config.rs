use std::path::PathBuf;
use std::time::Duration;

use bon::Builder;

/// Default location of the public CA bundle.
pub const DEFAULT_DOWNLOAD_URL: &str = "https://curl.se/ca/cacert.pem";

/// Default HTTP timeout for bundle downloads.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(5);

fn default_cache_path() -> PathBuf {
    std::env::temp_dir().join("trustkit").join("ca-bundle.pem")
}

/// Per-store configuration.
///
/// # Example
/// ```
/// use trustkit::store::StoreConfig;
///
/// let config = StoreConfig::builder()
///     .auto_download(true)
///     .cache_path("/var/cache/app/ca.pem")
///     .build();
/// assert!(config.auto_download);
/// assert!(!config.hardened);
/// ```
#[derive(Clone, Debug, Builder)]
pub struct StoreConfig {
    /// Where `download_all` writes, and `load_cache` reads, the CA bundle.
    #[builder(into, default = default_cache_path())]
    pub cache_path: PathBuf,
    #[builder(default)]
    pub auto_download: bool,
    /// Log per-certificate registration events at `info` instead of `debug`.
    #[builder(default)]
    pub debug: bool,
    #[builder(into, default = DEFAULT_DOWNLOAD_URL.to_string())]
    pub download_url: String,
    #[builder(default = DEFAULT_DOWNLOAD_TIMEOUT)]
    pub download_timeout: Duration,
    /// Refuse testing roots.
    #[builder(default)]
    pub hardened: bool,
    /// Warn when a chain's anchor expires within this window.
    #[builder(default = time::Duration::days(30))]
    pub anchor_expiry_warning: time::Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
