//! On-disk cache of downloaded payloads.
//!
//! Each payload is stored as `<dir>/<md5(url)>.<ext>` and is considered
//! fresh until its modification time is older than the configured expiry.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tw_parking_source_models::CacheConfig;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Payload cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct PayloadCache {
    dir: PathBuf,
    enabled: bool,
    expiry: Duration,
}

impl PayloadCache {
    /// Creates a cache from its config block.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            enabled: config.enabled,
            expiry: Duration::from_secs(config.expiry_days.saturating_mul(SECONDS_PER_DAY)),
        }
    }

    /// A cache that never reads or writes.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
            expiry: Duration::ZERO,
        }
    }

    /// Whether reads and writes are performed.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// MD5 hex digest of `url`, used as the cache key.
    #[must_use]
    pub fn key(url: &str) -> String {
        let mut context = md5::Context::new();
        context.consume(url.as_bytes());
        format!("{:x}", context.finalize())
    }

    /// Path of the cached payload for `url` with extension `ext`.
    #[must_use]
    pub fn path_for(&self, url: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}", Self::key(url)))
    }

    /// Returns the cached payload if present and not expired.
    #[must_use]
    pub fn load(&self, url: &str, ext: &str) -> Option<Vec<u8>> {
        if !self.enabled {
            return None;
        }

        let path = self.path_for(url, ext);
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();

        if age > self.expiry {
            log::info!(
                "Cache expired for {url} ({} days old)",
                age.as_secs() / SECONDS_PER_DAY
            );
            return None;
        }

        match std::fs::read(&path) {
            Ok(bytes) => {
                log::info!("Using cached payload {}", path.display());
                Some(bytes)
            }
            Err(e) => {
                log::warn!("Failed to read cache file {}: {e}", path.display());
                None
            }
        }
    }

    /// Writes `bytes` as the cached payload for `url`.
    ///
    /// The file is written to a temporary sibling and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or file cannot be written.
    pub fn store(&self, url: &str, ext: &str, bytes: &[u8]) -> std::io::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(url, ext);
        let tmp_path = path.with_extension(format!("{ext}.tmp"));
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, &path)?;

        log::debug!("Cached {} bytes at {}", bytes.len(), path.display());
        Ok(())
    }
}
