// malt-net/src/http.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use malt_common::config::Config;
use malt_common::error::{MaltError, Result};
use malt_common::model::formula::Formula;
use rand::Rng;
use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use crate::validation::{validate_url, verify_checksum};

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "malt formula installer (Rust)";

/// Bounded retries with jittered exponential backoff. Applies to
/// transport failures only; a checksum mismatch is never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << attempt.min(6));
        let jitter_ms = rand::rng().random_range(0..=exp.as_millis().min(1000) as u64);
        exp + Duration::from_millis(jitter_ms)
    }
}

pub fn build_http_client(timeout: Option<Duration>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, USER_AGENT_STRING.parse().unwrap());
    headers.insert(ACCEPT, "*/*".parse().unwrap());
    Client::builder()
        .timeout(timeout.unwrap_or(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS)))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| MaltError::Generic(format!("Failed to build HTTP client: {e}")))
}

/// Fetch the formula's source artifact into the cache and verify its
/// digest. The returned path is only ever a verified file; the install
/// executor never sees unverified bytes.
pub async fn fetch_and_verify(
    client: &Client,
    formula: &Formula,
    config: &Config,
    retry: RetryPolicy,
) -> Result<PathBuf> {
    let url = formula.source_url.as_str();
    let filename = url
        .split('/')
        .next_back()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("{}-download", formula.name));
    // Cache key includes the content hash so a recipe bumping its source
    // invalidates the old entry naturally.
    let cache_path = config
        .cache_dir()
        .join(format!("{}-{}", formula.content_hash, filename));

    debug!(
        "Preparing to fetch source for '{}' from URL: {}",
        formula.name, url
    );
    debug!("Target cache path: {}", cache_path.display());
    debug!("Expected SHA256: {}", formula.content_hash);

    // A non-https source is rejected even when the cache could satisfy
    // the fetch; the scheme check gates the recipe, not the transfer.
    validate_url(url)?;

    if cache_path.is_file() {
        // Re-verification of a cache hit is cheap; always repeat it.
        match verify_checksum(&cache_path, &formula.content_hash) {
            Ok(_) => {
                debug!("Using valid cached file: {}", cache_path.display());
                return Ok(cache_path);
            }
            Err(e) => {
                debug!(
                    "Cached file checksum mismatch ({}): {}. Redownloading.",
                    cache_path.display(),
                    e
                );
                if let Err(remove_err) = fs::remove_file(&cache_path) {
                    debug!(
                        "Failed to remove corrupted cached file {}: {}",
                        cache_path.display(),
                        remove_err
                    );
                }
            }
        }
    } else {
        debug!("File not found in cache.");
    }

    fs::create_dir_all(config.cache_dir()).map_err(|e| {
        MaltError::Cache(format!(
            "Failed to create cache directory {}: {}",
            config.cache_dir().display(),
            e
        ))
    })?;

    let mut last_error: Option<MaltError> = None;
    for attempt in 0..retry.max_attempts {
        if attempt > 0 {
            let delay = retry.backoff(attempt - 1);
            debug!(
                "Retrying download of '{}' (attempt {}/{}) after {:?}",
                formula.name,
                attempt + 1,
                retry.max_attempts,
                delay
            );
            tokio::time::sleep(delay).await;
        }
        match download_and_verify(client, url, &cache_path, &formula.content_hash).await {
            Ok(path) => {
                debug!("Successfully downloaded and verified: {}", path.display());
                return Ok(path);
            }
            // A bad digest means corruption or a wrong recipe, not a
            // transient condition. Fatal for this formula.
            Err(e @ MaltError::ChecksumMismatch(_)) => {
                error!("Integrity failure for '{}': {}", formula.name, e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "Download attempt {}/{} failed for {}: {}",
                    attempt + 1,
                    retry.max_attempts,
                    url,
                    e
                );
                last_error = Some(e);
            }
        }
    }

    Err(MaltError::Download(
        formula.name.clone(),
        url.to_string(),
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "All download attempts failed.".to_string()),
    ))
}

async fn download_and_verify(
    client: &Client,
    url: &str,
    final_path: &Path,
    sha256_expected: &str,
) -> Result<PathBuf> {
    let temp_filename = format!(
        ".{}.download",
        final_path.file_name().unwrap_or_default().to_string_lossy()
    );
    let temp_path = final_path.with_file_name(temp_filename);
    debug!("Downloading to temporary path: {}", temp_path.display());
    if temp_path.exists() {
        if let Err(e) = fs::remove_file(&temp_path) {
            warn!(
                "Could not remove existing temporary file {}: {}",
                temp_path.display(),
                e
            );
        }
    }

    let response = client.get(url).send().await.map_err(|e| {
        debug!("HTTP request failed for {url}: {e}");
        MaltError::Generic(format!("HTTP request failed for {url}: {e}"))
    })?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);

    if !status.is_success() {
        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());
        error!("HTTP error {} for URL {}: {}", status, url, body_text);
        let name = final_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        return match status {
            StatusCode::NOT_FOUND => Err(MaltError::Download(
                name,
                url.to_string(),
                "Resource not found (404)".to_string(),
            )),
            StatusCode::FORBIDDEN => Err(MaltError::Download(
                name,
                url.to_string(),
                "Access forbidden (403)".to_string(),
            )),
            _ => Err(MaltError::Download(
                name,
                url.to_string(),
                format!("HTTP error {status}: {body_text}"),
            )),
        };
    }

    let mut temp_file = TokioFile::create(&temp_path).await.map_err(|e| {
        MaltError::Generic(format!(
            "Failed to create temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;
    let content = response
        .bytes()
        .await
        .map_err(|e| MaltError::Generic(format!("Failed to read response body bytes: {e}")))?;
    temp_file.write_all(&content).await.map_err(|e| {
        MaltError::Generic(format!(
            "Failed to write download stream to {}: {}",
            temp_path.display(),
            e
        ))
    })?;
    drop(temp_file);
    debug!("Finished writing download stream to temp file.");

    // Verify-then-build ordering is absolute: the digest is checked while
    // the bytes still live at the temp path.
    if let Err(e) = verify_checksum(&temp_path, sha256_expected) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    debug!(
        "Checksum verified for temporary file: {}",
        temp_path.display()
    );

    fs::rename(&temp_path, final_path).map_err(|e| {
        MaltError::Generic(format!(
            "Failed to move temp file {} to {}: {}",
            temp_path.display(),
            final_path.display(),
            e
        ))
    })?;
    debug!(
        "Moved verified file to final location: {}",
        final_path.display()
    );
    Ok(final_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use sha2::{Digest, Sha256};

    use super::*;

    #[test]
    fn backoff_grows_with_attempts() {
        let policy = RetryPolicy::default();
        let first = policy.backoff(0);
        let third = policy.backoff(2);
        assert!(first >= policy.base_delay);
        assert!(third >= policy.base_delay * 4);
    }

    #[tokio::test]
    async fn cache_hit_does_not_bypass_the_scheme_check() {
        let scratch = tempfile::tempdir().unwrap();
        let config = Config::with_root(scratch.path().to_path_buf());

        // Seed the cache with bytes that hash to the declared digest, so
        // only the URL validation can reject this fetch.
        let payload = b"cached artifact bytes";
        let digest = hex::encode(Sha256::digest(payload));
        let formula = Formula {
            name: "plain".to_string(),
            description: None,
            homepage: None,
            source_url: "http://example.invalid/plain-1.0.tar.gz".to_string(),
            content_hash: digest.clone(),
            dependencies: Vec::new(),
            install: vec![],
            test: None,
        };
        fs::create_dir_all(config.cache_dir()).unwrap();
        fs::write(
            config
                .cache_dir()
                .join(format!("{digest}-plain-1.0.tar.gz")),
            payload,
        )
        .unwrap();

        let client = build_http_client(None).unwrap();
        let err = fetch_and_verify(&client, &formula, &config, RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MaltError::Validation(_)), "got {err:?}");
    }
}
