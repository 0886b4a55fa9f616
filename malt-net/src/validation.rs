// malt-net/src/validation.rs
use std::fs::File;
use std::io;
use std::path::Path;

use malt_common::error::{MaltError, Result};
use sha2::{Digest, Sha256};
use url::Url;

/// Verifies the SHA256 checksum of a file against the declared digest.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    tracing::debug!("Verifying checksum for: {}", path.display());
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let bytes_copied = io::copy(&mut file, &mut hasher)?;
    let actual = hex::encode(hasher.finalize());
    tracing::debug!(
        "Calculated SHA256: {} ({} bytes read)",
        actual,
        bytes_copied
    );
    tracing::debug!("Expected SHA256:   {}", expected);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(MaltError::ChecksumMismatch(format!(
            "{}: expected {}, got {}",
            path.display(),
            expected,
            actual
        )))
    }
}

/// Validates a URL, ensuring it uses the HTTPS scheme.
pub fn validate_url(url_str: &str) -> Result<()> {
    let url = Url::parse(url_str)
        .map_err(|e| MaltError::Validation(format!("Failed to parse URL '{url_str}': {e}")))?;
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(MaltError::Validation(format!(
            "Invalid URL scheme for '{}': Must be https, but got '{}'",
            url_str,
            url.scheme()
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn checksum_match_and_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.tar.gz");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"hello world").unwrap();
        drop(file);

        // sha256 of "hello world"
        let good = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        verify_checksum(&path, good).unwrap();
        verify_checksum(&path, &good.to_uppercase()).unwrap();

        let err = verify_checksum(&path, "deadbeef").unwrap_err();
        assert!(matches!(err, MaltError::ChecksumMismatch(_)));
    }

    #[test]
    fn only_https_urls_are_valid() {
        validate_url("https://example.org/a.tar.gz").unwrap();
        assert!(matches!(
            validate_url("http://example.org/a.tar.gz"),
            Err(MaltError::Validation(_))
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(MaltError::Validation(_))
        ));
    }
}
