// malt-core/src/keg.rs
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use malt_common::config::Config;
use malt_common::error::{MaltError, Result};
use malt_common::model::formula::Formula;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const RECEIPT_FILENAME: &str = "INSTALL_RECEIPT.json";

/// Written into the keg after a successful install. Its presence is what
/// makes a keg count as installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub source_url: String,
    pub content_hash: String,
    pub installed_at_unix: u64,
}

/// Represents information about an installed package (keg).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledKeg {
    pub name: String,
    pub path: PathBuf,
}

/// Manages querying installed packages in the Cellar.
#[derive(Debug)]
pub struct KegRegistry<'a> {
    config: &'a Config,
}

impl<'a> KegRegistry<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn keg_path(&self, name: &str) -> PathBuf {
        self.config.formula_keg_path(name)
    }

    /// A keg directory without a receipt is a leftover from an aborted
    /// install and is not treated as installed.
    pub fn get_installed_keg(&self, name: &str) -> Result<Option<InstalledKeg>> {
        let keg_dir = self.keg_path(name);
        if !keg_dir.is_dir() {
            debug!(
                "Keg directory {} not found, '{}' is not installed",
                keg_dir.display(),
                name
            );
            return Ok(None);
        }
        let receipt_path = keg_dir.join(RECEIPT_FILENAME);
        if !receipt_path.is_file() {
            warn!(
                "Keg {} exists but has no receipt, treating as not installed",
                keg_dir.display()
            );
            return Ok(None);
        }
        Ok(Some(InstalledKeg {
            name: name.to_string(),
            path: keg_dir,
        }))
    }

    pub fn read_receipt(&self, name: &str) -> Result<InstallReceipt> {
        let receipt_path = self.keg_path(name).join(RECEIPT_FILENAME);
        let raw = fs::read_to_string(&receipt_path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_receipt(&self, formula: &Formula) -> Result<()> {
        let keg_dir = self.keg_path(&formula.name);
        fs::create_dir_all(&keg_dir)?;
        let receipt = InstallReceipt {
            name: formula.name.clone(),
            source_url: formula.source_url.clone(),
            content_hash: formula.content_hash.clone(),
            installed_at_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        let receipt_path = keg_dir.join(RECEIPT_FILENAME);
        debug!("Writing install receipt: {}", receipt_path.display());
        let mut file = fs::File::create(&receipt_path)?;
        serde_json::to_writer_pretty(&mut file, &receipt)?;
        Ok(())
    }

    pub fn list_installed(&self) -> Result<Vec<InstalledKeg>> {
        let cellar = self.config.cellar_dir();
        if !cellar.is_dir() {
            return Ok(Vec::new());
        }
        let mut kegs = Vec::new();
        for entry in fs::read_dir(&cellar)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(keg) = self.get_installed_keg(&name)? {
                kegs.push(keg);
            }
        }
        kegs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(kegs)
    }

    pub fn remove_keg(&self, name: &str) -> Result<()> {
        let keg = self.get_installed_keg(name)?.ok_or_else(|| {
            MaltError::NotFound(format!("'{name}' is not installed"))
        })?;
        debug!("Removing keg {}", keg.path.display());
        fs::remove_dir_all(&keg.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use malt_common::model::formula::InstallStep;

    use super::*;

    fn scratch_formula(name: &str) -> Formula {
        Formula {
            name: name.to_string(),
            description: None,
            homepage: None,
            source_url: format!("https://example.org/{name}.tar.gz"),
            content_hash: "cafebabe".to_string(),
            dependencies: Vec::new(),
            install: vec![InstallStep::SetEnv {
                key: "X".to_string(),
                value: "1".to_string(),
            }],
            test: None,
        }
    }

    #[test]
    fn receipt_round_trip_and_listing() {
        let scratch = tempfile::tempdir().unwrap();
        let config = Config::with_root(scratch.path());
        let registry = KegRegistry::new(&config);

        assert!(registry.get_installed_keg("zlib").unwrap().is_none());

        registry.write_receipt(&scratch_formula("zlib")).unwrap();
        let keg = registry.get_installed_keg("zlib").unwrap().unwrap();
        assert_eq!(keg.name, "zlib");
        assert_eq!(registry.read_receipt("zlib").unwrap().content_hash, "cafebabe");

        let names: Vec<String> = registry
            .list_installed()
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(names, vec!["zlib".to_string()]);

        registry.remove_keg("zlib").unwrap();
        assert!(registry.get_installed_keg("zlib").unwrap().is_none());
        assert!(matches!(
            registry.remove_keg("zlib"),
            Err(MaltError::NotFound(_))
        ));
    }

    #[test]
    fn keg_without_receipt_is_not_installed() {
        let scratch = tempfile::tempdir().unwrap();
        let config = Config::with_root(scratch.path());
        let registry = KegRegistry::new(&config);
        fs::create_dir_all(config.formula_keg_path("half-installed")).unwrap();
        assert!(registry
            .get_installed_keg("half-installed")
            .unwrap()
            .is_none());
    }
}
