// malt-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::Result;

// Fallback when MALT_PREFIX is not set or is empty.
const DEFAULT_FALLBACK_MALT_ROOT: &str = "/opt/malt";

#[derive(Debug, Clone)]
pub struct Config {
    pub malt_root: PathBuf,
    pub formulary_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading malt configuration");

        let malt_root_str = env::var("MALT_PREFIX")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                debug!(
                    "MALT_PREFIX environment variable not set or empty, falling back to default: {}",
                    DEFAULT_FALLBACK_MALT_ROOT
                );
                DEFAULT_FALLBACK_MALT_ROOT.to_string()
            });
        let malt_root = PathBuf::from(&malt_root_str);
        debug!("Effective MALT_PREFIX set to: {}", malt_root.display());

        let formulary_dir = env::var("MALT_FORMULARY")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| malt_root.join("Formulary"));

        Ok(Self {
            malt_root,
            formulary_dir,
        })
    }

    /// Build a config rooted at an explicit prefix, e.g. from a `--prefix`
    /// flag or a test scratch directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let malt_root: PathBuf = root.into();
        let formulary_dir = malt_root.join("Formulary");
        Self {
            malt_root,
            formulary_dir,
        }
    }

    pub fn malt_root(&self) -> &Path {
        &self.malt_root
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.malt_root.join("bin")
    }

    pub fn cellar_dir(&self) -> PathBuf {
        self.malt_root.join("Cellar")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.malt_root.join("malt_cache")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.malt_root.join("malt_logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.malt_root.join("tmp")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.malt_root.join("state")
    }

    pub fn formulary_dir(&self) -> &Path {
        &self.formulary_dir
    }

    pub fn formula_keg_path(&self, formula_name: &str) -> PathBuf {
        self.cellar_dir().join(formula_name)
    }
}

pub fn load_config() -> Result<Config> {
    Config::load()
}
