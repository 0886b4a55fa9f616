// malt-common/src/registry.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::error::{MaltError, Result};
use super::model::formula::Formula;

/// In-memory store of parsed formulas, keyed by unique name. Constructed
/// explicitly and passed by reference; nothing here touches global state.
#[derive(Debug, Default)]
pub struct Formulary {
    formulas: BTreeMap<String, Arc<Formula>>,
}

impl Formulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a single recipe from JSON text.
    pub fn load_str(source: &str) -> Result<Formula> {
        let formula: Formula = serde_json::from_str(source)
            .map_err(|e| MaltError::Parse("recipe", e.to_string()))?;
        formula.validate()?;
        Ok(formula)
    }

    pub fn load_file(path: &Path) -> Result<Formula> {
        let raw = fs::read_to_string(path)?;
        Self::load_str(&raw).map_err(|e| match e {
            MaltError::Parse(ctx, msg) => {
                MaltError::Parse(ctx, format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Load every `*.json` recipe under a formulary directory.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut formulary = Self::new();
        if !dir.is_dir() {
            return Err(MaltError::Config(format!(
                "Formulary directory {} does not exist",
                dir.display()
            )));
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let formula = Self::load_file(&path)?;
            debug!(
                "Loaded formula '{}' from {}",
                formula.name,
                path.display()
            );
            formulary.insert(formula)?;
        }
        Ok(formulary)
    }

    /// Formula names form a unique key space; a second record with the
    /// same name is a configuration error, not a silent overwrite.
    pub fn insert(&mut self, formula: Formula) -> Result<()> {
        let name = formula.name.clone();
        if self.formulas.contains_key(&name) {
            return Err(MaltError::Parse(
                "recipe",
                format!("duplicate formula name '{name}'"),
            ));
        }
        self.formulas.insert(name, Arc::new(formula));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Formula>> {
        self.formulas
            .get(name)
            .cloned()
            .ok_or_else(|| MaltError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formulas.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formulas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRYSTALLINE: &str = r#"{
        "name": "crystalline",
        "sourceURL": "https://example.org/crystalline-0.5.0.tar.gz",
        "contentHash": "deadbeef",
        "dependencies": ["crystal"],
        "installProcedure": [
            { "action": "run-build-tool", "tool": "make", "args": ["install", "PREFIX=${prefix}"] }
        ]
    }"#;

    #[test]
    fn load_and_lookup() {
        let mut formulary = Formulary::new();
        formulary.insert(Formulary::load_str(CRYSTALLINE).unwrap()).unwrap();
        let found = formulary.lookup("crystalline").unwrap();
        assert_eq!(found.dependencies, vec!["crystal".to_string()]);
        assert!(matches!(
            formulary.lookup("crystal"),
            Err(MaltError::NotFound(_))
        ));
    }

    #[test]
    fn missing_required_field_is_parse_error() {
        let err = Formulary::load_str(r#"{ "name": "broken" }"#).unwrap_err();
        assert!(matches!(err, MaltError::Parse(_, _)), "got {err:?}");
    }

    #[test]
    fn load_dir_picks_up_json_recipes_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("crystalline.json"), CRYSTALLINE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a recipe").unwrap();

        let formulary = Formulary::load_dir(dir.path()).unwrap();
        assert_eq!(formulary.len(), 1);
        assert!(formulary.contains("crystalline"));
    }

    #[test]
    fn load_dir_fails_on_malformed_recipe() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{}").unwrap();
        assert!(matches!(
            Formulary::load_dir(dir.path()),
            Err(MaltError::Parse(_, _) | MaltError::Json(_))
        ));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut formulary = Formulary::new();
        formulary.insert(Formulary::load_str(CRYSTALLINE).unwrap()).unwrap();
        let err = formulary
            .insert(Formulary::load_str(CRYSTALLINE).unwrap())
            .unwrap_err();
        assert!(matches!(err, MaltError::Parse(_, _)));
    }
}
