// malt-common/src/model/formula.rs
use serde::{Deserialize, Serialize};

use crate::error::{MaltError, Result};

/// Placeholder token replaced with the formula's keg path before an
/// install step runs.
pub const PREFIX_PLACEHOLDER: &str = "${prefix}";

/// A single declarative install action. Recipes cannot carry arbitrary
/// executable code; the engine only runs these enumerated variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum InstallStep {
    /// Copy a file or directory tree from the unpacked source into the
    /// prefix.
    Copy { from: String, to: String },
    /// Invoke a build tool inside the source tree.
    RunBuildTool { tool: String, args: Vec<String> },
    /// Set an environment variable for the remaining steps of the same
    /// procedure.
    SetEnv { key: String, value: String },
}

impl InstallStep {
    /// Substitute `${prefix}` in every string field of the step.
    pub fn resolved(&self, prefix: &str) -> InstallStep {
        let sub = |s: &str| s.replace(PREFIX_PLACEHOLDER, prefix);
        match self {
            InstallStep::Copy { from, to } => InstallStep::Copy {
                from: sub(from),
                to: sub(to),
            },
            InstallStep::RunBuildTool { tool, args } => InstallStep::RunBuildTool {
                tool: sub(tool),
                args: args.iter().map(|a| sub(a)).collect(),
            },
            InstallStep::SetEnv { key, value } => InstallStep::SetEnv {
                key: key.clone(),
                value: sub(value),
            },
        }
    }
}

/// One parsed recipe. Immutable once loaded into the formulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    #[serde(rename = "contentHash")]
    pub content_hash: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(rename = "installProcedure")]
    pub install: Vec<InstallStep>,
    #[serde(rename = "testProcedure", default)]
    pub test: Option<Vec<InstallStep>>,
}

impl Formula {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_test(&self) -> bool {
        self.test.as_ref().is_some_and(|steps| !steps.is_empty())
    }

    /// Field checks serde cannot express: non-empty required strings, a
    /// well-formed https source URL, a hex content hash, at least one
    /// install step.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MaltError::Parse("formula", "missing 'name'".to_string()));
        }
        if self.source_url.trim().is_empty() {
            return Err(MaltError::Parse(
                "formula",
                format!("formula '{}' is missing 'sourceURL'", self.name),
            ));
        }
        if url::Url::parse(&self.source_url).is_err() {
            return Err(MaltError::Parse(
                "formula",
                format!(
                    "formula '{}' has an unparsable sourceURL '{}'",
                    self.name, self.source_url
                ),
            ));
        }
        if self.content_hash.trim().is_empty() {
            return Err(MaltError::Parse(
                "formula",
                format!("formula '{}' is missing 'contentHash'", self.name),
            ));
        }
        if !self.content_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MaltError::Parse(
                "formula",
                format!(
                    "formula '{}' has a non-hex contentHash '{}'",
                    self.name, self.content_hash
                ),
            ));
        }
        if self.install.is_empty() {
            return Err(MaltError::Parse(
                "formula",
                format!("formula '{}' has an empty installProcedure", self.name),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> serde_json::Value {
        serde_json::json!({
            "name": "crystalline",
            "description": "A Language Server Protocol implementation for Crystal.",
            "homepage": "https://github.com/elbywan/crystalline",
            "sourceURL": "https://github.com/elbywan/crystalline/archive/v0.5.0.tar.gz",
            "contentHash": "b7a203d0e5d4e37bbe744b371fca77868aca8f71",
            "dependencies": ["crystal"],
            "installProcedure": [
                { "action": "run-build-tool", "tool": "make", "args": ["install", "PREFIX=${prefix}"] }
            ]
        })
    }

    #[test]
    fn parses_recipe_field_names() {
        let formula: Formula = serde_json::from_value(minimal_json()).unwrap();
        formula.validate().unwrap();
        assert_eq!(formula.name, "crystalline");
        assert_eq!(formula.dependencies, vec!["crystal".to_string()]);
        assert!(!formula.has_test());
    }

    #[test]
    fn rejects_empty_install_procedure() {
        let mut value = minimal_json();
        value["installProcedure"] = serde_json::json!([]);
        let formula: Formula = serde_json::from_value(value).unwrap();
        assert!(matches!(
            formula.validate(),
            Err(MaltError::Parse(_, _))
        ));
    }

    #[test]
    fn rejects_non_hex_hash() {
        let mut value = minimal_json();
        value["contentHash"] = serde_json::json!("not-a-digest");
        let formula: Formula = serde_json::from_value(value).unwrap();
        assert!(matches!(formula.validate(), Err(MaltError::Parse(_, _))));
    }

    #[test]
    fn resolves_prefix_placeholder() {
        let step = InstallStep::RunBuildTool {
            tool: "make".to_string(),
            args: vec!["install".to_string(), "PREFIX=${prefix}".to_string()],
        };
        match step.resolved("/opt/malt/Cellar/crystalline") {
            InstallStep::RunBuildTool { args, .. } => {
                assert_eq!(args[1], "PREFIX=/opt/malt/Cellar/crystalline");
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }
}
