// malt-common/src/pipeline.rs
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-formula lifecycle during one engine run.
///
/// `Unresolved -> Queued -> Fetching -> Installing -> Installed`, or
/// `-> Failed` from Fetching/Installing. Terminal states are never left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormulaState {
    Unresolved,
    Queued,
    Fetching,
    Installing,
    Installed,
    Failed { reason: String },
}

impl FormulaState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FormulaState::Installed | FormulaState::Failed { .. })
    }
}

/// Run-scoped record of formula states, owned by the install engine. A
/// repeat run consults it (together with the keg registry) so already
/// installed dependencies are not rebuilt.
#[derive(Debug, Default)]
pub struct RunRecord {
    states: HashMap<String, FormulaState>,
}

impl RunRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, name: &str) -> FormulaState {
        self.states
            .get(name)
            .cloned()
            .unwrap_or(FormulaState::Unresolved)
    }

    /// Apply a transition. Terminal states stick; a late transition
    /// against an Installed/Failed formula is ignored.
    pub fn transition(&mut self, name: &str, next: FormulaState) {
        let current = self.state(name);
        if current.is_terminal() {
            tracing::debug!(
                "Ignoring transition for '{}' ({:?} is terminal)",
                name,
                current
            );
            return;
        }
        tracing::debug!("State '{}': {:?} -> {:?}", name, current, next);
        self.states.insert(name.to_string(), next);
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.states.iter().filter_map(|(name, state)| match state {
            FormulaState::Failed { reason } => Some((name.as_str(), reason.as_str())),
            _ => None,
        })
    }

    pub fn installed_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, FormulaState::Installed))
            .count()
    }
}

/// Outcome of a formula's optional post-install self-check. Advisory
/// only: a failed test never un-installs the keg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestOutcome {
    Passed,
    Failed { output: String },
    Skipped,
}

/// Progress events emitted by the engine for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    PlanningStarted {
        target: String,
    },
    PlanningFinished {
        install_order: Vec<String>,
    },
    DownloadStarted {
        name: String,
        url: String,
    },
    DownloadFinished {
        name: String,
        path: PathBuf,
    },
    DownloadFailed {
        name: String,
        url: String,
        error: String,
    },
    InstallStarted {
        name: String,
    },
    InstallFinished {
        name: String,
        keg_path: PathBuf,
    },
    InstallFailed {
        name: String,
        error: String,
    },
    TestFinished {
        name: String,
        outcome: TestOutcome,
    },
    PipelineFinished {
        success_count: usize,
        fail_count: usize,
    },
}
