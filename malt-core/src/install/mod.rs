// malt-core/src/install/mod.rs
pub mod step;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use malt_common::config::Config;
use malt_common::error::{MaltError, Result};
use malt_common::model::formula::Formula;
use malt_common::pipeline::{FormulaState, PipelineEvent, RunRecord, TestOutcome};
use malt_common::registry::Formulary;
use malt_net::http::RetryPolicy;
use tokio::sync::{broadcast, Mutex as TokioMutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::keg::KegRegistry;
use crate::test_runner;
use step::StepContext;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Install procedures may write to shared locations under a prefix, so
/// installs are serialized per prefix while fetches run concurrently.
fn prefix_lock(prefix: &PathBuf) -> Arc<TokioMutex<()>> {
    static LOCKS: OnceLock<StdMutex<HashMap<PathBuf, Arc<TokioMutex<()>>>>> = OnceLock::new();
    let locks = LOCKS.get_or_init(|| StdMutex::new(HashMap::new()));
    let mut guard = locks.lock().expect("prefix lock map poisoned");
    guard.entry(prefix.clone()).or_default().clone()
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub run_tests: bool,
    pub retry: RetryPolicy,
    pub procedure_timeout: Duration,
    pub cancel: Arc<AtomicBool>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            run_tests: true,
            retry: RetryPolicy::default(),
            procedure_timeout: Duration::from_secs(1800),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Summary of one engine run.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub already_installed: Vec<String>,
    pub test_outcomes: Vec<(String, TestOutcome)>,
}

/// Turns one target formula into a completed installation: resolve the
/// dependency order, fetch and verify every artifact, then run install
/// procedures in order against the configured prefix.
pub struct InstallEngine<'a> {
    config: &'a Config,
    formulary: &'a Formulary,
    client: reqwest::Client,
    options: InstallOptions,
    record: RunRecord,
    event_tx: broadcast::Sender<PipelineEvent>,
}

impl<'a> InstallEngine<'a> {
    pub fn new(config: &'a Config, formulary: &'a Formulary, options: InstallOptions) -> Result<Self> {
        let client = malt_net::http::build_http_client(None)?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            formulary,
            client,
            options,
            record: RunRecord::new(),
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscriber is fine; events are advisory.
        let _ = self.event_tx.send(event);
    }

    fn check_cancelled(&self, name: &str) -> Result<()> {
        if self.options.cancel.load(Ordering::SeqCst) {
            Err(MaltError::Cancelled(format!(
                "installation of '{name}' cancelled before it started"
            )))
        } else {
            Ok(())
        }
    }

    /// Install `root` and everything it depends on. Fail-fast: the first
    /// fatal error aborts the remaining sequence; already-installed kegs
    /// are left in place.
    pub async fn install(&mut self, root: &str) -> Result<InstallReport> {
        let mut report = InstallReport::default();
        let keg_registry = KegRegistry::new(self.config);

        self.emit(PipelineEvent::PlanningStarted {
            target: root.to_string(),
        });
        let order = malt_common::dependency::DependencyResolver::new(self.formulary)
            .resolve_order(root)?;
        self.emit(PipelineEvent::PlanningFinished {
            install_order: order.iter().map(|f| f.name().to_string()).collect(),
        });

        // Idempotent dependency satisfaction: anything with a keg already
        // in the cellar is skipped outright.
        let mut pending: Vec<Arc<Formula>> = Vec::new();
        for formula in &order {
            if keg_registry.get_installed_keg(formula.name())?.is_some() {
                debug!("'{}' already installed, skipping", formula.name());
                self.record
                    .transition(formula.name(), FormulaState::Installed);
                report.already_installed.push(formula.name().to_string());
            } else {
                self.record.transition(formula.name(), FormulaState::Queued);
                pending.push(Arc::clone(formula));
            }
        }

        let artifacts = self.fetch_all(&pending).await?;

        for formula in &pending {
            let name = formula.name().to_string();
            if let Err(e) = self.check_cancelled(&name) {
                self.record.transition(
                    &name,
                    FormulaState::Failed {
                        reason: "cancelled".to_string(),
                    },
                );
                self.finish(&report);
                return Err(e);
            }

            let artifact = artifacts
                .get(&name)
                .expect("fetch stage produced an artifact for every pending formula");

            self.record.transition(&name, FormulaState::Installing);
            self.emit(PipelineEvent::InstallStarted { name: name.clone() });

            match self.install_one(formula, artifact).await {
                Ok(keg_path) => {
                    self.record.transition(&name, FormulaState::Installed);
                    self.emit(PipelineEvent::InstallFinished {
                        name: name.clone(),
                        keg_path,
                    });
                    info!("Installed '{}'", name);
                    report.installed.push(name.clone());

                    if self.options.run_tests {
                        let outcome = test_runner::run_test(
                            formula,
                            &keg_registry.keg_path(&name),
                            self.options.procedure_timeout,
                        )
                        .await;
                        if let TestOutcome::Failed { output } = &outcome {
                            warn!(
                                "Post-install test for '{}' failed (install kept):\n{}",
                                name, output
                            );
                        }
                        self.emit(PipelineEvent::TestFinished {
                            name: name.clone(),
                            outcome: outcome.clone(),
                        });
                        report.test_outcomes.push((name, outcome));
                    }
                }
                Err(e) => {
                    error!("Install of '{}' failed: {}", name, e);
                    self.record.transition(
                        &name,
                        FormulaState::Failed {
                            reason: e.to_string(),
                        },
                    );
                    self.emit(PipelineEvent::InstallFailed {
                        name,
                        error: e.to_string(),
                    });
                    self.finish(&report);
                    return Err(e);
                }
            }
        }

        self.finish(&report);
        Ok(report)
    }

    fn finish(&self, report: &InstallReport) {
        self.emit(PipelineEvent::PipelineFinished {
            success_count: report.installed.len(),
            fail_count: self.record.failed().count(),
        });
    }

    /// Fetch-and-verify every pending artifact concurrently. Fetch has no
    /// shared mutable state beyond the hash-keyed cache, so independent
    /// branches of the graph can download in parallel.
    async fn fetch_all(
        &mut self,
        pending: &[Arc<Formula>],
    ) -> Result<HashMap<String, PathBuf>> {
        let mut tasks = JoinSet::new();
        for formula in pending {
            self.check_cancelled(formula.name()).inspect_err(|_| {
                self.record.transition(
                    formula.name(),
                    FormulaState::Failed {
                        reason: "cancelled".to_string(),
                    },
                );
            })?;
            self.record
                .transition(formula.name(), FormulaState::Fetching);
            self.emit(PipelineEvent::DownloadStarted {
                name: formula.name().to_string(),
                url: formula.source_url.clone(),
            });

            let client = self.client.clone();
            let config = self.config.clone();
            let retry = self.options.retry;
            let formula = Arc::clone(formula);
            tasks.spawn(async move {
                let result =
                    malt_net::http::fetch_and_verify(&client, &formula, &config, retry).await;
                (formula, result)
            });
        }

        let mut artifacts = HashMap::new();
        let mut first_error: Option<MaltError> = None;
        while let Some(joined) = tasks.join_next().await {
            let (formula, result) = joined
                .map_err(|e| MaltError::Generic(format!("download task panicked: {e}")))?;
            match result {
                Ok(path) => {
                    self.emit(PipelineEvent::DownloadFinished {
                        name: formula.name().to_string(),
                        path: path.clone(),
                    });
                    artifacts.insert(formula.name().to_string(), path);
                }
                Err(e) => {
                    error!("Fetch failed for '{}': {}", formula.name(), e);
                    self.record.transition(
                        formula.name(),
                        FormulaState::Failed {
                            reason: e.to_string(),
                        },
                    );
                    self.emit(PipelineEvent::DownloadFailed {
                        name: formula.name().to_string(),
                        url: formula.source_url.clone(),
                        error: e.to_string(),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(artifacts),
        }
    }

    /// Extract the verified artifact into a scratch dir and run the
    /// formula's install procedure, serialized against other installs
    /// into the same prefix.
    async fn install_one(&self, formula: &Arc<Formula>, artifact: &PathBuf) -> Result<PathBuf> {
        let lock = prefix_lock(&self.config.malt_root);
        let _guard = lock.lock().await;

        fs::create_dir_all(self.config.tmp_dir())?;
        let build_dir = tempfile::Builder::new()
            .prefix(&format!("malt-build-{}-", formula.name()))
            .tempdir_in(self.config.tmp_dir())
            .map_err(|e| MaltError::Install(format!("Failed to create build dir: {e}")))?;

        let source_root = crate::extract::extract_archive(artifact, build_dir.path())?;
        let keg_path = self.config.formula_keg_path(formula.name());
        fs::create_dir_all(&keg_path)?;

        let steps: Vec<_> = formula
            .install
            .iter()
            .map(|s| s.resolved(&keg_path.to_string_lossy()))
            .collect();
        let cancel = Arc::clone(&self.options.cancel);
        let timeout = self.options.procedure_timeout;
        let name = formula.name().to_string();
        let keg_path_for_task = keg_path.clone();

        let procedure = async move {
            let mut ctx = StepContext::new(source_root, keg_path_for_task);
            for step in &steps {
                // Cooperative cancellation checkpoint between steps, never
                // mid-write to the prefix.
                if cancel.load(Ordering::SeqCst) {
                    return Err(MaltError::Cancelled(format!(
                        "install procedure of '{name}' cancelled"
                    )));
                }
                step::run_step(step, &mut ctx).await?;
            }
            Ok(())
        };

        // On expiry the timeout drops the procedure future, which kills
        // any build tool still running (`kill_on_drop` in the step
        // executor). Nothing mutates the keg after Timeout is returned.
        match tokio::time::timeout(timeout, procedure).await {
            Err(_) => {
                return Err(MaltError::Timeout(
                    timeout.as_secs(),
                    format!("install procedure of '{}'", formula.name()),
                ))
            }
            Ok(result) => result?,
        }

        let keg_registry = KegRegistry::new(self.config);
        keg_registry.write_receipt(formula)?;
        Ok(keg_path)
    }
}
