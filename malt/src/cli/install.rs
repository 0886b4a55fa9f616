// malt/src/cli/install.rs
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use colored::Colorize;
use malt_common::config::Config;
use malt_common::error::Result;
use malt_common::pipeline::{PipelineEvent, TestOutcome};
use malt_common::registry::Formulary;
use malt_core::install::{InstallEngine, InstallOptions};
use malt_net::http::RetryPolicy;
use tracing::{debug, instrument, warn};

#[derive(Debug, Args)]
pub struct InstallArgs {
    #[arg(required = true)]
    names: Vec<String>,

    /// Skip the formulas' post-install self-tests.
    #[arg(long)]
    no_test: bool,

    /// Attempts per artifact download before giving up.
    #[arg(long, default_value_t = 3)]
    network_retries: u32,

    /// Timeout in seconds for each install procedure invocation.
    #[arg(long, default_value_t = 1800)]
    timeout_secs: u64,
}

impl InstallArgs {
    #[instrument(skip(self, config), fields(targets = ?self.names))]
    pub async fn run(&self, config: &Config) -> Result<()> {
        let formulary = Formulary::load_dir(config.formulary_dir())?;
        debug!("Loaded {} formulas", formulary.len());

        let options = InstallOptions {
            run_tests: !self.no_test,
            retry: RetryPolicy {
                max_attempts: self.network_retries.max(1),
                ..RetryPolicy::default()
            },
            procedure_timeout: Duration::from_secs(self.timeout_secs),
            ..InstallOptions::default()
        };

        // Ctrl-C flips the cancel flag; the engine acts on it at the next
        // stage boundary.
        let cancel = Arc::clone(&options.cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Cancellation requested, stopping at the next stage boundary");
                cancel.store(true, Ordering::SeqCst);
            }
        });

        for name in &self.names {
            let mut engine = InstallEngine::new(config, &formulary, options.clone())?;
            let events = engine.subscribe();
            let printer = tokio::spawn(print_events(events));

            let result = engine.install(name).await;
            drop(engine);
            let _ = printer.await;
            let report = result?;

            for target in &report.already_installed {
                println!("{} {} already installed", "==>".blue().bold(), target.bold());
            }
            for (target, outcome) in &report.test_outcomes {
                match outcome {
                    TestOutcome::Passed => {
                        println!("{} {} test passed", "==>".green().bold(), target.bold())
                    }
                    TestOutcome::Skipped => {
                        debug!("'{target}' has no test procedure");
                    }
                    TestOutcome::Failed { .. } => println!(
                        "{} {} test failed (install kept)",
                        "Warning:".yellow().bold(),
                        target.bold()
                    ),
                }
            }
        }
        Ok(())
    }
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<PipelineEvent>) {
    while let Ok(event) = events.recv().await {
        match event {
            PipelineEvent::PlanningFinished { install_order } => {
                println!(
                    "{} Install order: {}",
                    "==>".blue().bold(),
                    install_order.join(", ")
                );
            }
            PipelineEvent::DownloadStarted { name, url } => {
                println!("{} Fetching {} from {}", "==>".blue().bold(), name.bold(), url);
            }
            PipelineEvent::InstallStarted { name } => {
                println!("{} Installing {}", "==>".blue().bold(), name.bold());
            }
            PipelineEvent::InstallFinished { name, keg_path } => {
                println!(
                    "{} Installed {} to {}",
                    "==>".green().bold(),
                    name.bold(),
                    keg_path.display()
                );
            }
            PipelineEvent::PipelineFinished { .. } => break,
            _ => {}
        }
    }
}
