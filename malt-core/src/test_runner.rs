// malt-core/src/test_runner.rs
use std::path::Path;
use std::time::Duration;

use malt_common::error::MaltError;
use malt_common::model::formula::Formula;
use malt_common::pipeline::TestOutcome;
use tracing::{debug, info};

use crate::install::step::{self, StepContext};

/// Run the formula's optional self-test against its installed keg. The
/// outcome is advisory observability data: a failed test never removes
/// the keg or fails the surrounding install.
pub async fn run_test(formula: &Formula, keg_path: &Path, timeout: Duration) -> TestOutcome {
    let Some(steps) = formula.test.as_ref().filter(|s| !s.is_empty()) else {
        debug!("'{}' declares no test procedure, skipping", formula.name());
        return TestOutcome::Skipped;
    };

    info!("==> Testing '{}'", formula.name());
    let resolved: Vec<_> = steps
        .iter()
        .map(|s| s.resolved(&keg_path.to_string_lossy()))
        .collect();
    // Test steps run from inside the keg; the source tree is gone by now.
    let keg_path = keg_path.to_path_buf();

    let procedure = async move {
        let mut ctx = StepContext::new(keg_path.clone(), keg_path);
        for step in &resolved {
            step::run_step(step, &mut ctx).await?;
        }
        Ok::<(), MaltError>(())
    };

    // A hung test command is killed when the timeout drops the future.
    match tokio::time::timeout(timeout, procedure).await {
        Err(_) => TestOutcome::Failed {
            output: format!("test procedure timed out after {}s", timeout.as_secs()),
        },
        Ok(Err(MaltError::Build { status, output })) => TestOutcome::Failed {
            output: format!("test command exited with {status}:\n{output}"),
        },
        Ok(Err(e)) => TestOutcome::Failed {
            output: e.to_string(),
        },
        Ok(Ok(())) => TestOutcome::Passed,
    }
}

#[cfg(test)]
mod tests {
    use malt_common::model::formula::InstallStep;

    use super::*;

    fn formula_with_test(test: Option<Vec<InstallStep>>) -> Formula {
        Formula {
            name: "demo".to_string(),
            description: None,
            homepage: None,
            source_url: "https://example.org/demo.tar.gz".to_string(),
            content_hash: "deadbeef".to_string(),
            dependencies: Vec::new(),
            install: vec![InstallStep::SetEnv {
                key: "X".to_string(),
                value: "1".to_string(),
            }],
            test,
        }
    }

    #[tokio::test]
    async fn absent_procedure_is_skipped() {
        let scratch = tempfile::tempdir().unwrap();
        let formula = formula_with_test(None);
        let outcome = run_test(&formula, scratch.path(), Duration::from_secs(5)).await;
        assert_eq!(outcome, TestOutcome::Skipped);
    }

    #[tokio::test]
    async fn passing_and_failing_procedures() {
        let scratch = tempfile::tempdir().unwrap();

        let passing = formula_with_test(Some(vec![InstallStep::RunBuildTool {
            tool: "true".to_string(),
            args: vec![],
        }]));
        assert_eq!(
            run_test(&passing, scratch.path(), Duration::from_secs(5)).await,
            TestOutcome::Passed
        );

        let failing = formula_with_test(Some(vec![InstallStep::RunBuildTool {
            tool: "false".to_string(),
            args: vec![],
        }]));
        assert!(matches!(
            run_test(&failing, scratch.path(), Duration::from_secs(5)).await,
            TestOutcome::Failed { .. }
        ));
    }
}
