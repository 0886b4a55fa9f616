// malt-core/src/install/step.rs
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use malt_common::error::{MaltError, Result};
use malt_common::model::formula::InstallStep;
use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Execution context for one install (or test) procedure. `env`
/// accumulates SetEnv steps for the remainder of the same procedure.
#[derive(Debug)]
pub struct StepContext {
    pub source_root: PathBuf,
    pub keg_path: PathBuf,
    pub env: HashMap<String, String>,
}

impl StepContext {
    pub fn new(source_root: PathBuf, keg_path: PathBuf) -> Self {
        Self {
            source_root,
            keg_path,
            env: HashMap::new(),
        }
    }
}

/// Run one already-`${prefix}`-resolved step. Relative Copy sources are
/// taken from the source tree, relative destinations land in the keg.
/// Dropping the returned future (timeout, cancellation) kills any tool
/// process still running, so nothing keeps writing to the prefix behind
/// the engine's back.
pub async fn run_step(step: &InstallStep, ctx: &mut StepContext) -> Result<()> {
    match step {
        InstallStep::SetEnv { key, value } => {
            debug!("SetEnv {}={}", key, value);
            ctx.env.insert(key.clone(), value.clone());
            Ok(())
        }
        InstallStep::Copy { from, to } => {
            let src = resolve_against(&ctx.source_root, from);
            let dst = resolve_against(&ctx.keg_path, to);
            info!("==> Copying {} to {}", src.display(), dst.display());
            copy_path(&src, &dst)
        }
        InstallStep::RunBuildTool { tool, args } => run_build_tool(tool, args, ctx).await,
    }
}

fn resolve_against(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    if !src.exists() {
        return Err(MaltError::Install(format!(
            "Copy source {} does not exist",
            src.display()
        )));
    }
    if src.is_dir() {
        for entry in WalkDir::new(src) {
            let entry = entry
                .map_err(|e| MaltError::Install(format!("Failed to walk {}: {e}", src.display())))?;
            let rel = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| MaltError::Install(e.to_string()))?;
            let target = dst.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &target)?;
            }
        }
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
    }
    Ok(())
}

async fn run_build_tool(tool: &str, args: &[String], ctx: &StepContext) -> Result<()> {
    // Toolchain discovery is the ambient PATH's problem; the engine only
    // checks the tool can be found before spawning it.
    let tool_path = if Path::new(tool).is_absolute() {
        PathBuf::from(tool)
    } else {
        which::which(tool).map_err(|_| {
            MaltError::CommandExec(format!("build tool '{tool}' not found in PATH"))
        })?
    };

    info!(
        "==> Running {} {}",
        tool_path.display(),
        args.join(" ")
    );
    let mut cmd = Command::new(&tool_path);
    cmd.args(args)
        .current_dir(&ctx.source_root)
        .envs(&ctx.env)
        .kill_on_drop(true);
    let output = cmd
        .output()
        .await
        .map_err(|e| MaltError::CommandExec(format!("Failed to execute {tool}: {e}")))?;

    if output.status.success() {
        debug!(
            "{} stdout:\n{}",
            tool,
            String::from_utf8_lossy(&output.stdout)
        );
        Ok(())
    } else {
        // Output is carried verbatim so the user can diagnose the build.
        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !captured.is_empty() {
                captured.push('\n');
            }
            captured.push_str(&stderr);
        }
        Err(MaltError::Build {
            status: output.status,
            output: captured,
        })
    }
}
