//! Local step execution
//!
//! Checkout, toolchain setup, dependency install and build all run as local
//! processes with streamed output. Any non-zero exit fails the step.

use std::path::Path;
use std::time::Duration;

use crate::domain::pipeline::StepKind;
use crate::error::{PipelineError, PipelineResult};
use crate::infra::command::{CommandError, CommandRunner};

use super::context::PipelineContext;

/// Run one command for a step
pub async fn run_command(
    ctx: &PipelineContext,
    step: StepKind,
    command: &[String],
    work_dir: &Path,
    timeout: Duration,
) -> PipelineResult<()> {
    let rendered = command.join(" ");
    ctx.log_stdout(&format!(">>> {}", rendered));

    if ctx.dry_run {
        tracing::info!(run_id = %ctx.run_id, step = %step, command = %rendered, "[dry-run] local");
        return Ok(());
    }

    let result = CommandRunner::run_with_streaming(
        command,
        work_dir,
        ctx.log_tx.clone(),
        ctx.cancel_token.clone(),
        timeout,
    )
    .await
    .map_err(|e| match e {
        CommandError::Cancelled => PipelineError::Cancelled,
        other => PipelineError::Command(other),
    })?;

    if result.timed_out {
        return Err(PipelineError::StepFailed {
            step,
            message: format!("`{}` timed out after {:?}", rendered, timeout),
        });
    }

    if !result.success() {
        let code = result.code();
        ctx.log_stderr(&format!("`{}` failed (exit code: {})", rendered, code));
        return Err(PipelineError::StepFailed {
            step,
            message: format!("`{}` exited with code {}", rendered, code),
        });
    }

    Ok(())
}

/// Bring the working copy to the tip of `branch`
pub async fn checkout(
    ctx: &PipelineContext,
    work_dir: &Path,
    branch: &str,
    timeout: Duration,
) -> PipelineResult<()> {
    let commands: [&[&str]; 3] = [
        &["git", "fetch", "origin", branch],
        &["git", "checkout", branch],
        &["git", "pull", "--ff-only", "origin", branch],
    ];

    for command in commands {
        let command: Vec<String> = command.iter().map(|s| s.to_string()).collect();
        run_command(ctx, StepKind::Checkout, &command, work_dir, timeout).await?;

        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
    }

    if !ctx.dry_run {
        if let Ok(output) = CommandRunner::run_simple(
            "git",
            &["rev-parse", "HEAD"],
            work_dir,
            &ctx.cancel_token,
            timeout,
        )
        .await
        {
            let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if output.status.success() && !commit.is_empty() {
                ctx.log_stdout(&format!("Commit: {}", commit));
                tracing::info!(run_id = %ctx.run_id, commit = %commit, "Checked out");
            }
        }
    }

    Ok(())
}
