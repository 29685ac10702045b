//! Remote deploy step
//!
//! Runs the fixed remote sequence (stop, archive, copy, start) over a
//! `RemoteShell`. With `FailurePolicy::Continue` every command runs even when an
//! earlier one failed; `FailurePolicy::Abort` stops at the first failure. No
//! rollback is attempted in either case.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::remote::RemoteCommand;
use crate::infra::remote::{RemoteOutput, RemoteShell};

use super::context::PipelineContext;

/// 远程命令失败时的处理策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 继续执行后续命令
    #[default]
    Continue,
    /// 立即停止
    Abort,
}

/// 单条命令的执行结果
#[derive(Clone, Debug, Serialize)]
pub struct CommandOutcome {
    pub name: &'static str,
    pub description: String,
    pub exit_status: Option<u32>,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none() && self.exit_status == Some(0)
    }
}

/// 部署结果
#[derive(Clone, Debug, Default, Serialize)]
pub struct DeployOutcome {
    pub commands: Vec<CommandOutcome>,
    /// 因取消或 Abort 策略提前结束
    pub aborted: bool,
    pub cancelled: bool,
}

impl DeployOutcome {
    pub fn success(&self) -> bool {
        !self.aborted && !self.cancelled && self.commands.iter().all(|c| c.success())
    }

    /// 失败摘要
    pub fn summary(&self) -> String {
        let failed: Vec<String> = self
            .commands
            .iter()
            .filter(|c| !c.success())
            .map(|c| match (&c.error, c.exit_status) {
                (Some(e), _) => format!("{}: {}", c.name, e),
                (None, Some(code)) => format!("{}: exit code {}", c.name, code),
                (None, None) => c.name.to_string(),
            })
            .collect();

        if self.cancelled {
            "cancelled".to_string()
        } else if failed.is_empty() {
            "ok".to_string()
        } else {
            failed.join("; ")
        }
    }
}

/// 产物 SHA-256（小写十六进制）
pub fn sha256_hex(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    format!("{:x}", hasher.finalize())
}

/// Execute the remote command sequence
pub async fn execute(
    ctx: &PipelineContext,
    shell: &mut dyn RemoteShell,
    commands: &[RemoteCommand],
    artifact: &[u8],
    policy: FailurePolicy,
) -> DeployOutcome {
    let digest = sha256_hex(artifact);
    let mut outcome = DeployOutcome::default();

    for command in commands {
        if ctx.is_cancelled() {
            tracing::warn!(run_id = %ctx.run_id, "Deploy cancelled before {}", command.name());
            ctx.log_stderr("=== Deploy CANCELLED ===");
            outcome.cancelled = true;
            outcome.aborted = true;
            break;
        }

        let description = command.describe();
        ctx.log_stdout(&format!(">>> {}", description));

        let result = match command {
            RemoteCommand::CopyBinary { remote, .. } => shell.upload(artifact, remote).await,
            other => match other.shell_command() {
                Some(line) => shell.exec(&line).await,
                None => Ok(RemoteOutput::default()),
            },
        };

        let mut command_outcome = CommandOutcome {
            name: command.name(),
            description,
            exit_status: None,
            error: None,
        };

        match result {
            Ok(output) => {
                for line in output.stdout.lines() {
                    ctx.log_stdout(line);
                }
                for line in output.stderr.lines() {
                    ctx.log_stderr(line);
                }
                command_outcome.exit_status = Some(output.exit_status);

                if output.success() {
                    if let RemoteCommand::VerifyChecksum { .. } = command {
                        command_outcome.error = verify_digest(ctx, &output.stdout, &digest);
                    }
                }
            }
            Err(e) => {
                command_outcome.error = Some(e.to_string());
            }
        }

        let ok = command_outcome.success();
        if !ok {
            tracing::warn!(
                run_id = %ctx.run_id,
                command = command.name(),
                exit_status = ?command_outcome.exit_status,
                error = ?command_outcome.error,
                "Remote command failed"
            );
            ctx.log_stderr(&format!("{} failed", command.name()));
        }
        outcome.commands.push(command_outcome);

        if !ok && policy == FailurePolicy::Abort {
            ctx.log_stderr("Aborting remaining remote commands (fail-fast)");
            outcome.aborted = true;
            break;
        }
    }

    outcome
}

/// 比较 `sha256sum` 输出与本地摘要，dry-run 时跳过
fn verify_digest(ctx: &PipelineContext, stdout: &str, expected: &str) -> Option<String> {
    if ctx.dry_run {
        return None;
    }
    let actual = stdout.split_whitespace().next().unwrap_or_default();
    if actual.eq_ignore_ascii_case(expected) {
        ctx.log_stdout("Checksum verified");
        None
    } else {
        Some(format!(
            "checksum mismatch: expected {}, got {}",
            expected,
            if actual.is_empty() { "<empty>" } else { actual }
        ))
    }
}
