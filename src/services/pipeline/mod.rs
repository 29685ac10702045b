//! 流水线服务模块
//!
//! 顺序执行 checkout → toolchain → dependencies → build → deploy。
//! 本地步骤失败立即终止，后续步骤标记为 skipped。

pub mod context;
pub mod deploy;
pub mod local;

use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::env::constants::STEP_TIMEOUT_SECS;
use crate::config::Workflow;
use crate::domain::pipeline::{PipelineRun, PipelineStatus, StepKind};
use crate::domain::remote::{DeployPlan, RemoteCommand};
use crate::error::{PipelineError, PipelineResult};
use crate::infra::remote::Connector;

pub use context::PipelineContext;
pub use deploy::{DeployOutcome, FailurePolicy};

/// 运行选项
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// 本地工作目录（仓库根）
    pub work_dir: PathBuf,
    /// 跳过的步骤
    pub skip: HashSet<StepKind>,
    /// 远程命令失败策略
    pub failure_policy: FailurePolicy,
    /// 单个本地命令超时
    pub step_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            skip: HashSet::new(),
            failure_policy: FailurePolicy::Continue,
            step_timeout: Duration::from_secs(STEP_TIMEOUT_SECS),
        }
    }
}

/// 部署流水线
pub struct Pipeline {
    workflow: Workflow,
    options: PipelineOptions,
    /// 远程目标目录
    remote_dir: String,
}

impl Pipeline {
    pub fn new(workflow: Workflow, options: PipelineOptions, remote_dir: impl Into<String>) -> Self {
        Self {
            workflow,
            options,
            remote_dir: remote_dir.into(),
        }
    }

    /// 部署步骤的远程命令序列
    pub fn remote_commands(&self) -> Vec<RemoteCommand> {
        let local_artifact = self.workflow.artifact_path();
        DeployPlan {
            stop_service: &self.workflow.stop_service,
            start_service: &self.workflow.start_service,
            remote_dir: &self.remote_dir,
            binary_name: &self.workflow.binary,
            local_artifact: &local_artifact,
            verify_upload: self.workflow.verify_upload,
        }
        .commands(Utc::now())
    }

    /// 本地步骤的命令（checkout 为 git 序列，不在此列）
    pub fn local_command(&self, step: StepKind) -> Option<Vec<String>> {
        match step {
            StepKind::Toolchain => Some(self.workflow.toolchain_command()),
            StepKind::Dependencies => Some(self.workflow.dependencies_command.clone()),
            StepKind::Build => Some(self.workflow.build_command()),
            StepKind::Checkout | StepKind::Deploy => None,
        }
    }

    /// 执行整条流水线
    pub async fn run(&self, ctx: &PipelineContext, connector: &dyn Connector) -> PipelineRun {
        let mut run = PipelineRun::new(self.workflow.branch.clone());
        run.id = ctx.run_id.clone();

        ctx.log_stdout(&format!(
            "=== Starting pipeline {} (branch: {}) ===",
            run.id, self.workflow.branch
        ));
        tracing::info!(run_id = %run.id, branch = %self.workflow.branch, dry_run = ctx.dry_run, "Pipeline started");

        for step in StepKind::ALL {
            if self.options.skip.contains(&step) {
                run.stage_mut(step).skip(Some("skipped by request".to_string()));
                tracing::info!(run_id = %run.id, step = %step, "Step skipped");
                continue;
            }

            if ctx.is_cancelled() {
                return Self::cancel(ctx, run);
            }

            run.stage_mut(step).start();
            ctx.log_stdout(&format!("--- {} ---", step.display_name()));
            tracing::info!(run_id = %run.id, step = %step, "Step started");

            match self.execute_step(ctx, step, connector).await {
                Ok(()) => {
                    run.stage_mut(step).finish(true, None);
                    tracing::info!(
                        run_id = %run.id,
                        step = %step,
                        duration_ms = ?run.stage(step).duration_ms,
                        "Step finished"
                    );
                }
                Err(PipelineError::Cancelled) => {
                    run.stage_mut(step).finish(false, Some("cancelled".to_string()));
                    return Self::cancel(ctx, run);
                }
                Err(e) => {
                    tracing::error!(run_id = %run.id, step = %step, error = %e, "Step failed");
                    ctx.log_stderr(&format!("=== {} failed: {} ===", step.display_name(), e));
                    run.stage_mut(step).finish(false, Some(e.to_string()));
                    run.skip_pending("previous step failed");
                    run.complete(PipelineStatus::Failed);
                    return run;
                }
            }
        }

        ctx.log_stdout("=== Pipeline completed successfully ===");
        tracing::info!(run_id = %run.id, "Pipeline finished");
        run.complete(PipelineStatus::Success);
        run
    }

    fn cancel(ctx: &PipelineContext, mut run: PipelineRun) -> PipelineRun {
        tracing::warn!(run_id = %run.id, "Pipeline cancelled");
        ctx.log_stderr("=== Pipeline CANCELLED ===");
        run.skip_pending("cancelled");
        run.complete(PipelineStatus::Cancelled);
        run
    }

    async fn execute_step(
        &self,
        ctx: &PipelineContext,
        step: StepKind,
        connector: &dyn Connector,
    ) -> PipelineResult<()> {
        let work_dir = &self.options.work_dir;
        let timeout = self.options.step_timeout;

        match step {
            StepKind::Checkout => {
                local::checkout(ctx, work_dir, &self.workflow.branch, timeout).await
            }
            StepKind::Deploy => self.deploy(ctx, connector).await,
            local_step => {
                let command = self.local_command(local_step).unwrap_or_default();
                local::run_command(ctx, local_step, &command, work_dir, timeout).await
            }
        }
    }

    async fn deploy(&self, ctx: &PipelineContext, connector: &dyn Connector) -> PipelineResult<()> {
        let artifact_path = self.options.work_dir.join(self.workflow.artifact_path());

        let artifact = match tokio::fs::read(&artifact_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !ctx.dry_run {
                    return Err(PipelineError::ArtifactMissing(
                        artifact_path.display().to_string(),
                    ));
                }
                ctx.log_stderr(&format!(
                    "Artifact {} not found, continuing dry run",
                    artifact_path.display()
                ));
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let digest = deploy::sha256_hex(&artifact);
        ctx.log_stdout(&format!(
            "Artifact: {} ({} bytes, sha256 {})",
            artifact_path.display(),
            artifact.len(),
            digest
        ));
        tracing::info!(
            run_id = %ctx.run_id,
            artifact = %artifact_path.display(),
            size = artifact.len(),
            sha256 = %digest,
            "Deploying artifact"
        );

        let commands = self.remote_commands();
        let mut shell = connector.connect().await?;

        let outcome = deploy::execute(
            ctx,
            shell.as_mut(),
            &commands,
            &artifact,
            self.options.failure_policy,
        )
        .await;

        if let Err(e) = shell.close().await {
            tracing::warn!(run_id = %ctx.run_id, error = %e, "Failed to close remote session");
        }

        if outcome.cancelled {
            return Err(PipelineError::Cancelled);
        }
        if !outcome.success() {
            return Err(PipelineError::StepFailed {
                step: StepKind::Deploy,
                message: outcome.summary(),
            });
        }
        Ok(())
    }
}
