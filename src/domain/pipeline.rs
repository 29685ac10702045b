//! 流水线相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 流水线运行状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Running,
    Success,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Running => "running",
            PipelineStatus::Success => "success",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Cancelled => "cancelled",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineStatus::Running)
    }
}

/// 流水线步骤
///
/// 顺序固定：checkout → toolchain → dependencies → build → deploy
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Checkout,
    Toolchain,
    Dependencies,
    Build,
    Deploy,
}

impl StepKind {
    /// 全部步骤，按执行顺序
    pub const ALL: [StepKind; 5] = [
        StepKind::Checkout,
        StepKind::Toolchain,
        StepKind::Dependencies,
        StepKind::Build,
        StepKind::Deploy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Checkout => "checkout",
            StepKind::Toolchain => "toolchain",
            StepKind::Dependencies => "dependencies",
            StepKind::Build => "build",
            StepKind::Deploy => "deploy",
        }
    }

    /// 显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            StepKind::Checkout => "Checkout",
            StepKind::Toolchain => "Toolchain Setup",
            StepKind::Dependencies => "Install Dependencies",
            StepKind::Build => "Build",
            StepKind::Deploy => "Deploy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "checkout" => Some(StepKind::Checkout),
            "toolchain" => Some(StepKind::Toolchain),
            "dependencies" | "deps" => Some(StepKind::Dependencies),
            "build" => Some(StepKind::Build),
            "deploy" => Some(StepKind::Deploy),
            _ => None,
        }
    }

    /// 是否在本地执行
    pub fn is_local(&self) -> bool {
        !matches!(self, StepKind::Deploy)
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// 流水线阶段信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineStage {
    pub step: StepKind,
    pub display_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    pub message: Option<String>,
}

impl PipelineStage {
    /// 创建新的待执行阶段
    pub fn new(step: StepKind) -> Self {
        Self {
            step,
            display_name: step.display_name().to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行阶段
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成阶段
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    /// 跳过阶段
    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }
}

/// 一次流水线运行记录
#[derive(Clone, Debug, Serialize)]
pub struct PipelineRun {
    pub id: String,
    pub branch: String,
    pub status: PipelineStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<PipelineStage>,
}

impl PipelineRun {
    /// 创建新运行记录，所有步骤初始为 pending
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            branch: branch.into(),
            status: PipelineStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            stages: StepKind::ALL.iter().map(|s| PipelineStage::new(*s)).collect(),
        }
    }

    /// 获取指定步骤的阶段
    pub fn stage_mut(&mut self, step: StepKind) -> &mut PipelineStage {
        let idx = StepKind::ALL
            .iter()
            .position(|s| *s == step)
            .unwrap_or_default();
        &mut self.stages[idx]
    }

    pub fn stage(&self, step: StepKind) -> &PipelineStage {
        let idx = StepKind::ALL
            .iter()
            .position(|s| *s == step)
            .unwrap_or_default();
        &self.stages[idx]
    }

    /// 将所有仍为 pending 的阶段标记为跳过
    pub fn skip_pending(&mut self, reason: &str) {
        for stage in self.stages.iter_mut() {
            if stage.status == StageStatus::Pending {
                stage.skip(Some(reason.to_string()));
            }
        }
    }

    /// 设置运行完成
    pub fn complete(&mut self, status: PipelineStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// 日志行
#[derive(Clone, Debug, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: String, // stdout | stderr
    pub content: String,
}

impl LogLine {
    /// 创建新日志行
    pub fn new(stream: &str, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream: stream.to_string(),
            content: content.into(),
        }
    }

    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new("stdout", content)
    }

    pub fn stderr(content: impl Into<String>) -> Self {
        Self::new("stderr", content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_status_as_str() {
        assert_eq!(PipelineStatus::Running.as_str(), "running");
        assert_eq!(PipelineStatus::Success.as_str(), "success");
        assert_eq!(PipelineStatus::Failed.as_str(), "failed");
        assert_eq!(PipelineStatus::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn test_pipeline_status_is_terminal() {
        assert!(!PipelineStatus::Running.is_terminal());
        assert!(PipelineStatus::Success.is_terminal());
        assert!(PipelineStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_step_order() {
        let names: Vec<_> = StepKind::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["checkout", "toolchain", "dependencies", "build", "deploy"]
        );
        assert!(StepKind::Build.is_local());
        assert!(!StepKind::Deploy.is_local());
    }

    #[test]
    fn test_step_from_str() {
        assert_eq!(StepKind::from_str("deps"), Some(StepKind::Dependencies));
        assert_eq!(StepKind::from_str("Deploy"), Some(StepKind::Deploy));
        assert_eq!(StepKind::from_str("publish"), None);
    }

    #[test]
    fn test_stage_lifecycle() {
        let mut stage = PipelineStage::new(StepKind::Build);
        assert_eq!(stage.status, StageStatus::Pending);

        stage.start();
        assert_eq!(stage.status, StageStatus::Running);
        assert!(stage.started_at.is_some());

        stage.finish(false, Some("exit code 101".to_string()));
        assert_eq!(stage.status, StageStatus::Failed);
        assert!(stage.duration_ms.is_some());
    }

    #[test]
    fn test_run_skip_pending() {
        let mut run = PipelineRun::new("main");
        run.stage_mut(StepKind::Checkout).start();
        run.stage_mut(StepKind::Checkout).finish(false, None);
        run.skip_pending("previous step failed");

        assert_eq!(run.stage(StepKind::Checkout).status, StageStatus::Failed);
        for step in &StepKind::ALL[1..] {
            assert_eq!(run.stage(*step).status, StageStatus::Skipped);
        }
    }

    #[test]
    fn test_log_line_creation() {
        let line = LogLine::stdout("Compiling bye-watch");
        assert_eq!(line.stream, "stdout");

        let line = LogLine::stderr("error: linker not found");
        assert_eq!(line.stream, "stderr");
        assert_eq!(line.content, "error: linker not found");
    }
}
