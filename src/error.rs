//! 统一错误处理
//!
//! 按层划分错误类型：配置、远程执行、流水线。`main` 只在边界处转成 `anyhow`。

use thiserror::Error;

use crate::domain::pipeline::StepKind;
use crate::infra::command::CommandError;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<&'static str>),

    #[error("failed to read workflow file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 远程执行错误
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("authentication failed for user {0}")]
    AuthFailed(String),

    #[error("host key fingerprint mismatch: expected {expected}, got {actual}")]
    HostKeyMismatch { expected: String, actual: String },

    #[error("timed out: {0}")]
    Timeout(String),
}

/// 流水线错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("step {step} failed: {message}")]
    StepFailed { step: StepKind, message: String },

    #[error("artifact not found at {0}")]
    ArtifactMissing(String),

    #[error("pipeline cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 便捷类型别名
pub type PipelineResult<T> = Result<T, PipelineError>;
