//! 领域模型模块
//!
//! 纯数据结构，不依赖配置与执行层

pub mod pipeline;
pub mod remote;

pub use pipeline::{LogLine, PipelineRun, PipelineStage, PipelineStatus, StageStatus, StepKind};
pub use remote::{DeployPlan, RemoteCommand};
