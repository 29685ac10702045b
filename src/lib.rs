//! bye-watch deploy - 构建并部署 bye-watch 到目标主机
//!
//! 流水线：checkout → toolchain → dependencies → build → deploy

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;

pub use config::{RemoteSettings, RemoteTarget, Workflow};
pub use error::{ConfigError, PipelineError, RemoteError};
pub use services::pipeline::{Pipeline, PipelineContext, PipelineOptions};
