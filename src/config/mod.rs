//! 配置模块
//!
//! 环境变量（远程目标 secret）与工作流定义

pub mod env;
pub mod workflow;

pub use env::{RemoteSettings, RemoteTarget};
pub use workflow::Workflow;
