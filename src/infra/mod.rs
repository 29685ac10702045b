//! 基础设施模块
//!
//! 封装外部依赖（本地进程、SSH）

pub mod command;
pub mod remote;
pub mod ssh;

pub use command::CommandRunner;
pub use remote::{Connector, DryRunConnector, RemoteShell};
pub use ssh::SshConnector;
