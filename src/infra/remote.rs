//! 远程 shell 抽象
//!
//! 部署步骤只依赖 `RemoteShell`，真实实现为 SSH，dry-run 时只记录命令。

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::error::RemoteError;

/// 远程命令输出
#[derive(Clone, Debug, Default)]
pub struct RemoteOutput {
    pub exit_status: u32,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// 远程 shell
#[async_trait]
pub trait RemoteShell: Send {
    /// 执行 shell 命令
    async fn exec(&mut self, command: &str) -> Result<RemoteOutput, RemoteError>;

    /// 上传文件内容到远程路径并设为可执行
    async fn upload(&mut self, contents: &[u8], remote_path: &str)
        -> Result<RemoteOutput, RemoteError>;

    /// 关闭连接
    async fn close(&mut self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// 远程 shell 连接器
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteShell>, RemoteError>;
}

/// Dry-run shell：不连接主机，只记录命令
#[derive(Clone, Default)]
pub struct DryRunShell {
    recorded: Arc<Mutex<Vec<String>>>,
}

impl DryRunShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的命令
    pub fn recorded(&self) -> Vec<String> {
        self.recorded
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn record(&self, entry: String) {
        info!(command = %entry, "[dry-run] remote");
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(entry);
        }
    }
}

#[async_trait]
impl RemoteShell for DryRunShell {
    async fn exec(&mut self, command: &str) -> Result<RemoteOutput, RemoteError> {
        self.record(command.to_string());
        Ok(RemoteOutput::default())
    }

    async fn upload(
        &mut self,
        contents: &[u8],
        remote_path: &str,
    ) -> Result<RemoteOutput, RemoteError> {
        self.record(format!("upload {} bytes -> {}", contents.len(), remote_path));
        Ok(RemoteOutput::default())
    }
}

/// Dry-run 连接器
#[derive(Clone, Default)]
pub struct DryRunConnector {
    shell: DryRunShell,
}

impl DryRunConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 本连接器产生的所有 shell 共享的记录
    pub fn recorded(&self) -> Vec<String> {
        self.shell.recorded()
    }
}

#[async_trait]
impl Connector for DryRunConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteShell>, RemoteError> {
        Ok(Box::new(self.shell.clone()))
    }
}
