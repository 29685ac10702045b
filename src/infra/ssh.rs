//! SSH 远程 shell（russh 客户端）
//!
//! 密码认证；每条命令使用独立的 exec channel。上传通过 `cat >` 写入 stdin 完成。

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::env::constants::{REMOTE_COMMAND_TIMEOUT_SECS, SSH_CONNECT_TIMEOUT_SECS};
use crate::config::RemoteTarget;
use crate::domain::remote::shell_quote;
use crate::error::RemoteError;
use crate::infra::remote::{Connector, RemoteOutput, RemoteShell};

/// 主机密钥校验
struct ClientHandler {
    expected_fingerprint: Option<String>,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = RemoteError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let actual = server_public_key.fingerprint();
        match self.expected_fingerprint {
            Some(ref expected) if normalize_fingerprint(expected) != actual => {
                Err(RemoteError::HostKeyMismatch {
                    expected: expected.clone(),
                    actual,
                })
            }
            Some(_) => Ok(true),
            None => {
                warn!(fingerprint = %actual, "Accepting unpinned host key, set DEPLOY_HOST_FINGERPRINT to pin it");
                Ok(true)
            }
        }
    }
}

/// 去掉 "SHA256:" 前缀与 base64 填充
fn normalize_fingerprint(s: &str) -> &str {
    s.trim()
        .strip_prefix("SHA256:")
        .unwrap_or(s.trim())
        .trim_end_matches('=')
}

/// exec channel 上收集到的输出
#[derive(Debug, Default)]
struct ChannelOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_status: Option<u32>,
}

impl ChannelOutput {
    fn push(&mut self, msg: ChannelMsg) {
        match msg {
            ChannelMsg::Data { ref data } => self.stdout.extend_from_slice(&data[..]),
            // ext 1 即 SSH_EXTENDED_DATA_STDERR
            ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                self.stderr.extend_from_slice(&data[..])
            }
            ChannelMsg::ExitStatus { exit_status } => self.exit_status = Some(exit_status),
            _ => {}
        }
    }

    fn finish(self) -> RemoteOutput {
        RemoteOutput {
            // 没有退出状态（例如被信号终止）视为失败
            exit_status: self.exit_status.unwrap_or(255),
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        }
    }
}

/// SSH shell
pub struct SshShell {
    handle: Handle<ClientHandler>,
    command_timeout: Duration,
}

impl SshShell {
    /// 连接并认证
    pub async fn connect(target: &RemoteTarget) -> Result<Self, RemoteError> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(Duration::from_secs(REMOTE_COMMAND_TIMEOUT_SECS)),
            ..Default::default()
        });
        let handler = ClientHandler {
            expected_fingerprint: target.host_fingerprint.clone(),
        };

        info!(addr = %target.address(), user = %target.user, "Connecting to target host");

        let connect = client::connect(config, (target.host.as_str(), target.port), handler);
        let mut handle = tokio::time::timeout(Duration::from_secs(SSH_CONNECT_TIMEOUT_SECS), connect)
            .await
            .map_err(|_| RemoteError::Timeout(format!("connect to {}", target.address())))??;

        let authenticated = handle
            .authenticate_password(target.user.as_str(), target.password.as_str())
            .await?;
        if !authenticated {
            return Err(RemoteError::AuthFailed(target.user.clone()));
        }

        debug!(addr = %target.address(), "SSH session authenticated");

        Ok(Self {
            handle,
            command_timeout: Duration::from_secs(REMOTE_COMMAND_TIMEOUT_SECS),
        })
    }

    /// 在新 channel 上执行命令，可选写入 stdin
    async fn run_channel(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<RemoteOutput, RemoteError> {
        let run = async {
            let mut channel = self.handle.channel_open_session().await?;
            channel.exec(true, command).await?;

            if let Some(data) = stdin {
                channel.data(data).await?;
                channel.eof().await?;
            }

            let mut output = ChannelOutput::default();
            while let Some(msg) = channel.wait().await {
                output.push(msg);
            }

            Ok::<_, RemoteError>(output.finish())
        };

        tokio::time::timeout(self.command_timeout, run)
            .await
            .map_err(|_| RemoteError::Timeout(command.to_string()))?
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn exec(&mut self, command: &str) -> Result<RemoteOutput, RemoteError> {
        self.run_channel(command, None).await
    }

    async fn upload(
        &mut self,
        contents: &[u8],
        remote_path: &str,
    ) -> Result<RemoteOutput, RemoteError> {
        let quoted = shell_quote(remote_path);
        let command = format!("cat > {} && chmod 755 {}", quoted, quoted);
        self.run_channel(&command, Some(contents)).await
    }

    async fn close(&mut self) -> Result<(), RemoteError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "deploy finished", "en")
            .await?;
        Ok(())
    }
}

/// SSH 连接器
pub struct SshConnector {
    target: RemoteTarget,
}

impl SshConnector {
    pub fn new(target: RemoteTarget) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteShell>, RemoteError> {
        let shell = SshShell::connect(&self.target).await?;
        Ok(Box::new(shell))
    }
}
