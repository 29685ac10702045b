//! 远程部署命令模型
//!
//! 部署步骤是固定的远程命令序列：停止服务、归档旧二进制、复制新二进制、启动服务。

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 归档后缀的时间格式
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// 远程命令
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteCommand {
    /// 停止服务单元
    StopService { unit: String },
    /// 重命名旧二进制（保留，不删除）
    ArchiveBinary { from: String, to: String },
    /// 复制新二进制到目标路径
    CopyBinary { local: String, remote: String },
    /// 启动服务单元
    StartService { unit: String },
    /// 校验远程文件 SHA-256
    VerifyChecksum { remote: String },
}

impl RemoteCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCommand::StopService { .. } => "stop_service",
            RemoteCommand::ArchiveBinary { .. } => "archive_binary",
            RemoteCommand::CopyBinary { .. } => "copy_binary",
            RemoteCommand::StartService { .. } => "start_service",
            RemoteCommand::VerifyChecksum { .. } => "verify_checksum",
        }
    }

    /// 渲染为远程 shell 命令
    ///
    /// `CopyBinary` 不是 shell 命令，由 `RemoteShell::upload` 执行，返回 None
    pub fn shell_command(&self) -> Option<String> {
        match self {
            RemoteCommand::StopService { unit } => {
                Some(format!("sudo systemctl stop {}", shell_quote(unit)))
            }
            RemoteCommand::ArchiveBinary { from, to } => {
                Some(format!("mv {} {}", shell_quote(from), shell_quote(to)))
            }
            RemoteCommand::CopyBinary { .. } => None,
            RemoteCommand::StartService { unit } => {
                Some(format!("sudo systemctl start {}", shell_quote(unit)))
            }
            RemoteCommand::VerifyChecksum { remote } => {
                Some(format!("sha256sum {}", shell_quote(remote)))
            }
        }
    }

    /// 人类可读描述（用于日志与 plan 输出）
    pub fn describe(&self) -> String {
        match self {
            RemoteCommand::CopyBinary { local, remote } => format!("copy {} -> {}", local, remote),
            other => other.shell_command().unwrap_or_default(),
        }
    }
}

/// 部署计划参数
#[derive(Clone, Debug)]
pub struct DeployPlan<'a> {
    pub stop_service: &'a str,
    pub start_service: &'a str,
    pub remote_dir: &'a str,
    pub binary_name: &'a str,
    pub local_artifact: &'a str,
    pub verify_upload: bool,
}

impl DeployPlan<'_> {
    /// 远程二进制完整路径
    pub fn remote_binary(&self) -> String {
        join_remote(self.remote_dir, self.binary_name)
    }

    /// 生成命令序列
    ///
    /// 顺序固定为 stop → archive → copy → start，`verify_upload` 时在 copy 之后追加校验
    pub fn commands(&self, now: DateTime<Utc>) -> Vec<RemoteCommand> {
        let remote = self.remote_binary();
        let archived = format!("{}_{}", remote, now.format(ARCHIVE_TIMESTAMP_FORMAT));

        let mut commands = vec![
            RemoteCommand::StopService {
                unit: self.stop_service.to_string(),
            },
            RemoteCommand::ArchiveBinary {
                from: remote.clone(),
                to: archived,
            },
            RemoteCommand::CopyBinary {
                local: self.local_artifact.to_string(),
                remote: remote.clone(),
            },
        ];
        if self.verify_upload {
            commands.push(RemoteCommand::VerifyChecksum { remote });
        }
        commands.push(RemoteCommand::StartService {
            unit: self.start_service.to_string(),
        });
        commands
    }
}

/// 拼接远程目录与文件名
pub fn join_remote(dir: &str, file: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), file)
}

/// 单引号转义，供远程 shell 使用
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '@' | ':'))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan() -> DeployPlan<'static> {
        DeployPlan {
            stop_service: "bye-watch.service",
            start_service: "budu.service",
            remote_dir: "/opt/bye-watch/",
            binary_name: "bye-watch",
            local_artifact: "target/x86_64-unknown-linux-musl/release/bye-watch",
            verify_upload: false,
        }
    }

    #[test]
    fn test_default_sequence() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 5).unwrap();
        let commands = plan().commands(now);

        let rendered: Vec<_> = commands.iter().map(|c| c.describe()).collect();
        assert_eq!(
            rendered,
            vec![
                "sudo systemctl stop bye-watch.service".to_string(),
                "mv /opt/bye-watch/bye-watch /opt/bye-watch/bye-watch_20261019083005".to_string(),
                "copy target/x86_64-unknown-linux-musl/release/bye-watch -> /opt/bye-watch/bye-watch"
                    .to_string(),
                "sudo systemctl start budu.service".to_string(),
            ]
        );
    }

    #[test]
    fn test_verify_inserted_before_start() {
        let mut p = plan();
        p.verify_upload = true;
        let commands = p.commands(Utc::now());
        let names: Vec<_> = commands.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec![
                "stop_service",
                "archive_binary",
                "copy_binary",
                "verify_checksum",
                "start_service"
            ]
        );
    }

    #[test]
    fn test_copy_has_no_shell_command() {
        let copy = RemoteCommand::CopyBinary {
            local: "a".into(),
            remote: "/b".into(),
        };
        assert!(copy.shell_command().is_none());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/opt/bye-watch"), "/opt/bye-watch");
        assert_eq!(shell_quote("/srv/my app"), "'/srv/my app'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/opt/app", "bye-watch"), "/opt/app/bye-watch");
        assert_eq!(join_remote("/opt/app/", "bye-watch"), "/opt/app/bye-watch");
        assert_eq!(join_remote("/", "bye-watch"), "/bye-watch");
    }
}
