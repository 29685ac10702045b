//! 环境变量配置加载
//!
//! 目标主机的四个必需参数（host / user / password / path）以 secret 形式通过环境变量提供。

use std::env;
use std::fmt;
use tracing::warn;

use crate::error::ConfigError;

/// 远程目标设置（原始值，可能不完整）
#[derive(Clone, Default)]
pub struct RemoteSettings {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub path: Option<String>,
    /// 固定服务器公钥指纹（SHA256，可带 "SHA256:" 前缀）
    pub host_fingerprint: Option<String>,
}

/// 完整的远程目标
#[derive(Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub path: String,
    pub host_fingerprint: Option<String>,
}

impl RemoteSettings {
    /// 从环境变量加载
    pub fn from_env() -> Self {
        let host = load_with_fallback("DEPLOY_HOST", "REMOTE_HOST");
        let user = load_with_fallback("DEPLOY_USER", "REMOTE_USER");
        let password = load_with_fallback("DEPLOY_PASSWORD", "REMOTE_PASSWORD");
        let path = load_with_fallback("DEPLOY_PATH", "REMOTE_PATH");

        if ["REMOTE_HOST", "REMOTE_USER", "REMOTE_PASSWORD", "REMOTE_PATH"]
            .iter()
            .any(|k| env::var(k).is_ok())
        {
            warn!("Deprecated REMOTE_* variables detected. Please use DEPLOY_HOST, DEPLOY_USER, DEPLOY_PASSWORD and DEPLOY_PATH");
        }

        let port = match env::var("DEPLOY_PORT") {
            Ok(v) => v.parse().unwrap_or_else(|_| {
                warn!(value = %v, "Invalid DEPLOY_PORT, falling back to 22");
                constants::DEFAULT_SSH_PORT
            }),
            Err(_) => constants::DEFAULT_SSH_PORT,
        };

        let host_fingerprint = env::var("DEPLOY_HOST_FINGERPRINT")
            .ok()
            .filter(|s| !s.is_empty());

        Self {
            host,
            port,
            user,
            password,
            path,
            host_fingerprint,
        }
    }

    /// 缺失的必需变量
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.is_none() {
            missing.push("DEPLOY_HOST");
        }
        if self.user.is_none() {
            missing.push("DEPLOY_USER");
        }
        if self.password.is_none() {
            missing.push("DEPLOY_PASSWORD");
        }
        if self.path.is_none() {
            missing.push("DEPLOY_PATH");
        }
        missing
    }

    /// 校验并转换为完整目标
    pub fn require(&self) -> Result<RemoteTarget, ConfigError> {
        match (&self.host, &self.user, &self.password, &self.path) {
            (Some(host), Some(user), Some(password), Some(path)) => Ok(RemoteTarget {
                host: host.clone(),
                port: self.port,
                user: user.clone(),
                password: password.clone(),
                path: path.clone(),
                host_fingerprint: self.host_fingerprint.clone(),
            }),
            _ => Err(ConfigError::MissingEnv(self.missing())),
        }
    }
}

impl RemoteTarget {
    /// host:port
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("path", &self.path)
            .field("host_fingerprint", &self.host_fingerprint)
            .finish()
    }
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("path", &self.path)
            .field("host_fingerprint", &self.host_fingerprint)
            .finish()
    }
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| env::var(fallback).ok())
        .filter(|s| !s.is_empty())
}

/// 常量
pub mod constants {
    /// 默认 SSH 端口
    pub const DEFAULT_SSH_PORT: u16 = 22;

    /// 本地步骤默认超时（秒）
    pub const STEP_TIMEOUT_SECS: u64 = 1800; // 30 分钟

    /// SSH 连接超时（秒）
    pub const SSH_CONNECT_TIMEOUT_SECS: u64 = 30;

    /// 单条远程命令超时（秒）
    pub const REMOTE_COMMAND_TIMEOUT_SECS: u64 = 300;

    /// 日志通道容量
    pub const LOG_CHANNEL_CAPACITY: usize = 256;

    /// 进程结束后等待输出读取完成的宽限期（秒）
    pub const LOG_DRAIN_GRACE_SECS: u64 = 2;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_with_fallback() {
        env::set_var("BWD_TEST_PRIMARY", "primary_value");
        env::set_var("BWD_TEST_FALLBACK", "fallback_value");

        assert_eq!(
            load_with_fallback("BWD_TEST_PRIMARY", "BWD_TEST_FALLBACK"),
            Some("primary_value".to_string())
        );

        env::remove_var("BWD_TEST_PRIMARY");
        assert_eq!(
            load_with_fallback("BWD_TEST_PRIMARY", "BWD_TEST_FALLBACK"),
            Some("fallback_value".to_string())
        );

        env::set_var("BWD_TEST_FALLBACK", "");
        assert_eq!(load_with_fallback("BWD_TEST_PRIMARY", "BWD_TEST_FALLBACK"), None);
        env::remove_var("BWD_TEST_FALLBACK");
    }

    #[test]
    fn test_require_reports_all_missing() {
        let settings = RemoteSettings {
            host: Some("10.0.0.5".to_string()),
            port: 22,
            path: Some("/opt/bye-watch".to_string()),
            ..Default::default()
        };

        match settings.require() {
            Err(ConfigError::MissingEnv(missing)) => {
                assert_eq!(missing, vec!["DEPLOY_USER", "DEPLOY_PASSWORD"]);
            }
            other => panic!("unexpected result: {:?}", other.map(|t| t.address())),
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let target = RemoteTarget {
            host: "10.0.0.5".to_string(),
            port: 2222,
            user: "deploy".to_string(),
            password: "hunter2".to_string(),
            path: "/opt/bye-watch".to_string(),
            host_fingerprint: None,
        };
        let printed = format!("{:?}", target);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
        assert_eq!(target.address(), "10.0.0.5:2222");
    }
}
