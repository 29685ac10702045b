//! 工作流定义
//!
//! 默认值即 bye-watch 的部署流程；可通过 TOML 文件覆盖任意字段。

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// 工作流定义
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Workflow {
    /// 触发部署的分支
    pub branch: String,
    /// 编译目标三元组
    pub target: String,
    /// 二进制名称（本地产物与远程文件同名）
    pub binary: String,
    /// 构建命令（默认 `cargo build --release --target <target>`）
    pub build_command: Option<Vec<String>>,
    /// 工具链准备命令（默认 `rustup target add <target>`）
    pub toolchain_command: Option<Vec<String>>,
    /// 依赖安装命令
    pub dependencies_command: Vec<String>,
    /// 本地产物路径（相对工作目录），默认 `target/<target>/release/<binary>`
    pub artifact: Option<String>,
    /// 部署前停止的服务单元
    pub stop_service: String,
    /// 部署后启动的服务单元
    pub start_service: String,
    /// 复制后执行远程 sha256sum 校验
    pub verify_upload: bool,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            target: "x86_64-unknown-linux-musl".to_string(),
            binary: "bye-watch".to_string(),
            build_command: None,
            toolchain_command: None,
            dependencies_command: ["sudo", "apt-get", "install", "-y", "musl-tools"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            artifact: None,
            stop_service: "bye-watch.service".to_string(),
            // 与 stop_service 不一致，保持原样，由 check 报告
            start_service: "budu.service".to_string(),
            verify_upload: false,
        }
    }
}

impl Workflow {
    /// 加载工作流，未提供文件时使用默认值
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 实际使用的构建命令
    pub fn build_command(&self) -> Vec<String> {
        self.build_command.clone().unwrap_or_else(|| {
            vec![
                "cargo".to_string(),
                "build".to_string(),
                "--release".to_string(),
                "--target".to_string(),
                self.target.clone(),
            ]
        })
    }

    /// 实际使用的工具链命令
    pub fn toolchain_command(&self) -> Vec<String> {
        self.toolchain_command.clone().unwrap_or_else(|| {
            vec![
                "rustup".to_string(),
                "target".to_string(),
                "add".to_string(),
                self.target.clone(),
            ]
        })
    }

    /// 本地产物路径（相对工作目录）
    pub fn artifact_path(&self) -> String {
        self.artifact
            .clone()
            .unwrap_or_else(|| format!("target/{}/release/{}", self.target, self.binary))
    }

    /// 构建命令中 `--target` 指定的三元组
    pub fn build_target(&self) -> Option<String> {
        let command = self.build_command();
        let mut args = command.iter();
        while let Some(arg) = args.next() {
            if arg == "--target" {
                return args.next().cloned();
            }
            if let Some(triple) = arg.strip_prefix("--target=") {
                return Some(triple.to_string());
            }
        }
        None
    }

    /// 产物路径中 `target/` 之后的三元组
    pub fn artifact_target(&self) -> Option<String> {
        let path = self.artifact_path();
        let mut parts = path.split('/').skip_while(|p| *p != "target");
        parts.next()?;
        let triple = parts.next()?;
        // target/release/<bin> 表示宿主三元组
        if triple == "release" || triple == "debug" {
            return None;
        }
        Some(triple.to_string())
    }

    /// 产物文件名
    pub fn artifact_file_name(&self) -> Option<String> {
        self.artifact_path()
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_deploy_workflow() {
        let wf = Workflow::default();
        assert_eq!(wf.branch, "main");
        assert_eq!(
            wf.build_command().join(" "),
            "cargo build --release --target x86_64-unknown-linux-musl"
        );
        assert_eq!(
            wf.toolchain_command().join(" "),
            "rustup target add x86_64-unknown-linux-musl"
        );
        assert_eq!(
            wf.artifact_path(),
            "target/x86_64-unknown-linux-musl/release/bye-watch"
        );
        assert_eq!(wf.stop_service, "bye-watch.service");
        assert_eq!(wf.start_service, "budu.service");
        assert!(!wf.verify_upload);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let wf = Workflow::from_toml(
            r#"
            start_service = "bye-watch.service"
            verify_upload = true
            "#,
        )
        .unwrap();

        assert_eq!(wf.start_service, "bye-watch.service");
        assert!(wf.verify_upload);
        assert_eq!(wf.binary, "bye-watch");
        assert_eq!(wf.target, "x86_64-unknown-linux-musl");
    }

    #[test]
    fn test_target_override_flows_into_commands() {
        let wf = Workflow::from_toml(r#"target = "aarch64-unknown-linux-musl""#).unwrap();
        assert_eq!(wf.build_target().as_deref(), Some("aarch64-unknown-linux-musl"));
        assert_eq!(wf.artifact_target().as_deref(), Some("aarch64-unknown-linux-musl"));
    }

    #[test]
    fn test_build_target_equals_form() {
        let wf = Workflow {
            build_command: Some(vec![
                "cargo".into(),
                "build".into(),
                "--target=armv7-unknown-linux-gnueabihf".into(),
            ]),
            ..Default::default()
        };
        assert_eq!(
            wf.build_target().as_deref(),
            Some("armv7-unknown-linux-gnueabihf")
        );
    }

    #[test]
    fn test_artifact_target_host_build() {
        let wf = Workflow {
            artifact: Some("target/release/bye-watch".into()),
            ..Default::default()
        };
        assert_eq!(wf.artifact_target(), None);
        assert_eq!(wf.artifact_file_name().as_deref(), Some("bye-watch"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Workflow::from_toml("verify_upload = \"yes\"").is_err());
    }
}
