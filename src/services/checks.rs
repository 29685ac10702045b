//! 工作流结构检查
//!
//! 只报告，不修正。例如停止的服务与启动的服务不一致时给出警告，但保留原配置。

use serde::Serialize;

use crate::config::{RemoteSettings, Workflow};

/// 严重程度
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// 检查结果
#[derive(Clone, Debug, Serialize)]
pub struct Finding {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn error(code: &'static str, message: String) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message,
        }
    }

    fn warning(code: &'static str, message: String) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            message,
        }
    }
}

/// 检查工作流定义
pub fn check_workflow(workflow: &Workflow) -> Vec<Finding> {
    let mut findings = Vec::new();

    match (workflow.build_target(), workflow.artifact_target()) {
        (Some(build), Some(artifact)) if build != artifact => findings.push(Finding::error(
            "target-triple",
            format!(
                "build targets {} but the deploy step copies {} (built for {})",
                build,
                workflow.artifact_path(),
                artifact
            ),
        )),
        (Some(build), None) => findings.push(Finding::error(
            "target-triple",
            format!(
                "build targets {} but artifact path {} has no target directory",
                build,
                workflow.artifact_path()
            ),
        )),
        (None, Some(artifact)) => findings.push(Finding::error(
            "target-triple",
            format!(
                "artifact path expects target {} but the build command passes no --target",
                artifact
            ),
        )),
        _ => {}
    }

    if workflow.artifact_file_name().as_deref() != Some(workflow.binary.as_str()) {
        findings.push(Finding::error(
            "artifact-name",
            format!(
                "artifact {} does not match remote binary name {}",
                workflow.artifact_path(),
                workflow.binary
            ),
        ));
    }

    if workflow.stop_service != workflow.start_service {
        findings.push(Finding::warning(
            "service-mismatch",
            format!(
                "deploy stops {} but starts {}; the stopped service stays down",
                workflow.stop_service, workflow.start_service
            ),
        ));
    }

    if workflow.build_command().is_empty() {
        findings.push(Finding::error("build-command", "build command is empty".to_string()));
    }

    if workflow.toolchain_command().is_empty() {
        findings.push(Finding::error(
            "toolchain-command",
            "toolchain command is empty".to_string(),
        ));
    }

    if workflow.dependencies_command.is_empty() {
        findings.push(Finding::error(
            "dependencies-command",
            "dependencies command is empty".to_string(),
        ));
    }

    findings
}

/// 检查远程目标配置
pub fn check_remote(settings: &RemoteSettings) -> Vec<Finding> {
    let mut findings = Vec::new();

    let missing = settings.missing();
    if !missing.is_empty() {
        findings.push(Finding::error(
            "remote-config",
            format!("missing {}", missing.join(", ")),
        ));
    }

    if let Some(ref path) = settings.path {
        if !path.starts_with('/') {
            findings.push(Finding::warning(
                "remote-path",
                format!("DEPLOY_PATH {} is relative to the login directory", path),
            ));
        }
    }

    if settings.host_fingerprint.is_none() {
        findings.push(Finding::warning(
            "host-key",
            "DEPLOY_HOST_FINGERPRINT not set; any host key will be accepted".to_string(),
        ));
    }

    findings
}

/// 是否存在错误级别的结果
pub fn has_errors(findings: &[Finding]) -> bool {
    findings.iter().any(|f| f.severity == Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(findings: &[Finding]) -> Vec<&'static str> {
        findings.iter().map(|f| f.code).collect()
    }

    #[test]
    fn test_default_workflow_flags_service_mismatch_only() {
        let findings = check_workflow(&Workflow::default());

        assert_eq!(codes(&findings), vec!["service-mismatch"]);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert!(findings[0].message.contains("bye-watch.service"));
        assert!(findings[0].message.contains("budu.service"));
        assert!(!has_errors(&findings));
    }

    #[test]
    fn test_consistent_workflow_is_clean() {
        let workflow = Workflow {
            start_service: "bye-watch.service".to_string(),
            ..Default::default()
        };
        assert!(check_workflow(&workflow).is_empty());
    }

    #[test]
    fn test_target_mismatch_is_error() {
        let workflow = Workflow {
            artifact: Some("target/aarch64-unknown-linux-musl/release/bye-watch".to_string()),
            ..Default::default()
        };
        let findings = check_workflow(&workflow);

        assert!(codes(&findings).contains(&"target-triple"));
        assert!(has_errors(&findings));
    }

    #[test]
    fn test_build_without_target_flag() {
        let workflow = Workflow {
            build_command: Some(vec!["cargo".into(), "build".into(), "--release".into()]),
            ..Default::default()
        };
        let findings = check_workflow(&workflow);
        assert!(findings
            .iter()
            .any(|f| f.code == "target-triple" && f.message.contains("no --target")));
    }

    #[test]
    fn test_artifact_name_mismatch() {
        let workflow = Workflow {
            artifact: Some("target/x86_64-unknown-linux-musl/release/budu".to_string()),
            ..Default::default()
        };
        assert!(codes(&check_workflow(&workflow)).contains(&"artifact-name"));
    }

    #[test]
    fn test_empty_setup_commands_are_errors() {
        let workflow = Workflow::from_toml(
            r#"
            start_service = "bye-watch.service"
            dependencies_command = []
            toolchain_command = []
            "#,
        )
        .unwrap();
        let findings = check_workflow(&workflow);

        assert_eq!(
            codes(&findings),
            vec!["toolchain-command", "dependencies-command"]
        );
        assert!(has_errors(&findings));
    }

    #[test]
    fn test_check_remote() {
        let findings = check_remote(&RemoteSettings::default());
        assert!(has_errors(&findings));
        assert!(findings[0].message.contains("DEPLOY_HOST"));

        let settings = RemoteSettings {
            host: Some("10.0.0.5".into()),
            port: 22,
            user: Some("deploy".into()),
            password: Some("secret".into()),
            path: Some("apps/bye-watch".into()),
            host_fingerprint: Some("SHA256:abc".into()),
        };
        let findings = check_remote(&settings);
        assert_eq!(codes(&findings), vec!["remote-path"]);
        assert!(!has_errors(&findings));
    }
}
