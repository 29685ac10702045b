//! 命令执行器
//!
//! 提供统一的本地命令执行接口，支持：
//! - 实时日志流式输出
//! - 超时控制
//! - 取消支持
//! - stdout/stderr 分离

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::env::constants::LOG_DRAIN_GRACE_SECS;
use crate::domain::pipeline::LogLine;

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 空命令
    Empty,
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 命令超时
    Timeout,
    /// 命令被取消
    Cancelled,
    /// 等待命令完成失败
    WaitFailed(std::io::Error),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Empty => write!(f, "Empty command"),
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::Timeout => write!(f, "Command timed out"),
            CommandError::Cancelled => write!(f, "Command was cancelled"),
            CommandError::WaitFailed(e) => write!(f, "Failed to wait for command: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e) | CommandError::WaitFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// 命令执行结果
#[derive(Debug)]
pub struct CommandResult {
    /// 退出状态
    pub status: ExitStatus,
    /// 是否因超时而终止
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// 退出码，被信号终止时为 -1
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

impl CommandRunner {
    /// 执行命令并流式输出日志
    ///
    /// # Arguments
    /// * `command` - 程序及参数，第一个元素为程序
    /// * `work_dir` - 工作目录
    /// * `log_tx` - 日志发送通道
    /// * `cancel` - 取消令牌
    /// * `timeout` - 超时时间
    pub async fn run_with_streaming(
        command: &[String],
        work_dir: &Path,
        log_tx: broadcast::Sender<LogLine>,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Result<CommandResult, CommandError> {
        let (program, args) = command.split_first().ok_or(CommandError::Empty)?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CommandError::SpawnFailed)?;

        let stdout_task = spawn_line_reader(child.stdout.take(), "stdout", log_tx.clone());
        let stderr_task = spawn_line_reader(child.stderr.take(), "stderr", log_tx.clone());

        // 等待命令完成，支持超时和取消
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(program = %program, "Command cancelled, killing process");
                let _ = child.kill().await;
                Err(CommandError::Cancelled)
            }
            _ = tokio::time::sleep(timeout) => {
                error!(program = %program, "Command timed out after {:?}", timeout);
                let _ = child.kill().await;
                let status = child.wait().await.map_err(CommandError::WaitFailed)?;
                Ok(CommandResult { status, timed_out: true })
            }
            status = child.wait() => {
                let status = status.map_err(CommandError::WaitFailed)?;
                Ok(CommandResult { status, timed_out: false })
            }
        };

        // 子进程的后代可能仍持有管道，日志读取最多再等一个宽限期
        let grace = Duration::from_secs(LOG_DRAIN_GRACE_SECS);
        for mut task in [stdout_task, stderr_task] {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!(program = %program, "Output pipe still open after exit, detaching reader");
                task.abort();
            }
        }

        result
    }

    /// 执行简单命令（无流式输出）
    ///
    /// 取消或超时时丢弃 future，`kill_on_drop` 负责结束子进程
    pub async fn run_simple(
        program: &str,
        args: &[&str],
        work_dir: &Path,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<std::process::Output, CommandError> {
        let child = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .kill_on_drop(true)
            .output();

        tokio::select! {
            result = child => {
                result.map_err(CommandError::SpawnFailed)
            }
            _ = cancel.cancelled() => {
                Err(CommandError::Cancelled)
            }
            _ = tokio::time::sleep(timeout) => {
                Err(CommandError::Timeout)
            }
        }
    }
}

/// 按行读取输出并发送到日志通道
///
/// 按字节切行，非 UTF-8 内容有损转换，读取不会因编码错误提前结束
fn spawn_line_reader<R>(
    reader: Option<R>,
    stream: &'static str,
    tx: broadcast::Sender<LogLine>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(reader) = reader else {
            return;
        };
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    let _ = tx.send(LogLine::new(stream, line));
                }
                Err(e) => {
                    warn!(stream, error = %e, "Failed to read command output");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_simple_success() {
        let result = CommandRunner::run_simple(
            "echo",
            &["hello"],
            &PathBuf::from("/tmp"),
            &CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await;

        let output = result.unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("hello"));
    }

    #[tokio::test]
    async fn test_run_simple_not_found() {
        let result = CommandRunner::run_simple(
            "nonexistent_command_12345",
            &[],
            &PathBuf::from("/tmp"),
            &CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(CommandError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_streaming_separates_streams() {
        let (tx, mut rx) = broadcast::channel(16);
        let result = CommandRunner::run_with_streaming(
            &cmd(&["sh", "-c", "echo out; echo err >&2; exit 3"]),
            &PathBuf::from("/tmp"),
            tx,
            CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(!result.success());
        assert_eq!(result.code(), 3);

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push((line.stream, line.content));
        }
        assert!(lines.contains(&("stdout".to_string(), "out".to_string())));
        assert!(lines.contains(&("stderr".to_string(), "err".to_string())));
    }

    #[tokio::test]
    async fn test_streaming_timeout() {
        let (tx, _rx) = broadcast::channel(16);
        let result = CommandRunner::run_with_streaming(
            &cmd(&["sleep", "5"]),
            &PathBuf::from("/tmp"),
            tx,
            CancellationToken::new(),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert!(result.timed_out);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_streaming_cancelled() {
        let (tx, _rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = CommandRunner::run_with_streaming(
            &cmd(&["sleep", "5"]),
            &PathBuf::from("/tmp"),
            tx,
            cancel,
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(CommandError::Cancelled)));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let (tx, _rx) = broadcast::channel(16);
        let result = CommandRunner::run_with_streaming(
            &[],
            &PathBuf::from("/tmp"),
            tx,
            CancellationToken::new(),
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(result, Err(CommandError::Empty)));
    }

    #[tokio::test]
    async fn test_run_simple_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = CommandRunner::run_simple(
            "sleep",
            &["5"],
            &PathBuf::from("/tmp"),
            &cancel,
            Duration::from_secs(10),
        )
        .await;

        assert!(matches!(result, Err(CommandError::Cancelled)));
    }

    #[tokio::test]
    async fn test_streaming_survives_invalid_utf8() {
        let (tx, mut rx) = broadcast::channel(16);
        // 非 UTF-8 行之后还有大量输出，超过管道缓冲区
        let result = CommandRunner::run_with_streaming(
            &cmd(&[
                "sh",
                "-c",
                "printf '\\377\\n'; head -c 300000 /dev/zero | tr '\\0' a; echo; echo done; exit 0",
            ]),
            &PathBuf::from("/tmp"),
            tx,
            CancellationToken::new(),
            Duration::from_secs(10),
        )
        .await
        .unwrap();

        assert!(result.success(), "exit code {}", result.code());
        assert_eq!(rx.recv().await.unwrap().content, "\u{FFFD}");
    }

    #[tokio::test]
    async fn test_timeout_with_background_grandchild() {
        let (tx, _rx) = broadcast::channel(16);
        let started = std::time::Instant::now();

        // 后台 sleep 继承 stdout，父 shell 被杀后管道仍然打开
        let result = CommandRunner::run_with_streaming(
            &cmd(&["sh", "-c", "sleep 30 & sleep 30"]),
            &PathBuf::from("/tmp"),
            tx,
            CancellationToken::new(),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert!(result.timed_out);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
