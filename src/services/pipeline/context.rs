//! 流水线上下文
//!
//! 统一的执行上下文，包含运行 ID、日志通道、取消令牌

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::env::constants::LOG_CHANNEL_CAPACITY;
use crate::domain::pipeline::LogLine;

/// 流水线执行上下文
#[derive(Clone)]
pub struct PipelineContext {
    /// 运行 ID
    pub run_id: String,
    /// 日志发送通道
    pub log_tx: broadcast::Sender<LogLine>,
    /// 取消令牌
    pub cancel_token: CancellationToken,
    /// 只打印不执行
    pub dry_run: bool,
}

impl PipelineContext {
    pub fn new(run_id: impl Into<String>, dry_run: bool) -> Self {
        let (log_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self {
            run_id: run_id.into(),
            log_tx,
            cancel_token: CancellationToken::new(),
            dry_run,
        }
    }

    /// 订阅日志
    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.log_tx.subscribe()
    }

    /// 发送日志
    pub fn log(&self, stream: &str, content: &str) {
        // 没有订阅者时 send 返回错误，忽略即可
        let _ = self.log_tx.send(LogLine::new(stream, content));
    }

    pub fn log_stdout(&self, content: &str) {
        self.log("stdout", content);
    }

    pub fn log_stderr(&self, content: &str) {
        self.log("stderr", content);
    }

    /// 检查是否被取消
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
