//! Gerrit 事件流读取 - 连接 `gerrit stream-events`，逐行解析并交给处理器
//!
//! 连接断开（EOF、进程退出、读错误）后等待一段时间重连，没有重试上限。
//! 单行解析失败只跳过该行，不会触发重连。

use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::update::Update;

/// 默认重连等待（秒）
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 3;

/// 事件源
pub trait EventSource: Send {
    type Reader: AsyncBufRead + Unpin + Send;

    /// 建立一次新连接
    fn connect(&mut self) -> impl Future<Output = Result<Self::Reader>> + Send;

    /// 用于日志的描述
    fn describe(&self) -> String;
}

/// 事件处理器，读取下一行之前必须处理完当前事件
pub trait UpdateHandler: Send + Sync {
    fn handle(&self, update: Update) -> impl Future<Output = ()> + Send;
}

/// 通过 shell 命令获取事件流（如 `ssh -p 29418 host gerrit stream-events`）
pub struct CommandSource {
    command: String,
    /// 当前连接的子进程，重连时替换（旧进程随 drop 被杀掉）
    child: Option<Child>,
}

impl CommandSource {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            child: None,
        }
    }
}

impl EventSource for CommandSource {
    type Reader = BufReader<ChildStdout>;

    async fn connect(&mut self) -> Result<Self::Reader> {
        self.child = None;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn event stream: {}", self.command))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Event stream has no stdout"))?;
        self.child = Some(child);

        Ok(BufReader::new(stdout))
    }

    fn describe(&self) -> String {
        self.command.clone()
    }
}

/// 重连策略：从 `initial` 开始，每次连续失败翻倍，不超过 `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl ReconnectPolicy {
    /// 固定间隔
    pub fn constant(delay: Duration) -> Self {
        Self {
            initial: delay,
            max: delay,
        }
    }

    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max).max(self.initial)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::constant(Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS))
    }
}

/// 单次连接的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// 流关闭，附带本次处理的事件数
    Closed { events: usize },
    Shutdown,
}

/// 读取器统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub connections: usize,
    pub events: usize,
    pub skipped_lines: usize,
}

/// 事件流读取器
pub struct EventStreamReader<S> {
    source: S,
    policy: ReconnectPolicy,
    stats: StreamStats,
}

impl<S: EventSource> EventStreamReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            policy: ReconnectPolicy::default(),
            stats: StreamStats::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// 持续读取直到收到关闭信号
    pub async fn run<H: UpdateHandler>(
        &mut self,
        handler: &H,
        mut shutdown: watch::Receiver<bool>,
    ) -> StreamStats {
        let mut delay = self.policy.initial;
        info!(stream = %self.source.describe(), "Listening to event stream");

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.stats.connections += 1;
            match self.source.connect().await {
                Ok(reader) => match self.consume(reader, handler, &mut shutdown).await {
                    Ok(StreamEnd::Shutdown) => break,
                    Ok(StreamEnd::Closed { events }) => {
                        if events > 0 {
                            delay = self.policy.initial;
                        }
                        debug!(events, "Event stream closed");
                    }
                    Err(e) => warn!(error = %e, "Event stream read failed"),
                },
                Err(e) => warn!(error = %e, "Failed to connect to event stream"),
            }

            warn!(
                delay_secs = delay.as_secs(),
                attempt = self.stats.connections,
                "Connection to Gerrit server failed, trying to reconnect"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
            delay = self.policy.next_delay(delay);
        }

        info!(
            connections = self.stats.connections,
            events = self.stats.events,
            skipped_lines = self.stats.skipped_lines,
            "Event stream reader stopped"
        );
        self.stats
    }

    async fn consume<H: UpdateHandler>(
        &mut self,
        mut reader: S::Reader,
        handler: &H,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<StreamEnd> {
        let mut buf = Vec::new();
        let mut events = 0;

        loop {
            buf.clear();
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read?,
                _ = shutdown.changed() => return Ok(StreamEnd::Shutdown),
            };

            if read == 0 {
                return Ok(StreamEnd::Closed { events });
            }

            // 非 UTF-8 的行和解析失败一样只跳过，不断开连接
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => {
                    self.stats.skipped_lines += 1;
                    warn!(error = %e, "Skipping non UTF-8 event line");
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match Update::parse(line) {
                Ok(update) => {
                    events += 1;
                    self.stats.events += 1;
                    handler.handle(update).await;
                }
                Err(e) => {
                    self.stats.skipped_lines += 1;
                    warn!(error = %e, "Skipping undecodable event line");
                }
            }
        }
    }
}
