//! 发送缓冲 - 按目标合并消息，定时批量发送
//!
//! ## 合并策略
//! 1. 任意数量的生产者并发 `enqueue`，按目标追加
//! 2. 每个刷新周期原子地把整个缓冲换成空表
//! 3. 每个目标只发送本周期内最早入队的一条，其余丢弃
//!
//! 锁只覆盖追加和交换，发送发生在锁外，生产者永远看不到正在发送的那份缓冲。

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::channel::{ChatSender, SendResult};
use super::payload::{Destination, Notification, Payload};

/// 默认刷新间隔（秒）
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 15;

/// 单次刷新的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// 成功发送的目标数
    pub sent: usize,
    /// 发送失败的目标数
    pub failed: usize,
    /// 跳过的目标数（dry-run）
    pub skipped: usize,
    /// 被合并丢弃的消息数
    pub dropped: usize,
}

impl FlushReport {
    pub fn destinations(&self) -> usize {
        self.sent + self.failed + self.skipped
    }
}

/// 线程安全的发送缓冲
#[derive(Debug, Default)]
pub struct DispatchBuffer {
    pending: Mutex<HashMap<Destination, Vec<Payload>>>,
    dry_run: bool,
}

impl DispatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 dry-run 模式：只打印缓冲内容，不调用发送器
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Destination, Vec<Payload>>> {
        // 中毒时沿用内部数据
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 追加一条消息
    pub fn enqueue(&self, destination: Destination, payload: Payload) {
        self.lock().entry(destination).or_default().push(payload);
    }

    pub fn enqueue_all(&self, notifications: impl IntoIterator<Item = Notification>) {
        let mut pending = self.lock();
        for n in notifications {
            pending.entry(n.destination).or_default().push(n.payload);
        }
    }

    /// 当前待发送的目标数
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 原子地取走整个缓冲
    pub fn drain(&self) -> HashMap<Destination, Vec<Payload>> {
        std::mem::take(&mut *self.lock())
    }

    /// 刷新一次：每个目标只发送最早的一条
    pub async fn flush<S: ChatSender>(&self, sender: &S) -> FlushReport {
        let drained = self.drain();
        let mut report = FlushReport::default();

        if drained.is_empty() {
            debug!("Buffer is empty");
            return report;
        }

        if self.dry_run {
            print_buffer(&drained, Local::now());
        }

        let mut entries: Vec<_> = drained.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (destination, payloads) in entries {
            report.dropped += payloads.len().saturating_sub(1);
            let Some(first) = payloads.into_iter().next() else {
                continue;
            };

            if self.dry_run {
                eprintln!("[DRY-RUN] Would send to {}", destination);
                report.skipped += 1;
                continue;
            }

            let result = match sender.send(&destination, &first).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(destination = %destination, sender = sender.name(), error = %e, "Chat send failed");
                    SendResult::Failed(e.to_string())
                }
            };

            match result {
                SendResult::Sent => report.sent += 1,
                SendResult::Skipped(_) => report.skipped += 1,
                SendResult::Failed(_) => report.failed += 1,
            }
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            dropped = report.dropped,
            "Buffer flushed"
        );
        report
    }
}

fn print_buffer(buffer: &HashMap<Destination, Vec<Payload>>, now: DateTime<Local>) {
    eprintln!("[{}] Current buffer:", now.format("%Y-%m-%d %H:%M:%S"));
    for (destination, payloads) in buffer {
        for payload in payloads {
            let json = serde_json::to_string(payload).unwrap_or_default();
            eprintln!("  {} => {}", destination, json);
        }
    }
}

/// 定时刷新循环，收到关闭信号后做最后一次刷新再退出
pub async fn run_flush_loop<S: ChatSender>(
    buffer: Arc<DispatchBuffer>,
    sender: Arc<S>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "Starting buffer flush loop");

    loop {
        buffer.flush(sender.as_ref()).await;

        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                buffer.flush(sender.as_ref()).await;
                break;
            }
        }
    }

    info!("Buffer flush loop stopped");
}
