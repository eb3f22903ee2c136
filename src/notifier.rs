//! Gerrit 通知服务 - 启动时构建一次，被事件流循环和刷新循环共享
//!
//! 两个长期运行的任务只通过 [`DispatchBuffer`] 同步：
//! - 事件流任务：逐行读取、路由、入队（一次处理一个事件）
//! - 刷新任务：每个周期清空缓冲并发送

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::gerrit::detail::ReviewDetailFetcher;
use crate::gerrit::stream::{EventSource, EventStreamReader, ReconnectPolicy, StreamStats, UpdateHandler};
use crate::gerrit::update::Update;
use crate::notification::buffer::{run_flush_loop, DispatchBuffer, FlushReport};
use crate::notification::channel::ChatSender;
use crate::notification::payload::Payload;
use crate::notification::router::NotificationRouter;
use crate::notification::routing::{ChannelConfig, UserDirectory};

/// 服务节奏参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub flush_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

/// Gerrit 通知服务
pub struct GerritNotifier<C, F> {
    router: NotificationRouter<C, F>,
    buffer: Arc<DispatchBuffer>,
}

impl<C, F> GerritNotifier<C, F>
where
    C: ChannelConfig + UserDirectory,
    F: ReviewDetailFetcher,
{
    pub fn new(config: Arc<C>, fetcher: Arc<F>, buffer: Arc<DispatchBuffer>) -> Self {
        Self {
            router: NotificationRouter::new(config, fetcher),
            buffer,
        }
    }

    pub fn buffer(&self) -> &Arc<DispatchBuffer> {
        &self.buffer
    }

    pub fn router(&self) -> &NotificationRouter<C, F> {
        &self.router
    }

    /// 向所有频道发送公告（下次刷新时发出）
    pub fn psa(&self, message: &str) -> usize {
        let notifications = self.router.broadcast(Payload::text(message), "");
        let count = notifications.len();
        self.buffer.enqueue_all(notifications);
        info!(channels = count, "PSA queued");
        count
    }

    /// 运行服务直到收到关闭信号
    pub async fn run<S, X>(
        &self,
        source: S,
        sender: Arc<X>,
        settings: ServiceSettings,
        shutdown: watch::Receiver<bool>,
    ) -> StreamStats
    where
        S: EventSource,
        X: ChatSender + 'static,
    {
        let flush_task = tokio::spawn(run_flush_loop(
            self.buffer.clone(),
            sender,
            settings.flush_interval,
            shutdown.clone(),
        ));

        let mut reader = EventStreamReader::new(source).with_policy(settings.reconnect);
        let stats = reader.run(self, shutdown).await;

        if let Err(e) = flush_task.await {
            tracing::error!(error = %e, "Flush task terminated abnormally");
        }
        stats
    }

    /// 立即刷新一次（`psa` 命令使用）
    pub async fn flush_now<X: ChatSender>(&self, sender: &X) -> FlushReport {
        self.buffer.flush(sender).await
    }
}

impl<C, F> UpdateHandler for GerritNotifier<C, F>
where
    C: ChannelConfig + UserDirectory,
    F: ReviewDetailFetcher,
{
    async fn handle(&self, update: Update) {
        if self.buffer.is_dry_run() {
            eprintln!("{}", update.raw_json());
        }

        let notifications = self.router.route(&update).await;
        if !notifications.is_empty() {
            self.buffer.enqueue_all(notifications);
        }
    }
}
