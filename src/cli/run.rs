//! Run 命令 - 启动事件流循环和刷新循环

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::NotifierConfig;
use crate::gerrit::{CommandSource, GerritClient};
use crate::notification::{DispatchBuffer, DryRunSender, SlackSender};
use crate::notifier::{GerritNotifier, ServiceSettings};

/// Run 命令参数
#[derive(Args)]
pub struct RunArgs {
    /// 配置文件路径（默认 ~/.config/gerrit-notifier/config.json）
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Dry-run 模式（只打印不发送）
    #[arg(long)]
    pub dry_run: bool,
}

/// 加载配置，命令行 `--dry-run` 优先
pub(crate) fn load_config(path: Option<&PathBuf>, dry_run: bool) -> Result<NotifierConfig> {
    let mut config = NotifierConfig::load(path.map(PathBuf::as_path))?;
    if dry_run {
        config.dispatch.dry_run = true;
    }
    Ok(config)
}

/// Ctrl-C 时发出关闭信号
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

/// 处理 run 命令
pub async fn handle_run(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_ref(), args.dry_run)?;
    config.validate()?;

    let routing = Arc::new(config.routing_table());
    let fetcher = Arc::new(GerritClient::new(config.gerrit_client_config())?);
    let buffer = Arc::new(DispatchBuffer::new().with_dry_run(config.dispatch.dry_run));
    let notifier = GerritNotifier::new(routing.clone(), fetcher, buffer);

    let settings = ServiceSettings {
        flush_interval: config.flush_interval(),
        reconnect: config.reconnect_policy(),
    };
    let source = CommandSource::new(config.gerrit.stream.clone());
    let shutdown = shutdown_signal();

    info!(
        routes = routing.route_count(),
        flush_interval_secs = settings.flush_interval.as_secs(),
        dry_run = config.dispatch.dry_run,
        "Starting gerrit-notifier"
    );

    let stats = if config.dispatch.dry_run {
        notifier
            .run(source, Arc::new(DryRunSender), settings, shutdown)
            .await
    } else {
        let sender = Arc::new(SlackSender::new(config.slack_config())?);
        notifier.run(source, sender, settings, shutdown).await
    };

    info!(
        connections = stats.connections,
        events = stats.events,
        "gerrit-notifier stopped"
    );
    Ok(())
}
