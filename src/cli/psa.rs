//! `psa` 命令 - 向所有频道发送公告

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::run::load_config;
use crate::notification::{DispatchBuffer, DryRunSender, OfflineFetcher, SlackSender};
use crate::notifier::GerritNotifier;

#[derive(Args, Debug)]
pub struct PsaArgs {
    /// 公告内容
    pub message: String,

    /// 配置文件路径
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 打印消息但不发送
    #[arg(long)]
    pub dry_run: bool,
}

/// 处理 psa 命令：入队后立即刷新一次
pub async fn handle_psa(args: PsaArgs) -> Result<()> {
    let config = load_config(args.config.as_ref(), args.dry_run)?;

    let buffer = Arc::new(DispatchBuffer::new().with_dry_run(config.dispatch.dry_run));
    let notifier = GerritNotifier::new(
        Arc::new(config.routing_table()),
        Arc::new(OfflineFetcher),
        buffer,
    );

    let queued = notifier.psa(&args.message);
    if queued == 0 {
        println!("No channels configured, nothing to send");
        return Ok(());
    }

    let report = if config.dispatch.dry_run {
        notifier.flush_now(&DryRunSender).await
    } else {
        let sender = SlackSender::new(config.slack_config())?;
        notifier.flush_now(&sender).await
    };

    info!(sent = report.sent, failed = report.failed, "PSA flushed");
    println!(
        "PSA: {} sent, {} failed, {} skipped",
        report.sent, report.failed, report.skipped
    );
    Ok(())
}
