//! `classify` 命令 - 从 stdin 读取事件，打印分类和路由结果
//!
//! 不发送任何消息，也不查询 Gerrit REST（重新评审提醒规则被跳过）。

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::output::{format_output, format_summary, Classification};
use super::run::load_config;
use crate::gerrit::Update;
use crate::notification::{NotificationRouter, OfflineFetcher};

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// 配置文件路径
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 每个事件输出一行 JSON
    #[arg(long)]
    pub json: bool,

    /// 只输出单行摘要
    #[arg(long, conflicts_with = "json")]
    pub brief: bool,
}

/// 处理 classify 命令
pub async fn handle_classify(args: ClassifyArgs) -> Result<()> {
    let config = load_config(args.config.as_ref(), false)?;
    let router = NotificationRouter::new(Arc::new(config.routing_table()), Arc::new(OfflineFetcher));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let update = match Update::parse(&line) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "Skipping unparseable line");
                continue;
            }
        };

        let notifications = router.route(&update).await;
        let classification = Classification::new(&update, &notifications);
        if args.brief {
            println!("{}", format_summary(&classification));
        } else {
            println!("{}", format_output(&classification, args.json));
        }
    }
    Ok(())
}
