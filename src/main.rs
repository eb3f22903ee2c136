//! Gerrit Notifier CLI
//!
//! 读取 `gerrit stream-events`，按项目和负责人路由到 Slack 频道与私信

use anyhow::Result;
use clap::{Parser, Subcommand};
use gerrit_notifier::cli::{handle_classify, handle_psa, handle_run, ClassifyArgs, PsaArgs, RunArgs};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "gerrit-notifier")]
#[command(about = "Gerrit Notifier - 把 Gerrit 事件转发到 Slack")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 连接事件流并持续发送通知
    Run(RunArgs),
    /// 向所有频道发送一条公告
    Psa(PsaArgs),
    /// 从 stdin 读取事件，打印路由结果（不发送）
    Classify(ClassifyArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 控制日志级别，例如: RUST_LOG=debug gerrit-notifier run
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gerrit_notifier=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => handle_run(args).await,
        Commands::Psa(args) => handle_psa(args).await,
        Commands::Classify(args) => handle_classify(args).await,
    }
}
