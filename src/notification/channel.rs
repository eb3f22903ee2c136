//! 聊天发送 trait 定义

use anyhow::Result;
use std::future::Future;

use super::payload::{Destination, Payload};

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（dry-run 等）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

/// 聊天发送器
///
/// 对核心逻辑来说是尽力而为的单次投递：不重试，失败只记录日志。
pub trait ChatSender: Send + Sync {
    /// 发送器名称（用于日志）
    fn name(&self) -> &str;

    /// 向单个目标发送一条消息
    fn send(
        &self,
        destination: &Destination,
        payload: &Payload,
    ) -> impl Future<Output = Result<SendResult>> + Send;
}

/// 开发模式使用的发送器：只打印，不发请求
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunSender;

impl ChatSender for DryRunSender {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn send(&self, destination: &Destination, _payload: &Payload) -> Result<SendResult> {
        tracing::debug!(destination = %destination, "Dry-run sender skipped message");
        Ok(SendResult::Skipped("dry-run".to_string()))
    }
}
