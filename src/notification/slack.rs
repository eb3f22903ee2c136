//! Slack 发送器 - 通过 `chat.postMessage` 投递消息

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::channel::{ChatSender, SendResult};
use super::payload::{Attachment, Destination, Payload};

/// Slack 发送器配置
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// API 地址
    pub api_url: String,
    /// Bot token
    pub token: String,
    /// 显示的发送者名
    pub username: String,
    /// 超时时间 (秒)
    pub timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_url: "https://slack.com/api/chat.postMessage".to_string(),
            token: String::new(),
            username: "Gerrit".to_string(),
            timeout_secs: 10,
        }
    }
}

/// `chat.postMessage` 请求体
#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: String,
    username: &'a str,
    mrkdwn: bool,
    link_names: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<&'a Attachment>,
}

impl<'a> PostMessageRequest<'a> {
    fn new(destination: &Destination, payload: &'a Payload, username: &'a str) -> Self {
        let (text, attachments) = match payload {
            Payload::Text(text) => (Some(text.as_str()), Vec::new()),
            Payload::Rich(attachment) => (None, vec![attachment]),
        };

        Self {
            channel: destination.key(),
            username,
            mrkdwn: true,
            link_names: 1,
            text,
            attachments,
        }
    }
}

/// Slack API 响应
#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Slack 发送器
#[derive(Debug)]
pub struct SlackSender {
    client: Client,
    config: SlackConfig,
}

impl SlackSender {
    pub fn new(config: SlackConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(anyhow!("slack token is required"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }
}

impl ChatSender for SlackSender {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, destination: &Destination, payload: &Payload) -> Result<SendResult> {
        let request = PostMessageRequest::new(destination, payload, &self.config.username);

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        let body: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse response: {}", e))?;

        if body.ok {
            debug!(destination = %destination, "Message sent successfully");
            Ok(SendResult::Sent)
        } else {
            let reason = body.error.unwrap_or_else(|| "unknown error".to_string());
            error!(destination = %destination, error = %reason, "Slack rejected message");
            Ok(SendResult::Failed(reason))
        }
    }
}
