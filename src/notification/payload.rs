//! Payload 模块 - 投递目标与消息体
//!
//! 发送到 Slack 的消息有两种形态：
//! ```json
//! "纯文本消息"
//! ```
//! 或者单个 attachment：
//! ```json
//! {
//!   "title": "#1234: <https://review/1234|web - Fix bug>",
//!   "text": "All checks have passed.",
//!   "color": "good",
//!   "mrkdwn_in": ["text"]
//! }
//! ```
//! 缓冲区只把 payload 当作不透明值，从不检查或合并内容。

use serde::{Serialize, Serializer};
use std::fmt;

/// 投递目标
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Destination {
    /// 频道（不含 `#` 前缀）
    Channel(String),
    /// 私信（Slack handle，不含 `@` 前缀）
    Direct(String),
}

impl Destination {
    pub fn channel(name: impl Into<String>) -> Self {
        Self::Channel(name.into())
    }

    pub fn direct(handle: impl Into<String>) -> Self {
        Self::Direct(handle.into())
    }

    /// Slack `channel` 参数：`#name` 或 `@handle`
    pub fn key(&self) -> String {
        match self {
            Self::Channel(name) => format!("#{}", name),
            Self::Direct(handle) => format!("@{}", handle),
        }
    }
}

impl Serialize for Destination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Attachment 颜色
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Color {
    Good,
    Warning,
    Danger,
    /// 十六进制颜色，如 `#439FE0`
    Hex(String),
}

impl Color {
    /// 新变更公告使用的蓝色
    pub fn accent() -> Self {
        Self::Hex("#439FE0".to_string())
    }

    /// 评论 / 新 patchset 提醒使用的蓝色
    pub fn info() -> Self {
        Self::Hex("#4183d7".to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Hex(hex) => hex,
        }
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Slack attachment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub title: String,
    pub text: String,
    pub color: Color,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretext: Option<String>,
    pub mrkdwn_in: Vec<String>,
}

impl Attachment {
    /// 创建启用 markdown 的 attachment
    pub fn new(title: impl Into<String>, text: impl Into<String>, color: Color) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            color,
            pretext: None,
            mrkdwn_in: vec!["text".to_string()],
        }
    }

    pub fn with_pretext(mut self, pretext: impl Into<String>) -> Self {
        self.pretext = Some(pretext.into());
        self
    }
}

/// 消息体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Rich(Attachment),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// 用于日志的简短描述
    pub fn summary(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Rich(attachment) => &attachment.text,
        }
    }
}

impl From<Attachment> for Payload {
    fn from(attachment: Attachment) -> Self {
        Self::Rich(attachment)
    }
}

/// 路由结果：一条待投递的通知
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub destination: Destination,
    pub payload: Payload,
}

impl Notification {
    pub fn new(destination: Destination, payload: impl Into<Payload>) -> Self {
        Self {
            destination,
            payload: payload.into(),
        }
    }
}
