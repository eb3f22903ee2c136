//! 配置加载
//!
//! 读取优先级：
//! 1. `--config <path>` 指定的 JSON 文件
//! 2. `~/.config/gerrit-notifier/config.json`
//!
//! 环境变量覆盖：`SLACK_TOKEN` 替换 `slack.token`，`DEVELOPMENT` 非空时开启 dry-run。

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::gerrit::detail::GerritClientConfig;
use crate::gerrit::stream::{ReconnectPolicy, DEFAULT_RECONNECT_DELAY_SECS};
use crate::notification::buffer::DEFAULT_FLUSH_INTERVAL_SECS;
use crate::notification::routing::{ChannelRoute, RoutingTable};
use crate::notification::slack::SlackConfig;

/// Gerrit 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GerritSection {
    /// 产生事件流的命令
    pub stream: String,
    /// REST 地址
    pub url: String,
    pub fetch_timeout_secs: u64,
}

impl Default for GerritSection {
    fn default() -> Self {
        Self {
            stream: String::new(),
            url: String::new(),
            fetch_timeout_secs: 10,
        }
    }
}

/// Slack 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackSection {
    pub token: String,
    pub api_url: String,
    pub username: String,
    pub timeout_secs: u64,
}

impl Default for SlackSection {
    fn default() -> Self {
        let defaults = SlackConfig::default();
        Self {
            token: defaults.token,
            api_url: defaults.api_url,
            username: defaults.username,
            timeout_secs: defaults.timeout_secs,
        }
    }
}

/// 发送与重连节奏
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub flush_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub reconnect_max_delay_secs: u64,
    pub dry_run: bool,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            reconnect_max_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            dry_run: false,
        }
    }
}

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub gerrit: GerritSection,
    pub slack: SlackSection,
    pub dispatch: DispatchSection,
    pub channels: Vec<ChannelRoute>,
    /// Gerrit 用户名 -> Slack handle
    pub users: HashMap<String, String>,
}

impl NotifierConfig {
    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".config/gerrit-notifier/config.json"))
    }

    /// 加载配置并应用环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path().ok_or_else(|| anyhow!("Cannot find home directory"))?,
        };

        let mut config = Self::from_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        debug!(path = %path.display(), channels = config.channels.len(), "Loaded config");
        Ok(config)
    }

    /// 环境变量覆盖，`lookup` 便于测试注入
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("SLACK_TOKEN").filter(|t| !t.is_empty()) {
            self.slack.token = token;
        }
        if lookup("DEVELOPMENT").is_some_and(|v| !v.is_empty()) {
            self.dispatch.dry_run = true;
        }
    }

    /// 运行服务前的检查
    pub fn validate(&self) -> Result<()> {
        if self.gerrit.stream.trim().is_empty() {
            return Err(anyhow!("gerrit.stream is required"));
        }
        if !self.dispatch.dry_run && self.slack.token.is_empty() {
            return Err(anyhow!("slack.token is required (or set SLACK_TOKEN, or enable dry-run)"));
        }
        if self.dispatch.flush_interval_secs == 0 {
            return Err(anyhow!("dispatch.flush_interval_secs must be positive"));
        }
        Ok(())
    }

    pub fn routing_table(&self) -> RoutingTable {
        RoutingTable::new(self.channels.clone(), self.users.clone())
    }

    pub fn slack_config(&self) -> SlackConfig {
        SlackConfig {
            api_url: self.slack.api_url.clone(),
            token: self.slack.token.clone(),
            username: self.slack.username.clone(),
            timeout_secs: self.slack.timeout_secs,
        }
    }

    pub fn gerrit_client_config(&self) -> GerritClientConfig {
        GerritClientConfig {
            base_url: self.gerrit.url.clone(),
            timeout_secs: self.gerrit.fetch_timeout_secs,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch.flush_interval_secs)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let initial = Duration::from_secs(self.dispatch.reconnect_delay_secs);
        let max = Duration::from_secs(self.dispatch.reconnect_max_delay_secs);
        ReconnectPolicy {
            initial,
            max: max.max(initial),
        }
    }
}
