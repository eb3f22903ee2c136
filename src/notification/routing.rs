//! 路由表 - 决定哪些频道关心某个项目/所有者，以及 Gerrit 用户对应的 Slack handle

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::payload::Payload;

/// 频道路由配置
pub trait ChannelConfig: Send + Sync {
    /// 需要通知的频道（不含 `#`），为空表示忽略该事件
    fn channels_to_notify(&self, project: &str, owner: &str) -> Vec<String>;

    /// 为频道格式化消息
    fn format_message(&self, channel: &str, payload: Payload, emoji: &str) -> Payload;

    /// 所有已配置的频道
    fn all_channels(&self) -> Vec<String>;
}

/// Gerrit 用户名 -> Slack handle
pub trait UserDirectory: Send + Sync {
    fn slack_name_for(&self, username: &str) -> String;
}

/// 单个频道的路由规则
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelRoute {
    /// Slack 频道名（不含 `#`）
    pub name: String,
    /// 关心的项目，`*` 匹配全部
    #[serde(default)]
    pub projects: Vec<String>,
    /// 关心的变更所有者，为空表示全部
    #[serde(default)]
    pub owners: Vec<String>,
    /// 该频道文本消息的默认前缀 emoji
    #[serde(default)]
    pub emoji: Option<String>,
}

impl ChannelRoute {
    fn matches(&self, project: &str, owner: &str) -> bool {
        let project_ok = self.projects.iter().any(|p| p == "*" || p == project);
        let owner_ok = self.owners.is_empty() || self.owners.iter().any(|o| o == owner);
        project_ok && owner_ok
    }
}

/// 基于配置文件的路由表
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: Vec<ChannelRoute>,
    users: HashMap<String, String>,
}

impl RoutingTable {
    pub fn new(routes: Vec<ChannelRoute>, users: HashMap<String, String>) -> Self {
        Self { routes, users }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

impl ChannelConfig for RoutingTable {
    fn channels_to_notify(&self, project: &str, owner: &str) -> Vec<String> {
        let mut channels: Vec<String> = Vec::new();
        for route in self.routes.iter().filter(|r| r.matches(project, owner)) {
            if !channels.contains(&route.name) {
                channels.push(route.name.clone());
            }
        }
        channels
    }

    fn format_message(&self, channel: &str, payload: Payload, emoji: &str) -> Payload {
        match payload {
            Payload::Text(text) => {
                let emoji = if emoji.is_empty() {
                    self.routes
                        .iter()
                        .find(|r| r.name == channel)
                        .and_then(|r| r.emoji.as_deref())
                        .unwrap_or("")
                } else {
                    emoji
                };

                if emoji.is_empty() {
                    Payload::Text(text)
                } else {
                    Payload::Text(format!("{} {}", emoji, text))
                }
            }
            rich => rich,
        }
    }

    fn all_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = Vec::new();
        for route in &self.routes {
            if !channels.contains(&route.name) {
                channels.push(route.name.clone());
            }
        }
        channels
    }
}

impl UserDirectory for RoutingTable {
    /// 未配置映射时直接使用 Gerrit 用户名
    fn slack_name_for(&self, username: &str) -> String {
        self.users
            .get(username)
            .cloned()
            .unwrap_or_else(|| username.to_string())
    }
}
