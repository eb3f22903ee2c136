//! CLI 输出格式

use serde::Serialize;

use crate::gerrit::Update;
use crate::notification::Notification;

/// `classify` 对单条事件的分析结果
#[derive(Debug, Serialize)]
pub struct Classification<'a> {
    pub event_type: &'a str,
    pub project: Option<&'a str>,
    pub change: Option<&'a str>,
    pub owner: Option<&'a str>,
    pub human: bool,
    pub build_report: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<&'a str>,
    pub rejection: Option<&'static str>,
    pub notifications: &'a [Notification],
}

impl<'a> Classification<'a> {
    pub fn new(update: &'a Update, notifications: &'a [Notification]) -> Self {
        Self {
            event_type: update.event_type().unwrap_or("unknown"),
            project: update.project(),
            change: update.change_number(),
            owner: update.owner(),
            human: update.is_human(),
            build_report: update.is_build_report(),
            pipeline: update.zuul_pipeline(),
            rejection: update.rejection().map(|tier| tier.verb()),
            notifications,
        }
    }
}

/// JSON 或人类可读输出
pub fn format_output<T: Serialize>(data: &T, json: bool) -> String {
    if json {
        serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string())
    } else {
        serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
    }
}

/// 单行摘要：`<type> <project> -> #chan, @user`
pub fn format_summary(classification: &Classification<'_>) -> String {
    let targets: Vec<String> = classification
        .notifications
        .iter()
        .map(|n| n.destination.to_string())
        .collect();
    format!(
        "{} {} -> {}",
        classification.event_type,
        classification.project.unwrap_or("-"),
        if targets.is_empty() {
            "(none)".to_string()
        } else {
            targets.join(", ")
        }
    )
}
