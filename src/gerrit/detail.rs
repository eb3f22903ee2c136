//! Gerrit REST 客户端 - 获取变更当前的评分详情
//!
//! `GET {url}/changes/{id}/detail` 的响应体带有 XSSI 前缀 `)]}'`，解析前需要去掉。

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::update::CODE_REVIEW;

/// Gerrit JSON 响应的 XSSI 前缀
const XSSI_PREFIX: &str = ")]}'";

/// 单个评分
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApprovalInfo {
    pub username: Option<String>,
    pub value: Option<i64>,
}

/// 评分类别详情
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LabelInfo {
    /// 出现即表示处于否决状态
    pub rejected: Option<serde_json::Value>,
    #[serde(default)]
    pub all: Vec<ApprovalInfo>,
}

impl LabelInfo {
    pub fn is_rejected(&self) -> bool {
        matches!(&self.rejected, Some(v) if !v.is_null() && v != &serde_json::Value::Bool(false))
    }
}

/// 变更详情（只保留路由需要的字段）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChangeDetail {
    #[serde(default)]
    pub labels: HashMap<String, LabelInfo>,
}

impl ChangeDetail {
    /// 解析响应体，容忍 XSSI 前缀
    pub fn parse(body: &str) -> Result<Self> {
        let body = body.trim_start();
        let body = body.strip_prefix(XSSI_PREFIX).unwrap_or(body);
        serde_json::from_str(body).map_err(|e| anyhow!("Failed to parse change detail: {}", e))
    }

    /// Code-Review 处于否决状态时，所有投了 -2 的用户名
    pub fn code_review_blockers(&self) -> Vec<String> {
        match self.labels.get(CODE_REVIEW) {
            Some(label) if label.is_rejected() => label
                .all
                .iter()
                .filter(|a| a.value == Some(-2))
                .filter_map(|a| a.username.clone())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// 变更详情查询
pub trait ReviewDetailFetcher: Send + Sync {
    fn fetch_detail(&self, change_id: &str) -> impl Future<Output = Result<ChangeDetail>> + Send;
}

/// Gerrit 客户端配置
#[derive(Debug, Clone)]
pub struct GerritClientConfig {
    /// Gerrit 地址 (如 https://review.example.com)
    pub base_url: String,
    /// 超时时间 (秒)
    pub timeout_secs: u64,
}

/// Gerrit REST 客户端
#[derive(Debug, Clone)]
pub struct GerritClient {
    client: Client,
    config: GerritClientConfig,
}

impl GerritClient {
    pub fn new(config: GerritClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    fn detail_url(&self, change_id: &str) -> String {
        format!(
            "{}/changes/{}/detail",
            self.config.base_url.trim_end_matches('/'),
            change_id
        )
    }
}

impl ReviewDetailFetcher for GerritClient {
    async fn fetch_detail(&self, change_id: &str) -> Result<ChangeDetail> {
        let url = self.detail_url(change_id);
        debug!(url = %url, "Fetching change detail");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response: {}", e))?;

        if !status.is_success() {
            return Err(anyhow!("Gerrit error ({}): {}", status, body.trim()));
        }

        ChangeDetail::parse(&body)
    }
}
