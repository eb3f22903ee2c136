//! Gerrit 事件模型 - 把 stream-events 的单行 JSON 解析为带语义判断的 `Update`
//!
//! 所有字段访问都返回 `Option`，缺失字段表示"规则不适用"而不是解析错误。
//! 只有整行不是 JSON 对象时才会返回 [`UpdateError`]。

use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::LazyLock;
use thiserror::Error;

/// 自动化账号（CI 机器人）
pub const AUTOMATION_ACCOUNTS: [&str; 2] = ["zuul", "jenkins"];

/// 发送构建结果评论的账号
pub const BUILD_REPORTER: &str = "zuul";

pub const CODE_REVIEW: &str = "Code-Review";
pub const QA_REVIEW: &str = "QA-Review";
pub const PRODUCT_REVIEW: &str = "Product-Review";

/// 事件解析错误
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("malformed event line: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("event line is not a JSON object")]
    NotAnObject,
}

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CommentAdded,
    PatchsetCreated,
    ChangeMerged,
    Other,
}

impl EventKind {
    fn from_type(event_type: Option<&str>) -> Self {
        match event_type {
            Some("comment-added") => Self::CommentAdded,
            Some("patchset-created") => Self::PatchsetCreated,
            Some("change-merged") => Self::ChangeMerged,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommentAdded => "comment-added",
            Self::PatchsetCreated => "patchset-created",
            Self::ChangeMerged => "change-merged",
            Self::Other => "other",
        }
    }
}

/// 否决等级，`MinusTwo` 优先于 `MinusOne`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionTier {
    MinusOne,
    MinusTwo,
}

impl RejectionTier {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::MinusOne => "-1",
            Self::MinusTwo => "-2",
        }
    }
}

/// Gerrit 账号
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Person {
    pub name: Option<String>,
    pub username: Option<String>,
}

impl Person {
    /// 显示名：逐词首字母大写，其余小写
    pub fn display_name(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        Some(
            name.split_whitespace()
                .map(capitalize)
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// 变更信息
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Change {
    pub project: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub number: Option<String>,
    pub branch: Option<String>,
    pub url: Option<String>,
    pub id: Option<String>,
    pub subject: Option<String>,
    pub owner: Option<Person>,
}

/// Patchset 信息
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PatchSet {
    #[serde(default, deserialize_with = "lenient_text")]
    pub number: Option<String>,
}

/// 评分记录，value 保留文本形式（"2"、"-1"）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Approval {
    #[serde(rename = "type")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub value: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct EventRecord {
    #[serde(rename = "type")]
    event_type: Option<String>,
    change: Option<Change>,
    #[serde(rename = "patchSet")]
    patch_set: Option<PatchSet>,
    author: Option<Person>,
    uploader: Option<Person>,
    submitter: Option<Person>,
    approvals: Option<Vec<Approval>>,
    comment: Option<String>,
}

/// 数字或字符串统一转成文本，Gerrit 不同版本对 number/value 的编码不一致
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

static PATCH_SET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Patch Set \d+").expect("Invalid patch set regex"));

static REVIEWER_CHECK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Reviewer (DID NOT )?check").expect("Invalid reviewer check regex"));

/// 清理评论：去掉 "Patch Set N" 段落，遇到 "Reviewer (DID NOT) check" 段落后全部丢弃，
/// 末尾的空段落不保留
pub fn clean_comment(raw: &str) -> String {
    let mut kept = Vec::new();

    for paragraph in raw.split("\n\n") {
        if PATCH_SET.is_match(paragraph) {
            continue;
        }
        if REVIEWER_CHECK.is_match(paragraph) {
            break;
        }
        kept.push(paragraph);
    }

    while kept.last().is_some_and(|p| p.is_empty()) {
        kept.pop();
    }

    kept.join("\n\n")
}

/// 转义 Slack 富文本中的 `&`、`<`、`>`（单次遍历，不会重复转义）
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// 单条 Gerrit 事件
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    kind: EventKind,
    record: EventRecord,
    raw_json: String,
}

impl Update {
    /// 解析单行事件
    pub fn parse(line: &str) -> Result<Self, UpdateError> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        if !value.is_object() {
            return Err(UpdateError::NotAnObject);
        }
        let record: EventRecord = serde_json::from_value(value)?;

        Ok(Self {
            kind: EventKind::from_type(record.event_type.as_deref()),
            record,
            raw_json: line.trim_end().to_string(),
        })
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// 原始 `type` 字段
    pub fn event_type(&self) -> Option<&str> {
        self.record.event_type.as_deref()
    }

    pub fn raw_json(&self) -> &str {
        &self.raw_json
    }

    fn change(&self) -> Option<&Change> {
        self.record.change.as_ref()
    }

    pub fn project(&self) -> Option<&str> {
        self.change()?.project.as_deref()
    }

    pub fn change_number(&self) -> Option<&str> {
        self.change()?.number.as_deref()
    }

    pub fn branch(&self) -> Option<&str> {
        self.change()?.branch.as_deref()
    }

    pub fn change_url(&self) -> Option<&str> {
        self.change()?.url.as_deref()
    }

    pub fn change_id(&self) -> Option<&str> {
        self.change()?.id.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.change()?.subject.as_deref()
    }

    pub fn sanitized_subject(&self) -> Option<String> {
        self.subject().map(sanitize)
    }

    /// 变更所有者，缺失时退回到 submitter
    pub fn owner(&self) -> Option<&str> {
        self.change()
            .and_then(|c| c.owner.as_ref())
            .and_then(|p| p.username.as_deref())
            .or_else(|| self.record.submitter.as_ref()?.username.as_deref())
    }

    pub fn author(&self) -> Option<&Person> {
        self.record.author.as_ref()
    }

    pub fn uploader(&self) -> Option<&Person> {
        self.record.uploader.as_ref()
    }

    pub fn author_username(&self) -> Option<&str> {
        self.author()?.username.as_deref()
    }

    pub fn uploader_username(&self) -> Option<&str> {
        self.uploader()?.username.as_deref()
    }

    pub fn author_name(&self) -> Option<String> {
        self.author()?.display_name()
    }

    pub fn uploader_name(&self) -> Option<String> {
        self.uploader()?.display_name()
    }

    pub fn patchset_number(&self) -> Option<&str> {
        self.record.patch_set.as_ref()?.number.as_deref()
    }

    pub fn approvals(&self) -> &[Approval] {
        self.record.approvals.as_deref().unwrap_or(&[])
    }

    /// 未经清理的评论原文
    pub fn raw_comment(&self) -> Option<&str> {
        self.record.comment.as_deref()
    }

    /// 去掉 Gerrit 模板段落后的评论
    pub fn comment(&self) -> String {
        self.raw_comment().map(clean_comment).unwrap_or_default()
    }

    pub fn is_comment_added(&self) -> bool {
        self.kind == EventKind::CommentAdded
    }

    pub fn is_patchset_created(&self) -> bool {
        self.kind == EventKind::PatchsetCreated
    }

    pub fn is_merged(&self) -> bool {
        self.kind == EventKind::ChangeMerged
    }

    /// 新建的变更（第一个 patchset）
    pub fn is_new_change(&self) -> bool {
        self.is_patchset_created() && self.patchset_number() == Some("1")
    }

    /// CI 发来的构建结果评论
    pub fn is_build_report(&self) -> bool {
        self.is_comment_added() && self.author_username() == Some(BUILD_REPORTER)
    }

    pub fn is_human(&self) -> bool {
        match self.author_username() {
            Some(username) => !AUTOMATION_ACCOUNTS.contains(&username),
            None => false,
        }
    }

    fn raw_comment_contains(&self, needle: &str) -> bool {
        self.raw_comment().is_some_and(|c| c.contains(needle))
    }

    pub fn build_succeeded(&self) -> bool {
        self.raw_comment_contains("Succeeded")
    }

    pub fn build_failed(&self) -> bool {
        self.raw_comment_contains("Failed")
    }

    pub fn build_aborted(&self) -> bool {
        self.raw_comment_contains("Aborted")
    }

    pub fn is_wip(&self) -> bool {
        self.raw_comment_contains("Starting")
    }

    /// 构建结果所属流水线：评论中提到的第一个评分类别对应的描述
    pub fn zuul_pipeline(&self) -> Option<&str> {
        let comment = self.raw_comment()?;
        self.approvals()
            .iter()
            .find(|a| a.category.as_deref().is_some_and(|c| comment.contains(c)))
            .and_then(|a| a.description.as_deref())
    }

    pub fn has_approval(&self, category: &str, value: &str) -> bool {
        self.approvals().iter().any(|a| {
            a.category.as_deref() == Some(category) && a.value.as_deref() == Some(value)
        })
    }

    pub fn code_review_approved(&self) -> bool {
        self.has_approval(CODE_REVIEW, "2")
    }

    pub fn code_review_tentatively_approved(&self) -> bool {
        self.has_approval(CODE_REVIEW, "1")
    }

    pub fn code_review_rejected(&self) -> bool {
        self.has_approval(CODE_REVIEW, "-1")
    }

    pub fn code_review_strongly_rejected(&self) -> bool {
        self.has_approval(CODE_REVIEW, "-2")
    }

    pub fn qa_approved(&self) -> bool {
        self.has_approval(QA_REVIEW, "1")
    }

    pub fn qa_rejected(&self) -> bool {
        self.has_approval(QA_REVIEW, "-1")
    }

    pub fn product_approved(&self) -> bool {
        self.has_approval(PRODUCT_REVIEW, "1")
    }

    pub fn product_rejected(&self) -> bool {
        self.has_approval(PRODUCT_REVIEW, "-1")
    }

    pub fn minus1(&self) -> bool {
        self.qa_rejected() || self.product_rejected() || self.code_review_rejected()
    }

    pub fn minus2(&self) -> bool {
        self.code_review_strongly_rejected()
    }

    /// 否决等级，两者同时成立时取 -2
    pub fn rejection(&self) -> Option<RejectionTier> {
        if self.minus2() {
            Some(RejectionTier::MinusTwo)
        } else if self.minus1() {
            Some(RejectionTier::MinusOne)
        } else {
            None
        }
    }
}
