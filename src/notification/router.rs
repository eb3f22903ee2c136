//! 通知路由 - 按固定顺序评估规则，把一条 Gerrit 事件转换为若干条通知
//!
//! 规则之间互不排斥，同一事件可以触发多条通知。唯一的提前退出是路由门槛：
//! `channels_to_notify(project, owner)` 为空时整条事件被静默。

use std::sync::Arc;
use tracing::{debug, warn};

use super::payload::{Attachment, Color, Destination, Notification, Payload};
use super::routing::{ChannelConfig, UserDirectory};
use crate::gerrit::detail::{ChangeDetail, ReviewDetailFetcher};
use crate::gerrit::update::{EventKind, RejectionTier, Update};

/// 不访问网络的详情查询，总是返回空详情（`classify` 命令使用）
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl ReviewDetailFetcher for OfflineFetcher {
    async fn fetch_detail(&self, _change_id: &str) -> anyhow::Result<ChangeDetail> {
        Ok(ChangeDetail::default())
    }
}

/// 通知路由器
pub struct NotificationRouter<C, F> {
    config: Arc<C>,
    fetcher: Arc<F>,
}

impl<C, F> NotificationRouter<C, F>
where
    C: ChannelConfig + UserDirectory,
    F: ReviewDetailFetcher,
{
    pub fn new(config: Arc<C>, fetcher: Arc<F>) -> Self {
        Self { config, fetcher }
    }

    /// 评估所有规则
    pub async fn route(&self, update: &Update) -> Vec<Notification> {
        let mut out = Vec::new();

        if update.kind() == EventKind::Other {
            return out;
        }

        let (Some(project), Some(owner)) = (update.project(), update.owner()) else {
            debug!(event_type = ?update.event_type(), "Event has no project/owner, skipping");
            return out;
        };

        let channels = self.config.channels_to_notify(project, owner);
        if channels.is_empty() {
            debug!(project = %project, owner = %owner, "No channels routed, skipping");
            return out;
        }

        let title = self.title(update);

        // 构建结果
        if update.is_build_report() {
            if update.build_succeeded() && !update.is_wip() {
                self.notify_user(
                    &mut out,
                    owner,
                    Attachment::new(&title, "All checks have passed.", Color::Good),
                );
            } else if update.build_failed() && !update.build_aborted() {
                self.notify_user(
                    &mut out,
                    owner,
                    Attachment::new(&title, "All checks have failed.", Color::Danger),
                );
            }
        }

        // Code-Review +2 / +1
        if update.code_review_approved() {
            let text = format!("{} has *+2* your review!", self.attribution(update));
            self.notify_user(&mut out, owner, Attachment::new(&title, text, Color::Good));
        }
        if update.code_review_tentatively_approved() {
            let text = format!("{} has *+1* your review!", self.attribution(update));
            self.notify_user(&mut out, owner, Attachment::new(&title, text, Color::Good));
        }

        // QA / Product
        let approver = self.author_handle(update);
        if update.qa_approved() && update.product_approved() {
            let text = format!("{} has *QA/Product-approved* {}!", approver, self.commit(update));
            self.notify_user_with_emoji(&mut out, owner, text, ":mj: :victory:");
        } else if update.qa_approved() {
            let text = format!("{} has *QA-approved* {}!", approver, self.commit(update));
            self.notify_user_with_emoji(&mut out, owner, text, ":mj:");
        } else if update.product_approved() {
            let text = format!("{} has *Product-approved* {}!", approver, self.commit(update));
            self.notify_user_with_emoji(&mut out, owner, text, ":victory:");
        }

        // -1 / -2
        if let Some(tier) = update.rejection() {
            let color = match tier {
                RejectionTier::MinusTwo => Color::Danger,
                RejectionTier::MinusOne => Color::Warning,
            };
            let text = format!(
                "{} has *{}* your review.\n```{} ```",
                self.attribution(update),
                tier.verb(),
                update.comment()
            );
            self.notify_user(&mut out, owner, Attachment::new(&title, text, color));
        }

        // 新变更
        if update.is_new_change() {
            let text = format!("{} opened a new review!", display_or_empty(update.uploader_name()));
            self.notify_channels(&mut out, &channels, Attachment::new(&title, text, Color::accent()).into(), "");
        }

        // 人工评论
        if update.is_comment_added() && update.is_human() {
            let comment = update.comment();
            if !comment.is_empty() {
                let attachment = Attachment::new(&title, format!("```{}```", comment), Color::info())
                    .with_pretext(format!(
                        "{} has posted comments on this change!",
                        self.attribution(update)
                    ));
                self.notify_user(&mut out, owner, attachment);
            }
        }

        // 新 patchset 提醒投 -2 的人重新评审
        if update.is_patchset_created() {
            self.notify_blockers(&mut out, update, &title).await;
        }

        // 合并
        if update.is_merged() {
            let text = format!(
                "{} have been *merged* into {}! :champagne:",
                self.commit(update),
                update.branch().unwrap_or_default()
            );
            self.notify_channels(&mut out, &channels, Attachment::new(&title, text, Color::Good).into(), "");
        }

        debug!(
            event_type = %update.kind().as_str(),
            project = %project,
            notifications = out.len(),
            "Event routed"
        );
        out
    }

    /// PSA：发给所有已配置频道
    pub fn broadcast(&self, payload: Payload, emoji: &str) -> Vec<Notification> {
        let mut out = Vec::new();
        self.notify_channels(&mut out, &self.config.all_channels(), payload, emoji);
        out
    }

    async fn notify_blockers(&self, out: &mut Vec<Notification>, update: &Update, title: &str) {
        let Some(change_id) = update.change_id() else {
            return;
        };

        let detail = match self.fetcher.fetch_detail(change_id).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(change_id = %change_id, error = %e, "Failed to fetch change detail, skipping re-review reminder");
                return;
            }
        };

        let uploader = format!(
            "{} (@{})",
            display_or_empty(update.uploader_name()),
            self.handle_for(update.uploader_username())
        );
        for blocker in detail.code_review_blockers() {
            let text = format!("{} has pushed a new patchset! Please review it.", uploader);
            self.notify_user(out, &blocker, Attachment::new(title, text, Color::info()));
        }
    }

    fn notify_user(&self, out: &mut Vec<Notification>, username: &str, payload: impl Into<Payload>) {
        let destination = Destination::direct(self.config.slack_name_for(username));
        out.push(Notification::new(destination, payload));
    }

    fn notify_user_with_emoji(&self, out: &mut Vec<Notification>, username: &str, text: String, emoji: &str) {
        self.notify_user(out, username, Payload::Text(format!("{} {}", text, emoji)));
    }

    fn notify_channels(&self, out: &mut Vec<Notification>, channels: &[String], payload: Payload, emoji: &str) {
        for channel in channels {
            let formatted = self.config.format_message(channel, payload.clone(), emoji);
            out.push(Notification::new(Destination::channel(channel.clone()), formatted));
        }
    }

    fn handle_for(&self, username: Option<&str>) -> String {
        username
            .map(|u| self.config.slack_name_for(u))
            .unwrap_or_default()
    }

    fn author_handle(&self, update: &Update) -> String {
        self.handle_for(update.author_username())
    }

    /// `Jane Doe (@jane.doe)`
    fn attribution(&self, update: &Update) -> String {
        format!(
            "{} (@{})",
            display_or_empty(update.author_name()),
            self.author_handle(update)
        )
    }

    /// `<url|project - subject>`
    fn commit_without_owner(&self, update: &Update) -> String {
        format!(
            "<{}|{} - {}>",
            update.change_url().unwrap_or_default(),
            update.project().unwrap_or_default(),
            update.sanitized_subject().unwrap_or_default()
        )
    }

    /// `<url|project - subject> (by @owner)`
    fn commit(&self, update: &Update) -> String {
        format!(
            "{} (by @{})",
            self.commit_without_owner(update),
            self.handle_for(update.owner())
        )
    }

    /// `#1234: <url|project - subject>`
    fn title(&self, update: &Update) -> String {
        format!(
            "#{}: {}",
            update.change_number().unwrap_or_default(),
            self.commit_without_owner(update)
        )
    }
}

fn display_or_empty(name: Option<String>) -> String {
    name.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gerrit::detail::{ApprovalInfo, LabelInfo};
    use crate::notification::routing::{ChannelRoute, RoutingTable};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 返回固定详情的 mock 查询器
    #[derive(Default)]
    struct StaticFetcher {
        detail: Option<ChangeDetail>,
        calls: AtomicUsize,
    }

    impl ReviewDetailFetcher for StaticFetcher {
        async fn fetch_detail(&self, _change_id: &str) -> anyhow::Result<ChangeDetail> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.detail
                .clone()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }
    }

    fn table(channels: &[&str]) -> RoutingTable {
        RoutingTable::new(
            channels
                .iter()
                .map(|name| ChannelRoute {
                    name: name.to_string(),
                    projects: vec!["web".to_string()],
                    ..Default::default()
                })
                .collect(),
            HashMap::from([
                ("jdoe".to_string(), "jane".to_string()),
                ("jsmith".to_string(), "john".to_string()),
            ]),
        )
    }

    fn router(channels: &[&str], fetcher: StaticFetcher) -> NotificationRouter<RoutingTable, StaticFetcher> {
        NotificationRouter::new(Arc::new(table(channels)), Arc::new(fetcher))
    }

    fn event(event_type: &str, extra: serde_json::Value) -> Update {
        let mut json = serde_json::json!({
            "type": event_type,
            "change": {
                "project": "web",
                "branch": "master",
                "id": "I123",
                "number": "42",
                "subject": "Fix <a> & <b>",
                "owner": {"name": "jane doe", "username": "jdoe"},
                "url": "https://review/42"
            },
            "patchSet": {"number": "2"},
            "author": {"name": "john smith", "username": "jsmith"},
            "uploader": {"name": "john smith", "username": "jsmith"}
        });
        if let (Some(obj), Some(extra)) = (json.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        Update::parse(&json.to_string()).unwrap()
    }

    fn rich(n: &Notification) -> &Attachment {
        match &n.payload {
            Payload::Rich(a) => a,
            other => panic!("expected rich payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_events_fire_nothing() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event(
            "ref-updated",
            serde_json::json!({"approvals": [{"type": "Code-Review", "value": "2"}]}),
        );
        assert!(router.route(&update).await.is_empty());
    }

    #[tokio::test]
    async fn test_unrouted_project_is_silenced() {
        let router = router(&[], StaticFetcher::default());
        let update = event("change-merged", serde_json::json!({}));
        assert!(router.route(&update).await.is_empty());
    }

    #[tokio::test]
    async fn test_new_change_announced_to_every_channel() {
        let router = router(&["web-team", "web-leads"], StaticFetcher::default());
        let update = event("patchset-created", serde_json::json!({"patchSet": {"number": "1"}}));

        let out = router.route(&update).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].destination, Destination::channel("web-team"));
        assert_eq!(out[1].destination, Destination::channel("web-leads"));
        assert_eq!(out[0].payload, out[1].payload);

        let attachment = rich(&out[0]);
        assert_eq!(attachment.text, "John Smith opened a new review!");
        assert_eq!(attachment.title, "#42: <https://review/42|web - Fix &lt;a&gt; &amp; &lt;b&gt;>");
        assert_eq!(attachment.color, Color::accent());
    }

    #[tokio::test]
    async fn test_build_success_notifies_owner() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event(
            "comment-added",
            serde_json::json!({
                "author": {"name": "Zuul", "username": "zuul"},
                "comment": "Patch Set 2: Verified+1\n\nBuild Succeeded (gate pipeline)."
            }),
        );

        let out = router.route(&update).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].destination, Destination::direct("jane"));
        assert_eq!(rich(&out[0]).text, "All checks have passed.");
        assert_eq!(rich(&out[0]).color, Color::Good);
    }

    #[tokio::test]
    async fn test_build_wip_and_aborted_are_ignored() {
        let router = router(&["web-team"], StaticFetcher::default());
        let starting = event(
            "comment-added",
            serde_json::json!({
                "author": {"name": "Zuul", "username": "zuul"},
                "comment": "Starting check jobs. Succeeded previously."
            }),
        );
        assert!(router.route(&starting).await.is_empty());

        let aborted = event(
            "comment-added",
            serde_json::json!({
                "author": {"name": "Zuul", "username": "zuul"},
                "comment": "Build Failed: Aborted by user"
            }),
        );
        assert!(router.route(&aborted).await.is_empty());
    }

    #[tokio::test]
    async fn test_build_failure_notifies_owner() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event(
            "comment-added",
            serde_json::json!({
                "author": {"name": "Zuul", "username": "zuul"},
                "comment": "Build Failed (check pipeline)."
            }),
        );
        let out = router.route(&update).await;
        assert_eq!(out.len(), 1);
        assert_eq!(rich(&out[0]).color, Color::Danger);
    }

    #[tokio::test]
    async fn test_plus_two_with_comment() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event(
            "comment-added",
            serde_json::json!({
                "approvals": [{"type": "Code-Review", "value": "2"}],
                "comment": "Patch Set 2: Code-Review+2\n\nShip it"
            }),
        );

        let out = router.route(&update).await;
        assert_eq!(out.len(), 2);
        assert_eq!(rich(&out[0]).text, "John Smith (@john) has *+2* your review!");
        assert_eq!(rich(&out[1]).text, "```Ship it```");
        assert_eq!(
            rich(&out[1]).pretext.as_deref(),
            Some("John Smith (@john) has posted comments on this change!")
        );
    }

    #[tokio::test]
    async fn test_qa_and_product_combined() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event(
            "comment-added",
            serde_json::json!({
                "approvals": [
                    {"type": "QA-Review", "value": "1"},
                    {"type": "Product-Review", "value": "1"}
                ],
                "comment": "Patch Set 2: QA-Review+1 Product-Review+1"
            }),
        );

        let out = router.route(&update).await;
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].payload,
            Payload::text(
                "john has *QA/Product-approved* <https://review/42|web - Fix &lt;a&gt; &amp; &lt;b&gt;> (by @jane)! :mj: :victory:"
            )
        );
    }

    #[tokio::test]
    async fn test_plus_one_notifies_owner() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event(
            "comment-added",
            serde_json::json!({
                "approvals": [{"type": "Code-Review", "value": "1"}],
                "comment": "Patch Set 2: Code-Review+1"
            }),
        );

        let out = router.route(&update).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].destination, Destination::direct("jane"));
        assert_eq!(rich(&out[0]).text, "John Smith (@john) has *+1* your review!");
        assert_eq!(rich(&out[0]).color, Color::Good);
    }

    #[tokio::test]
    async fn test_qa_only_approval() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event(
            "comment-added",
            serde_json::json!({
                "approvals": [{"type": "QA-Review", "value": "1"}],
                "comment": "Patch Set 2: QA-Review+1"
            }),
        );

        let out = router.route(&update).await;
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].payload,
            Payload::text(
                "john has *QA-approved* <https://review/42|web - Fix &lt;a&gt; &amp; &lt;b&gt;> (by @jane)! :mj:"
            )
        );
    }

    #[tokio::test]
    async fn test_product_only_approval() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event(
            "comment-added",
            serde_json::json!({
                "approvals": [
                    {"type": "Product-Review", "value": "1"},
                    {"type": "QA-Review", "value": "0"}
                ],
                "comment": "Patch Set 2: Product-Review+1"
            }),
        );

        let out = router.route(&update).await;
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].payload,
            Payload::text(
                "john has *Product-approved* <https://review/42|web - Fix &lt;a&gt; &amp; &lt;b&gt;> (by @jane)! :victory:"
            )
        );
    }

    #[tokio::test]
    async fn test_boilerplate_only_comment_is_not_forwarded() {
        let router = router(&["web-team"], StaticFetcher::default());
        for comment in ["Patch Set 2: Code-Review+0", "Patch Set 2:\n\n\n\n"] {
            let update = event("comment-added", serde_json::json!({ "comment": comment }));
            assert!(router.route(&update).await.is_empty(), "comment {:?}", comment);
        }
    }

    #[tokio::test]
    async fn test_minus_two_wins_tie_break() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event(
            "comment-added",
            serde_json::json!({
                "approvals": [
                    {"type": "Code-Review", "value": "-1"},
                    {"type": "Code-Review", "value": "-2"}
                ],
                "comment": "Patch Set 2: Code-Review-2\n\nNot like this"
            }),
        );

        let out = router.route(&update).await;
        let rejection = rich(&out[0]);
        assert_eq!(rejection.color, Color::Danger);
        assert_eq!(
            rejection.text,
            "John Smith (@john) has *-2* your review.\n```Not like this ```"
        );
    }

    #[tokio::test]
    async fn test_minus_one_uses_warning() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event(
            "comment-added",
            serde_json::json!({
                "author": {"name": "Jenkins", "username": "jenkins"},
                "approvals": [{"type": "QA-Review", "value": "-1"}],
                "comment": "QA failed"
            }),
        );

        let out = router.route(&update).await;
        assert_eq!(out.len(), 1);
        assert_eq!(rich(&out[0]).color, Color::Warning);
        assert!(rich(&out[0]).text.contains("*-1*"));
    }

    #[tokio::test]
    async fn test_new_patchset_pings_blockers() {
        let detail = ChangeDetail {
            labels: HashMap::from([(
                "Code-Review".to_string(),
                LabelInfo {
                    rejected: Some(serde_json::json!({"_account_id": 1})),
                    all: vec![
                        ApprovalInfo { username: Some("alice".to_string()), value: Some(-2) },
                        ApprovalInfo { username: Some("bob".to_string()), value: Some(1) },
                    ],
                },
            )]),
        };
        let router = router(&["web-team"], StaticFetcher { detail: Some(detail), ..Default::default() });
        let update = event("patchset-created", serde_json::json!({}));

        let out = router.route(&update).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].destination, Destination::direct("alice"));
        assert_eq!(
            rich(&out[0]).text,
            "John Smith (@john) has pushed a new patchset! Please review it."
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_only_skips_reminder() {
        let fetcher = StaticFetcher::default();
        let router = router(&["web-team"], fetcher);
        let update = event("patchset-created", serde_json::json!({"patchSet": {"number": "1"}}));

        let out = router.route(&update).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].destination, Destination::channel("web-team"));
        assert_eq!(router.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_merge_announced_to_channels() {
        let router = router(&["web-team"], StaticFetcher::default());
        let update = event("change-merged", serde_json::json!({"submitter": {"username": "jsmith"}}));

        let out = router.route(&update).await;
        assert_eq!(out.len(), 1);
        assert_eq!(
            rich(&out[0]).text,
            "<https://review/42|web - Fix &lt;a&gt; &amp; &lt;b&gt;> (by @jane) have been *merged* into master! :champagne:"
        );
    }

    #[test]
    fn test_broadcast_uses_all_channels() {
        let router = router(&["a", "b"], StaticFetcher::default());
        let out = router.broadcast(Payload::text("maintenance tonight"), ":warning:");
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].payload, Payload::text(":warning: maintenance tonight"));
    }
}
