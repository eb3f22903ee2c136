//! 端到端：事件行 -> 路由 -> 缓冲 -> 发送

use anyhow::Result;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use gerrit_notifier::notification::ChannelRoute;
use gerrit_notifier::{
    ChatSender, Destination, DispatchBuffer, EventSource, GerritNotifier, OfflineFetcher, Payload,
    ReconnectPolicy, RoutingTable, SendResult, ServiceSettings, Update, UpdateHandler,
};

#[derive(Default)]
struct MemorySender {
    sent: Mutex<Vec<(Destination, Payload)>>,
}

impl MemorySender {
    fn sent(&self) -> Vec<(Destination, Payload)> {
        self.sent.lock().unwrap().clone()
    }
}

impl ChatSender for MemorySender {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, destination: &Destination, payload: &Payload) -> Result<SendResult> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.clone(), payload.clone()));
        Ok(SendResult::Sent)
    }
}

/// 第一次连接返回给定事件，之后的连接发出关闭信号并返回空流
struct OneShotSource {
    lines: String,
    connects: usize,
    shutdown: watch::Sender<bool>,
}

impl EventSource for OneShotSource {
    type Reader = Cursor<Vec<u8>>;

    async fn connect(&mut self) -> Result<Self::Reader> {
        self.connects += 1;
        if self.connects == 1 {
            Ok(Cursor::new(self.lines.clone().into_bytes()))
        } else {
            let _ = self.shutdown.send(true);
            Ok(Cursor::new(Vec::new()))
        }
    }

    fn describe(&self) -> String {
        "one-shot".to_string()
    }
}

fn routing() -> Arc<RoutingTable> {
    let routes = vec![
        ChannelRoute {
            name: "web-team".to_string(),
            projects: vec!["web".to_string()],
            ..Default::default()
        },
        ChannelRoute {
            name: "all-reviews".to_string(),
            projects: vec!["*".to_string()],
            ..Default::default()
        },
    ];
    let users = HashMap::from([("jdoe".to_string(), "jane".to_string())]);
    Arc::new(RoutingTable::new(routes, users))
}

fn notifier() -> GerritNotifier<RoutingTable, OfflineFetcher> {
    GerritNotifier::new(routing(), Arc::new(OfflineFetcher), Arc::new(DispatchBuffer::new()))
}

const NEW_CHANGE: &str = r#"{"type":"patchset-created","change":{"project":"web","number":1234,"subject":"Add login","url":"https://review/1234","owner":{"username":"jdoe"}},"patchSet":{"number":1},"uploader":{"name":"jane doe","username":"jdoe"}}"#;

const BUILD_OK: &str = r#"{"type":"comment-added","change":{"project":"web","number":"1234","subject":"Add login","url":"https://review/1234","owner":{"username":"jdoe"}},"author":{"name":"Zuul","username":"zuul"},"comment":"Patch Set 1: Verified+1\n\nBuild Succeeded (check pipeline)."}"#;

#[tokio::test]
async fn test_new_change_reaches_every_channel_once() {
    let notifier = notifier();
    let sender = MemorySender::default();

    notifier.handle(Update::parse(NEW_CHANGE).unwrap()).await;
    let report = notifier.flush_now(&sender).await;

    assert_eq!(report.sent, 2);
    let sent = sent_sorted(&sender);
    assert_eq!(sent[0].0, Destination::channel("all-reviews"));
    assert_eq!(sent[1].0, Destination::channel("web-team"));
    assert_eq!(sent[0].1, sent[1].1);
    assert!(sent[0].1.summary().contains("Jane Doe opened a new review!"));
    assert!(sent.iter().all(|(d, _)| !matches!(d, Destination::Direct(_))));
}

#[tokio::test]
async fn test_only_first_message_per_destination_survives_flush() {
    let notifier = notifier();
    let sender = MemorySender::default();

    notifier.handle(Update::parse(BUILD_OK).unwrap()).await;
    notifier.handle(Update::parse(BUILD_OK).unwrap()).await;
    // 两条消息进了同一个目标
    assert_eq!(notifier.buffer().len(), 1);

    let report = notifier.flush_now(&sender).await;
    assert_eq!(report.sent, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(sender.sent()[0].0, Destination::direct("jane"));

    let again = notifier.flush_now(&sender).await;
    assert_eq!(again.destinations(), 0);
}

#[tokio::test]
async fn test_unroutable_and_unknown_events_are_silent() {
    let notifier = notifier();
    let orphan = NEW_CHANGE.replace(r#""project":"web","#, "");

    notifier.handle(Update::parse(&orphan).unwrap()).await;
    notifier.handle(Update::parse(r#"{"type":"ref-updated"}"#).unwrap()).await;

    assert!(notifier.buffer().is_empty());
}

#[tokio::test]
async fn test_psa_goes_to_all_channels() {
    let notifier = notifier();
    let sender = MemorySender::default();

    assert_eq!(notifier.psa("Gerrit restarts at 18:00"), 2);
    let report = notifier.flush_now(&sender).await;

    assert_eq!(report.sent, 2);
    assert!(sender
        .sent()
        .iter()
        .all(|(_, p)| p == &Payload::text("Gerrit restarts at 18:00")));
}

#[tokio::test(start_paused = true)]
async fn test_service_run_delivers_and_flushes_on_shutdown() {
    let notifier = notifier();
    let sender = Arc::new(MemorySender::default());
    let (tx, rx) = watch::channel(false);

    let source = OneShotSource {
        lines: format!("{}\nnot json\n{}\n", NEW_CHANGE, BUILD_OK),
        connects: 0,
        shutdown: tx,
    };
    let settings = ServiceSettings {
        flush_interval: Duration::from_secs(15),
        reconnect: ReconnectPolicy::constant(Duration::from_secs(3)),
    };

    let stats = notifier.run(source, sender.clone(), settings, rx).await;

    assert_eq!(stats.connections, 2);
    assert_eq!(stats.events, 2);
    assert_eq!(stats.skipped_lines, 1);

    let destinations: Vec<Destination> = sent_sorted(&sender).into_iter().map(|(d, _)| d).collect();
    assert_eq!(
        destinations,
        vec![
            Destination::channel("all-reviews"),
            Destination::channel("web-team"),
            Destination::direct("jane"),
        ]
    );
    assert!(notifier.buffer().is_empty());
}

fn sent_sorted(sender: &MemorySender) -> Vec<(Destination, Payload)> {
    let mut sent = sender.sent();
    sent.sort_by(|a, b| a.0.cmp(&b.0));
    sent
}
