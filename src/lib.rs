//! Gerrit Notifier - 把 Gerrit 事件流转换为 Slack 通知

pub mod cli;
pub mod config;
pub mod gerrit;
pub mod notification;
pub mod notifier;

pub use config::NotifierConfig;
pub use gerrit::{
    ChangeDetail, CommandSource, EventKind, EventSource, EventStreamReader, GerritClient,
    ReconnectPolicy, ReviewDetailFetcher, StreamStats, Update, UpdateError, UpdateHandler,
};
pub use notification::{
    Attachment, ChannelConfig, ChatSender, Color, Destination, DispatchBuffer, DryRunSender,
    FlushReport, Notification, NotificationRouter, OfflineFetcher, Payload, RoutingTable,
    SendResult, SlackSender, UserDirectory,
};
pub use notifier::{GerritNotifier, ServiceSettings};
