//! 通知层 - 路由规则、频道配置、发送缓冲和 Slack 投递
//!
//! 数据流：
//! ```text
//! Update -> NotificationRouter -> Vec<Notification> -> DispatchBuffer -> ChatSender
//! ```

pub mod buffer;
pub mod channel;
pub mod payload;
pub mod router;
pub mod routing;
pub mod slack;

pub use buffer::{run_flush_loop, DispatchBuffer, FlushReport, DEFAULT_FLUSH_INTERVAL_SECS};
pub use channel::{ChatSender, DryRunSender, SendResult};
pub use payload::{Attachment, Color, Destination, Notification, Payload};
pub use router::{NotificationRouter, OfflineFetcher};
pub use routing::{ChannelConfig, ChannelRoute, RoutingTable, UserDirectory};
pub use slack::{SlackConfig, SlackSender};
