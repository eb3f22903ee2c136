//! Gerrit 侧：事件模型、事件流读取、变更详情查询

pub mod detail;
pub mod stream;
pub mod update;

pub use detail::{ChangeDetail, GerritClient, GerritClientConfig, ReviewDetailFetcher};
pub use stream::{CommandSource, EventSource, EventStreamReader, ReconnectPolicy, StreamStats, UpdateHandler};
pub use update::{EventKind, Person, RejectionTier, Update, UpdateError};
