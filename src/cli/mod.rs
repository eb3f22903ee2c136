//! CLI 命令处理

pub mod classify;
pub mod output;
pub mod psa;
pub mod run;

pub use classify::*;
pub use output::*;
pub use psa::*;
pub use run::*;
