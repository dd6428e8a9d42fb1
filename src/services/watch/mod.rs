//! 配置长轮询订阅

pub mod manager;
pub mod types;

pub use manager::{WatchHandle, WatchManager};
pub use types::{Subscription, WatchOutcome};
