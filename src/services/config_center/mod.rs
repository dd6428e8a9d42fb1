//! Config center module
//!
//! - `types`: 配置项与键/摘要工具
//! - `store`: 带版本号的并发配置存储

pub mod store;
pub mod types;

pub use store::ConfigStore;
pub use types::{
    ConfigItem, DEFAULT_GROUP, PublishRequest, config_key, content_hash, normalize_group,
};
