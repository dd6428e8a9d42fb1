use std::time::Instant;

use tokio::sync::oneshot;

use crate::services::config_center::ConfigItem;
use super::manager::WatchHandle;

/// 长轮询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// 配置已变更，`None` 表示配置不存在或已删除
    Changed(Option<ConfigItem>),
    /// 超时无变化
    Timeout,
    /// 服务关闭或订阅被清理
    Cancelled,
}

/// 订阅结果：立即返回或等待
#[derive(Debug)]
pub enum Subscription {
    Ready(WatchOutcome),
    Pending(WatchHandle),
}

impl Subscription {
    pub async fn wait(self) -> WatchOutcome {
        match self {
            Subscription::Ready(outcome) => outcome,
            Subscription::Pending(handle) => handle.wait().await,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Subscription::Pending(_))
    }
}

// 等待中的订阅
#[derive(Debug)]
pub(crate) struct PendingWatch {
    pub client_hash: String,
    pub created_at: Instant,
    pub sender: oneshot::Sender<WatchOutcome>,
}
