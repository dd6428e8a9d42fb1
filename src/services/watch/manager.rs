use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::services::config_center::ConfigItem;
use super::types::{PendingWatch, Subscription, WatchOutcome};

// 配置键 -> (订阅ID -> 等待中的订阅)
#[derive(Debug, Default)]
struct PendingSet {
    watchers: Mutex<HashMap<String, HashMap<Uuid, PendingWatch>>>,
}

impl PendingSet {
    /// 移除单个订阅，返回是否由本次调用移除
    fn remove(&self, key: &str, id: Uuid) -> bool {
        let mut watchers = self.watchers.lock();
        let Some(entries) = watchers.get_mut(key) else {
            return false;
        };
        let removed = entries.remove(&id).is_some();
        if entries.is_empty() {
            watchers.remove(key);
        }
        removed
    }
}

/// 长轮询订阅句柄
///
/// 结果只会被设置一次：发布通知、超时、关闭三条路径中，
/// 谁先把订阅从等待集合中取出谁生效。句柄被丢弃时（客户端断开）订阅随之移除。
#[derive(Debug)]
pub struct WatchHandle {
    key: String,
    id: Uuid,
    deadline: tokio::time::Instant,
    receiver: Option<oneshot::Receiver<WatchOutcome>>,
    pending: Arc<PendingSet>,
}

impl WatchHandle {
    pub async fn wait(mut self) -> WatchOutcome {
        let Some(mut receiver) = self.receiver.take() else {
            return WatchOutcome::Cancelled;
        };

        let result = tokio::time::timeout_at(self.deadline, &mut receiver).await;
        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => WatchOutcome::Cancelled,
            Err(_) => {
                if self.pending.remove(&self.key, self.id) {
                    tracing::debug!(key = %self.key, watch_id = %self.id, "Config watch timed out");
                    WatchOutcome::Timeout
                } else {
                    // 通知方已取走订阅，结果在释放锁之前已经发送
                    receiver.try_recv().unwrap_or(WatchOutcome::Cancelled)
                }
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if self.pending.remove(&self.key, self.id) {
            tracing::debug!(
                key = %self.key,
                watch_id = %self.id,
                "Config watch abandoned by client"
            );
        }
    }
}

/// 长轮询订阅管理器
#[derive(Debug, Default)]
pub struct WatchManager {
    pending: Arc<PendingSet>,
}

impl WatchManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建订阅
    ///
    /// `current` 必须在持有该配置键读锁时取得，调用方在锁内调用本方法，
    /// 保证与发布通知串行。配置不存在或摘要不一致时立即返回变更。
    pub fn subscribe(
        &self,
        key: &str,
        client_hash: &str,
        current: Option<&ConfigItem>,
        timeout: Duration,
    ) -> Subscription {
        let current = match current {
            Some(item) if item.content_hash == client_hash => item,
            other => {
                tracing::debug!(
                    key = %key,
                    "Config differs from client copy, responding immediately"
                );
                return Subscription::Ready(WatchOutcome::Changed(other.cloned()));
            }
        };

        let id = Uuid::new_v4();
        let (sender, receiver) = oneshot::channel();
        let watch = PendingWatch {
            client_hash: client_hash.to_string(),
            created_at: Instant::now(),
            sender,
        };

        let waiting = {
            let mut watchers = self.pending.watchers.lock();
            let entries = watchers.entry(key.to_string()).or_default();
            entries.insert(id, watch);
            entries.len()
        };

        tracing::debug!(
            key = %key,
            watch_id = %id,
            version = current.version,
            waiting,
            timeout_ms = timeout.as_millis() as u64,
            "Config watch registered"
        );

        Subscription::Pending(WatchHandle {
            key: key.to_string(),
            id,
            deadline: tokio::time::Instant::now() + timeout,
            receiver: Some(receiver),
            pending: self.pending.clone(),
        })
    }

    /// 通知该键上所有等待中的订阅并清空等待集合
    ///
    /// 只能在发布方持有该键写锁时调用。返回被唤醒的订阅数。
    pub fn notify(&self, key: &str, item: Option<&ConfigItem>) -> usize {
        let mut watchers = self.pending.watchers.lock();
        let Some(entries) = watchers.remove(key) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, watch) in entries {
            tracing::trace!(
                key = %key,
                watch_id = %id,
                client_hash = %watch.client_hash,
                waited_ms = watch.created_at.elapsed().as_millis() as u64,
                "Resolving config watch"
            );
            // 接收端已丢弃时忽略
            if watch.sender.send(WatchOutcome::Changed(item.cloned())).is_ok() {
                delivered += 1;
            }
        }

        if delivered > 0 {
            tracing::info!(key = %key, delivered, "Notified config watchers");
        }
        delivered
    }

    /// 关闭时结束所有等待中的订阅
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingWatch> = {
            let mut watchers = self.pending.watchers.lock();
            watchers.drain().flat_map(|(_, entries)| entries.into_values()).collect()
        };

        let count = drained.len();
        for watch in drained {
            let _ = watch.sender.send(WatchOutcome::Cancelled);
        }
        if count > 0 {
            tracing::info!(cancelled = count, "Cancelled pending config watches");
        }
        count
    }

    pub fn pending_count(&self, key: &str) -> usize {
        self.pending
            .watchers
            .lock()
            .get(key)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub fn pending_counts(&self) -> BTreeMap<String, usize> {
        self.pending
            .watchers
            .lock()
            .iter()
            .map(|(key, entries)| (key.clone(), entries.len()))
            .collect()
    }

    pub fn total_pending(&self) -> usize {
        self.pending.watchers.lock().values().map(HashMap::len).sum()
    }
}
