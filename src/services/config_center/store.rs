use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::services::clock::SharedClock;
use crate::services::error::{RegistryError, RegistryResult};
use crate::services::stats::{Operation, OperationCounters};
use crate::services::watch::{Subscription, WatchManager, WatchOutcome};
use super::types::{ConfigItem, config_key, content_hash, normalize_group};

/// 配置存储
///
/// 同一配置键的发布、删除与订阅在该键所在分片锁内串行执行，
/// 因此发布后的通知不会漏掉并发创建的订阅。
#[derive(Debug)]
pub struct ConfigStore {
    configs: DashMap<String, ConfigItem>,
    watchers: WatchManager,
    clock: SharedClock,
    counters: Arc<OperationCounters>,
}

impl ConfigStore {
    pub fn new(clock: SharedClock, counters: Arc<OperationCounters>) -> Self {
        Self {
            configs: DashMap::new(),
            watchers: WatchManager::new(),
            clock,
            counters,
        }
    }

    pub fn watchers(&self) -> &WatchManager {
        &self.watchers
    }

    fn require_data_id(data_id: &str) -> RegistryResult<()> {
        if data_id.trim().is_empty() {
            return Err(RegistryError::validation("dataId must not be empty"));
        }
        Ok(())
    }

    // 发布配置，版本号递增并在同一临界区内通知订阅者
    pub fn publish(
        &self,
        data_id: &str,
        group: Option<&str>,
        content: &str,
    ) -> RegistryResult<ConfigItem> {
        Self::require_data_id(data_id)?;
        if content.is_empty() {
            return Err(RegistryError::validation("content must not be empty"));
        }

        let group = normalize_group(group);
        let key = config_key(data_id, group);
        let now = self.clock.now_millis();
        let build = |version: u64| ConfigItem {
            data_id: data_id.to_string(),
            group: group.to_string(),
            content: content.to_string(),
            version,
            content_hash: content_hash(content),
            updated_at: now,
        };

        let (item, notified) = match self.configs.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let item = build(occupied.get().version + 1);
                occupied.insert(item.clone());
                let notified = self.watchers.notify(&key, Some(&item));
                (item, notified)
            }
            Entry::Vacant(vacant) => {
                let item = build(1);
                let _stored = vacant.insert(item.clone());
                let notified = self.watchers.notify(&key, Some(&item));
                (item, notified)
            }
        };

        self.counters.record(Operation::ConfigPublish);
        tracing::info!(
            key = %key,
            version = item.version,
            content_hash = %item.content_hash,
            notified,
            "Config published"
        );
        Ok(item)
    }

    pub fn get(&self, data_id: &str, group: Option<&str>) -> Option<ConfigItem> {
        let key = config_key(data_id, normalize_group(group));
        let item = self.configs.get(&key).map(|entry| entry.value().clone());
        if item.is_some() {
            self.counters.record(Operation::ConfigGet);
        }
        item
    }

    /// 删除配置，等待中的订阅以“已变更、无内容”结束
    pub fn delete(&self, data_id: &str, group: Option<&str>) -> bool {
        let key = config_key(data_id, normalize_group(group));
        let Entry::Occupied(occupied) = self.configs.entry(key.clone()) else {
            return false;
        };

        let notified = self.watchers.notify(&key, None);
        occupied.remove();

        self.counters.record(Operation::ConfigDelete);
        tracing::info!(key = %key, notified, "Config deleted");
        true
    }

    pub fn list(&self) -> Vec<ConfigItem> {
        let mut items: Vec<ConfigItem> = self.configs.iter().map(|e| e.value().clone()).collect();
        items.sort_by(|a, b| a.data_id.cmp(&b.data_id).then_with(|| a.group.cmp(&b.group)));
        items
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// 订阅配置变更，比较摘要与登记订阅在该键读锁内完成
    pub fn subscribe(
        &self,
        data_id: &str,
        group: Option<&str>,
        client_hash: &str,
        timeout: Duration,
    ) -> RegistryResult<Subscription> {
        Self::require_data_id(data_id)?;

        let key = config_key(data_id, normalize_group(group));
        let current = self.configs.get(&key);
        let subscription = self
            .watchers
            .subscribe(&key, client_hash, current.as_deref(), timeout);
        drop(current);

        self.counters.record(Operation::Watch);
        Ok(subscription)
    }

    /// 长轮询：立即返回变更，或等待发布/超时
    pub async fn watch(
        &self,
        data_id: &str,
        group: Option<&str>,
        client_hash: &str,
        timeout: Duration,
    ) -> RegistryResult<WatchOutcome> {
        let subscription = self.subscribe(data_id, group, client_hash, timeout)?;
        Ok(subscription.wait().await)
    }

    // 先清空配置再结束订阅：清空前登记的订阅会被取消，之后的订阅看到配置不存在立即返回
    pub fn clear(&self) {
        self.configs.clear();
        self.watchers.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::services::config_center::DEFAULT_GROUP;

    fn store() -> (ConfigStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(5_000));
        (ConfigStore::new(clock.clone(), Arc::new(OperationCounters::default())), clock)
    }

    #[test]
    fn publish_bumps_version_by_one() {
        let (store, clock) = store();
        let first = store.publish("svc-a", None, "x=1").unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.group, DEFAULT_GROUP);
        assert_eq!(first.updated_at, 5_000);

        clock.advance(Duration::from_secs(1));
        let second = store.publish("svc-a", Some(DEFAULT_GROUP), "x=2").unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.updated_at, 6_000);
        assert_ne!(first.content_hash, second.content_hash);

        let third = store.publish("svc-a", None, "x=2").unwrap();
        assert_eq!(third.version, 3);
        assert_eq!(third.content_hash, second.content_hash);
    }

    #[test]
    fn groups_are_versioned_independently() {
        let (store, _) = store();
        store.publish("svc-a", None, "x=1").unwrap();
        store.publish("svc-a", None, "x=2").unwrap();
        let prod = store.publish("svc-a", Some("PROD"), "x=9").unwrap();
        assert_eq!(prod.version, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn publish_validates_inputs() {
        let (store, _) = store();
        assert!(matches!(store.publish("", None, "x"), Err(RegistryError::Validation(_))));
        assert!(matches!(store.publish("svc-a", None, ""), Err(RegistryError::Validation(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn get_misses_are_explicit() {
        let (store, _) = store();
        assert_eq!(store.get("missing", None), None);
        store.publish("svc-a", None, "x=1").unwrap();
        assert_eq!(store.get("svc-a", Some("")).map(|c| c.version), Some(1));
    }

    #[test]
    fn delete_removes_and_reports() {
        let (store, _) = store();
        store.publish("svc-a", None, "x=1").unwrap();
        assert!(store.delete("svc-a", None));
        assert!(!store.delete("svc-a", None));
        assert!(store.get("svc-a", None).is_none());

        // 删除后重新发布从版本1开始
        assert_eq!(store.publish("svc-a", None, "x=1").unwrap().version, 1);
    }

    #[tokio::test]
    async fn subscribe_after_publish_sees_new_hash() {
        let (store, _) = store();
        let v1 = store.publish("svc-a", None, "x=1").unwrap();
        store.publish("svc-a", None, "x=2").unwrap();

        let outcome = store
            .watch("svc-a", None, &v1.content_hash, Duration::from_secs(30))
            .await
            .unwrap();
        match outcome {
            WatchOutcome::Changed(Some(item)) => assert_eq!(item.version, 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_wakes_watchers_without_item() {
        let (store, _) = store();
        let v1 = store.publish("svc-a", None, "x=1").unwrap();
        let sub = store
            .subscribe("svc-a", None, &v1.content_hash, Duration::from_secs(30))
            .unwrap();
        assert!(sub.is_pending());

        store.delete("svc-a", None);
        assert_eq!(sub.wait().await, WatchOutcome::Changed(None));
    }

    #[tokio::test]
    async fn clear_leaves_no_watch_waiting() {
        let (store, _) = store();
        let v1 = store.publish("svc-a", None, "x=1").unwrap();
        let before = store
            .subscribe("svc-a", None, &v1.content_hash, Duration::from_secs(30))
            .unwrap();

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.watchers().total_pending(), 0);
        assert_eq!(before.wait().await, WatchOutcome::Cancelled);

        // 清空后使用旧摘要订阅不会挂起
        let after = store
            .subscribe("svc-a", None, &v1.content_hash, Duration::from_secs(30))
            .unwrap();
        assert!(!after.is_pending());
        assert_eq!(after.wait().await, WatchOutcome::Changed(None));
        assert_eq!(store.watchers().total_pending(), 0);
    }
}
