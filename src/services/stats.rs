use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 操作计数器
#[derive(Debug, Default)]
pub struct OperationCounters {
    register: AtomicU64,
    update: AtomicU64,
    deregister: AtomicU64,
    heartbeat: AtomicU64,
    evicted: AtomicU64,
    config_publish: AtomicU64,
    config_get: AtomicU64,
    config_delete: AtomicU64,
    watch: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register,
    Update,
    Deregister,
    Heartbeat,
    Evicted,
    ConfigPublish,
    ConfigGet,
    ConfigDelete,
    Watch,
}

impl OperationCounters {
    pub fn record(&self, op: Operation) {
        self.record_n(op, 1);
    }

    pub fn record_n(&self, op: Operation, n: u64) {
        self.counter(op).fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, op: Operation) -> u64 {
        self.counter(op).load(Ordering::Relaxed)
    }

    fn counter(&self, op: Operation) -> &AtomicU64 {
        match op {
            Operation::Register => &self.register,
            Operation::Update => &self.update,
            Operation::Deregister => &self.deregister,
            Operation::Heartbeat => &self.heartbeat,
            Operation::Evicted => &self.evicted,
            Operation::ConfigPublish => &self.config_publish,
            Operation::ConfigGet => &self.config_get,
            Operation::ConfigDelete => &self.config_delete,
            Operation::Watch => &self.watch,
        }
    }

    pub fn total(&self) -> u64 {
        [
            Operation::Register,
            Operation::Update,
            Operation::Deregister,
            Operation::Heartbeat,
            Operation::Evicted,
            Operation::ConfigPublish,
            Operation::ConfigGet,
            Operation::ConfigDelete,
            Operation::Watch,
        ]
        .into_iter()
        .map(|op| self.get(op))
        .sum()
    }

    pub fn reset(&self) {
        for counter in [
            &self.register,
            &self.update,
            &self.deregister,
            &self.heartbeat,
            &self.evicted,
            &self.config_publish,
            &self.config_get,
            &self.config_delete,
            &self.watch,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 注册中心统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub status: String,
    pub start_time: u64,
    pub service_count: usize,
    pub instance_count: usize,
    pub config_count: usize,
    pub listener_count: usize,
    pub total_operations: u64,
    pub register_count: u64,
    pub update_count: u64,
    pub deregister_count: u64,
    pub heartbeat_count: u64,
    pub evicted_count: u64,
    pub config_publish_count: u64,
    pub config_get_count: u64,
    pub config_delete_count: u64,
    pub watch_count: u64,
}
