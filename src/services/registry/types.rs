use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

// 实例健康状态，读取时根据心跳时间推导
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
    Up,
    Down,
}

// 服务实例信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub service_name: String,
    pub instance_id: String,
    pub ip: String,
    pub port: u16,
    pub status: InstanceStatus,
    pub metadata: HashMap<String, String>,
    pub registered_at: u64,
    pub last_heartbeat_at: u64,
}

impl ServiceInstance {
    /// 心跳时长（毫秒）
    pub fn heartbeat_age(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.last_heartbeat_at)
    }

    pub fn is_healthy(&self, now_millis: u64, threshold_millis: u64) -> bool {
        self.heartbeat_age(now_millis) < threshold_millis
    }

    pub fn is_expired(&self, now_millis: u64, threshold_millis: u64) -> bool {
        self.heartbeat_age(now_millis) > threshold_millis
    }
}

// 注册请求，状态和时间戳由注册中心维护
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub service_name: String,
    pub instance_id: Option<String>,
    pub ip: String,
    pub port: u16,
    pub metadata: HashMap<String, String>,
}

impl RegisterRequest {
    pub fn new(service_name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            ip: ip.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 未显式指定时按 `serviceName-ip:port` 生成实例ID
    pub fn resolve_instance_id(&self) -> String {
        match self.instance_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("{}-{}:{}", self.service_name, self.ip, self.port),
        }
    }
}

// 实例ID -> 实例
pub type ServiceInstances = HashMap<String, ServiceInstance>;

// 服务名 -> 实例集合
pub type ServiceMap = DashMap<String, ServiceInstances>;
