use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::services::clock::SharedClock;
use crate::services::error::{RegistryError, RegistryResult};
use crate::services::stats::{Operation, OperationCounters};
use super::types::{InstanceStatus, RegisterRequest, ServiceInstance, ServiceMap};

// 服务注册表：服务名 -> 实例集合
#[derive(Debug)]
pub struct ServiceRegistry {
    services: ServiceMap,
    clock: SharedClock,
    health_threshold: Duration,
    counters: Arc<OperationCounters>,
}

impl ServiceRegistry {
    pub fn new(
        clock: SharedClock,
        health_threshold: Duration,
        counters: Arc<OperationCounters>,
    ) -> Self {
        Self {
            services: ServiceMap::new(),
            clock,
            health_threshold,
            counters,
        }
    }

    pub fn health_threshold(&self) -> Duration {
        self.health_threshold
    }

    fn threshold_millis(&self) -> u64 {
        self.health_threshold.as_millis() as u64
    }

    fn validate(request: &RegisterRequest) -> RegistryResult<()> {
        if request.service_name.trim().is_empty() {
            return Err(RegistryError::validation("serviceName must not be empty"));
        }
        if request.ip.trim().is_empty() {
            return Err(RegistryError::validation("ip must not be empty"));
        }
        if request.port == 0 {
            return Err(RegistryError::validation("port must be greater than 0"));
        }
        Ok(())
    }

    // 注册实例，已存在时视为心跳并更新元数据
    pub fn register(&self, request: RegisterRequest) -> RegistryResult<ServiceInstance> {
        Self::validate(&request)?;

        let instance_id = request.resolve_instance_id();
        let now = self.clock.now_millis();
        let service_name = request.service_name.clone();

        // 持有外层写锁完成插入，避免与空服务清理交错
        let mut instances = self.services.entry(service_name.clone()).or_default();

        if let Some(existing) = instances.get_mut(&instance_id) {
            existing.last_heartbeat_at = now;
            existing.status = InstanceStatus::Up;
            existing.metadata = request.metadata;
            let snapshot = existing.clone();
            drop(instances);

            self.counters.record(Operation::Update);
            tracing::debug!(
                service_name = %service_name,
                instance_id = %instance_id,
                "Re-registration treated as heartbeat"
            );
            return Ok(snapshot);
        }

        let instance = ServiceInstance {
            service_name: service_name.clone(),
            instance_id: instance_id.clone(),
            ip: request.ip,
            port: request.port,
            status: InstanceStatus::Up,
            metadata: request.metadata,
            registered_at: now,
            last_heartbeat_at: now,
        };
        instances.insert(instance_id.clone(), instance.clone());
        let instance_count = instances.len();
        drop(instances);

        self.counters.record(Operation::Register);
        tracing::info!(
            service_name = %service_name,
            instance_id = %instance_id,
            address = %format!("{}:{}", instance.ip, instance.port),
            instance_count,
            "Registered service instance"
        );

        Ok(instance)
    }

    // 注销实例，服务下无实例时移除服务
    pub fn deregister(&self, service_name: &str, instance_id: &str) -> bool {
        let removed = match self.services.get_mut(service_name) {
            Some(mut instances) => instances.remove(instance_id).is_some(),
            None => false,
        };

        if !removed {
            tracing::debug!(
                service_name = %service_name,
                instance_id = %instance_id,
                "Deregister ignored, instance not found"
            );
            return false;
        }

        if self.services.remove_if(service_name, |_, v| v.is_empty()).is_some() {
            tracing::info!(service_name = %service_name, "Service has no instances left, removed");
        }

        self.counters.record(Operation::Deregister);
        tracing::info!(
            service_name = %service_name,
            instance_id = %instance_id,
            "Deregistered service instance"
        );
        true
    }

    /// 仅刷新心跳时间，实例不存在时返回 false
    pub fn heartbeat(&self, service_name: &str, instance_id: &str) -> bool {
        let now = self.clock.now_millis();
        let touched = self
            .services
            .get_mut(service_name)
            .and_then(|mut instances| {
                instances.get_mut(instance_id).map(|instance| {
                    instance.last_heartbeat_at = now;
                    instance.status = InstanceStatus::Up;
                })
            })
            .is_some();

        if touched {
            self.counters.record(Operation::Heartbeat);
            tracing::trace!(
                service_name = %service_name,
                instance_id = %instance_id,
                "Heartbeat received"
            );
        } else {
            tracing::warn!(
                service_name = %service_name,
                instance_id = %instance_id,
                "Heartbeat for unknown instance"
            );
        }
        touched
    }

    /// 携带完整实例信息的心跳，不存在时直接注册
    pub fn heartbeat_instance(&self, request: RegisterRequest) -> RegistryResult<ServiceInstance> {
        let instance = self.register(request)?;
        self.counters.record(Operation::Heartbeat);
        Ok(instance)
    }

    // 拷贝实例并按心跳时间计算状态
    fn snapshot(&self, instance: &ServiceInstance, now: u64) -> ServiceInstance {
        let mut snapshot = instance.clone();
        snapshot.status = if instance.is_healthy(now, self.threshold_millis()) {
            InstanceStatus::Up
        } else {
            InstanceStatus::Down
        };
        snapshot
    }

    pub fn list_instances(&self, service_name: &str) -> Vec<ServiceInstance> {
        let now = self.clock.now_millis();
        let mut instances: Vec<ServiceInstance> = self
            .services
            .get(service_name)
            .map(|entry| entry.values().map(|i| self.snapshot(i, now)).collect())
            .unwrap_or_default();
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        instances
    }

    // 服务发现，只返回健康实例
    pub fn discover(&self, service_name: &str) -> Vec<ServiceInstance> {
        self.list_instances(service_name)
            .into_iter()
            .filter(|i| i.status == InstanceStatus::Up)
            .collect()
    }

    pub fn list_all_services(&self) -> BTreeMap<String, Vec<ServiceInstance>> {
        let now = self.clock.now_millis();
        self.services
            .iter()
            .map(|entry| {
                let mut instances: Vec<ServiceInstance> =
                    entry.value().values().map(|i| self.snapshot(i, now)).collect();
                instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
                (entry.key().clone(), instances)
            })
            .collect()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn instance_count(&self) -> usize {
        self.services.iter().map(|e| e.value().len()).sum()
    }

    /// 收集心跳超时的实例 (服务名, 实例ID)
    pub fn expired_instances(&self) -> Vec<(String, String)> {
        let now = self.clock.now_millis();
        let threshold = self.threshold_millis();
        let mut expired = Vec::new();

        for entry in self.services.iter() {
            for instance in entry.value().values() {
                if instance.is_expired(now, threshold) {
                    expired.push((entry.key().clone(), instance.instance_id.clone()));
                }
            }
        }
        expired
    }

    /// 在写锁内复查心跳，仍超时才移除
    pub fn evict_if_expired(&self, service_name: &str, instance_id: &str) -> bool {
        let now = self.clock.now_millis();
        let threshold = self.threshold_millis();

        let evicted = match self.services.get_mut(service_name) {
            Some(mut instances) => {
                let expired = instances
                    .get(instance_id)
                    .is_some_and(|i| i.is_expired(now, threshold));
                expired && instances.remove(instance_id).is_some()
            }
            None => false,
        };

        if evicted {
            self.services.remove_if(service_name, |_, v| v.is_empty());
            self.counters.record(Operation::Evicted);
        }
        evicted
    }

    pub fn clear(&self) {
        self.services.clear();
    }
}
