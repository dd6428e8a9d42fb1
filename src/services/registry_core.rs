use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use super::clock::{SharedClock, system_clock};
use super::config_center::{ConfigStore, PublishRequest};
use super::error::RegistryError;
use super::health::HealthSweeper;
use super::registry::{RegisterRequest, ServiceInstance, ServiceRegistry};
use super::response::{ApiResponse, MSG_CANCELLED, MSG_CHANGED, MSG_CONFIG_ABSENT, MSG_TIMEOUT};
use super::stats::{Operation, OperationCounters, RegistryStats};
use super::watch::WatchOutcome;

// 服务发现返回体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub service_name: String,
    pub instances: Vec<ServiceInstance>,
    pub total: usize,
}

/// 注册中心核心
///
/// 持有服务注册表、配置存储、订阅管理与过期清理任务，所有操作结果统一包装为
/// [`ApiResponse`]。进程内只需构造一次，通过 `Arc` 共享给接入层。
#[derive(Debug)]
pub struct RegistryCore {
    settings: Config,
    clock: SharedClock,
    counters: Arc<OperationCounters>,
    registry: Arc<ServiceRegistry>,
    configs: ConfigStore,
    sweeper: HealthSweeper,
    started_at: u64,
}

impl RegistryCore {
    pub fn new(settings: Config) -> Self {
        Self::with_clock(settings, system_clock())
    }

    pub fn with_clock(settings: Config, clock: SharedClock) -> Self {
        let counters = Arc::new(OperationCounters::default());
        let registry = Arc::new(ServiceRegistry::new(
            clock.clone(),
            settings.health_threshold(),
            counters.clone(),
        ));
        let configs = ConfigStore::new(clock.clone(), counters.clone());
        let sweeper = HealthSweeper::new(registry.clone(), settings.sweep_interval());
        let started_at = clock.now_millis();

        Self {
            settings,
            clock,
            counters,
            registry,
            configs,
            sweeper,
            started_at,
        }
    }

    pub fn settings(&self) -> &Config {
        &self.settings
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.configs
    }

    pub fn sweeper(&self) -> &HealthSweeper {
        &self.sweeper
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    fn error(&self, error: &RegistryError) -> ApiResponse {
        tracing::debug!(error = %error, "Request rejected");
        ApiResponse::from_error(error, self.now())
    }

    /// 启动后台清理任务
    pub fn start(&self) -> bool {
        self.sweeper.start()
    }

    /// 停止清理任务并结束所有等待中的长轮询
    pub async fn shutdown(&self) {
        self.sweeper.stop().await;
        let cancelled = self.configs.watchers().cancel_all();
        tracing::info!(cancelled_watches = cancelled, "Registry core shut down");
    }

    // ==================== 服务注册 ====================

    pub fn register(&self, request: RegisterRequest) -> ApiResponse {
        match self.registry.register(request) {
            Ok(instance) => {
                ApiResponse::success_with("Registration successful", &instance, self.now())
            }
            Err(e) => self.error(&e),
        }
    }

    pub fn deregister(&self, service_name: &str, instance_id: &str) -> ApiResponse {
        if self.registry.deregister(service_name, instance_id) {
            ApiResponse::success("Deregistration successful", self.now())
        } else {
            self.error(&RegistryError::not_found(format!(
                "instance {instance_id} of service {service_name}"
            )))
        }
    }

    pub fn heartbeat(&self, service_name: &str, instance_id: &str) -> ApiResponse {
        if self.registry.heartbeat(service_name, instance_id) {
            let now = self.now();
            ApiResponse::success_with("Heartbeat accepted", &now, now)
        } else {
            self.error(&RegistryError::not_found(format!(
                "instance {instance_id} of service {service_name}"
            )))
        }
    }

    pub fn heartbeat_instance(&self, request: RegisterRequest) -> ApiResponse {
        match self.registry.heartbeat_instance(request) {
            Ok(instance) => ApiResponse::success_with("Heartbeat accepted", &instance, self.now()),
            Err(e) => self.error(&e),
        }
    }

    pub fn list_instances(&self, service_name: &str) -> ApiResponse {
        let instances = self.registry.list_instances(service_name);
        ApiResponse::success_with("Instances listed", &instances, self.now())
    }

    pub fn discover(&self, service_name: &str) -> ApiResponse {
        let instances = self.registry.discover(service_name);
        let result = DiscoveryResult {
            service_name: service_name.to_string(),
            total: instances.len(),
            instances,
        };
        ApiResponse::success_with("Discovery successful", &result, self.now())
    }

    pub fn list_all_services(&self) -> ApiResponse {
        let services = self.registry.list_all_services();
        ApiResponse::success_with("Services listed", &services, self.now())
    }

    // ==================== 配置中心 ====================

    pub fn get_config(&self, data_id: &str, group: Option<&str>) -> ApiResponse {
        match self.configs.get(data_id, group) {
            Some(item) => ApiResponse::success_with("Config found", &item, self.now()),
            None => self.error(&RegistryError::not_found(format!("config {data_id}"))),
        }
    }

    pub fn publish_config(&self, request: PublishRequest) -> ApiResponse {
        match self
            .configs
            .publish(&request.data_id, request.group.as_deref(), &request.content)
        {
            Ok(item) => ApiResponse::success_with("Config published", &item, self.now()),
            Err(e) => self.error(&e),
        }
    }

    pub fn delete_config(&self, data_id: &str, group: Option<&str>) -> ApiResponse {
        if self.configs.delete(data_id, group) {
            ApiResponse::success("Config deleted", self.now())
        } else {
            self.error(&RegistryError::not_found(format!("config {data_id}")))
        }
    }

    pub fn list_configs(&self) -> ApiResponse {
        ApiResponse::success_with("Configs listed", &self.configs.list(), self.now())
    }

    /// 长轮询监听配置变更
    ///
    /// 超时返回 `success=true, message="timeout", data=null`，客户端需要重新发起监听。
    pub async fn watch_config(
        &self,
        data_id: &str,
        group: Option<&str>,
        known_hash: Option<&str>,
        timeout_ms: Option<u64>,
    ) -> ApiResponse {
        let timeout = self.settings.watch_timeout(timeout_ms);
        let outcome = match self
            .configs
            .watch(data_id, group, known_hash.unwrap_or_default(), timeout)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return self.error(&e),
        };

        let now = self.now();
        match outcome {
            WatchOutcome::Changed(Some(item)) => ApiResponse::success_with(MSG_CHANGED, &item, now),
            WatchOutcome::Changed(None) => ApiResponse::success(MSG_CONFIG_ABSENT, now),
            WatchOutcome::Timeout => ApiResponse::success(MSG_TIMEOUT, now),
            WatchOutcome::Cancelled => ApiResponse::success(MSG_CANCELLED, now),
        }
    }

    // ==================== 运维 ====================

    pub fn stats(&self) -> RegistryStats {
        let c = &self.counters;
        RegistryStats {
            status: "UP".to_string(),
            start_time: self.started_at,
            service_count: self.registry.service_count(),
            instance_count: self.registry.instance_count(),
            config_count: self.configs.len(),
            listener_count: self.configs.watchers().total_pending(),
            total_operations: c.total(),
            register_count: c.get(Operation::Register),
            update_count: c.get(Operation::Update),
            deregister_count: c.get(Operation::Deregister),
            heartbeat_count: c.get(Operation::Heartbeat),
            evicted_count: c.get(Operation::Evicted),
            config_publish_count: c.get(Operation::ConfigPublish),
            config_get_count: c.get(Operation::ConfigGet),
            config_delete_count: c.get(Operation::ConfigDelete),
            watch_count: c.get(Operation::Watch),
        }
    }

    pub fn health(&self) -> ApiResponse {
        ApiResponse::success_with("Service healthy", &self.stats(), self.now())
    }

    /// 清空所有服务、配置与订阅
    pub fn clear_all(&self) {
        self.registry.clear();
        self.configs.clear();
        self.counters.reset();
        tracing::info!("All registry data cleared");
    }
}
