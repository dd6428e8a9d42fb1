use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::services::registry::ServiceRegistry;

// 单次运行：取消令牌与只跟踪本次任务的 tracker
#[derive(Debug)]
struct SweeperRun {
    token: CancellationToken,
    tracker: TaskTracker,
}

/// 心跳过期清理任务
///
/// 按固定间隔扫描注册表，移除心跳超过阈值的实例。
/// 任务可以停止后重新启动，每次启动使用独立的 tracker，停止时只等待自己取消的那次运行。
#[derive(Debug)]
pub struct HealthSweeper {
    registry: Arc<ServiceRegistry>,
    interval: Duration,
    current: Mutex<Option<SweeperRun>>,
}

impl HealthSweeper {
    pub fn new(registry: Arc<ServiceRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            current: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().is_some()
    }

    // 启动清理任务，已在运行时返回 false
    pub fn start(&self) -> bool {
        let mut current = self.current.lock();
        if current.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let registry = self.registry.clone();
        let sweep_interval = self.interval;

        let tracker = TaskTracker::new();
        tracker.spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        tracing::debug!("Executing instance expiration check...");
                        Self::sweep(&registry);
                    }
                }
            }
            tracing::info!("Health sweeper stopped");
        });
        tracker.close();

        *current = Some(SweeperRun { token, tracker });
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            threshold_secs = self.registry.health_threshold().as_secs(),
            "Health sweeper started"
        );
        true
    }

    // 停止清理任务并等待其退出
    pub async fn stop(&self) {
        let run = self.current.lock().take();
        let Some(run) = run else {
            return;
        };

        run.token.cancel();
        run.tracker.wait().await;
    }

    /// 立即执行一次清理，返回移除的实例数
    pub fn sweep_once(&self) -> usize {
        Self::sweep(&self.registry)
    }

    fn sweep(registry: &ServiceRegistry) -> usize {
        let expired = registry.expired_instances();
        if expired.is_empty() {
            return 0;
        }

        tracing::info!(
            expired_count = expired.len(),
            "Cleanup check completed, removing expired instances..."
        );

        let mut evicted = 0;
        for (service_name, instance_id) in expired {
            // 单个实例处理结果不影响其余实例
            if registry.evict_if_expired(&service_name, &instance_id) {
                tracing::warn!(
                    service_name = %service_name,
                    instance_id = %instance_id,
                    threshold_secs = registry.health_threshold().as_secs(),
                    "Instance expired due to heartbeat timeout, removed from registry"
                );
                evicted += 1;
            } else {
                tracing::debug!(
                    service_name = %service_name,
                    instance_id = %instance_id,
                    "Instance refreshed or removed before eviction"
                );
            }
        }
        evicted
    }
}

impl Drop for HealthSweeper {
    fn drop(&mut self) {
        if let Some(run) = self.current.get_mut().take() {
            run.token.cancel();
            tracing::debug!("Health sweeper dropped while running, task cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::services::registry::RegisterRequest;
    use crate::services::stats::OperationCounters;

    fn setup() -> (HealthSweeper, Arc<ServiceRegistry>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let registry = Arc::new(ServiceRegistry::new(
            clock.clone(),
            Duration::from_secs(30),
            Arc::new(OperationCounters::default()),
        ));
        let sweeper = HealthSweeper::new(registry.clone(), Duration::from_secs(10));
        (sweeper, registry, clock)
    }

    #[test]
    fn sweep_evicts_only_stale_instances() {
        let (sweeper, registry, clock) = setup();
        registry.register(RegisterRequest::new("order-service", "10.0.0.1", 8003)).unwrap();
        let fresh = registry
            .register(RegisterRequest::new("user-service", "10.0.0.2", 8001))
            .unwrap();

        clock.advance(Duration::from_secs(20));
        registry.heartbeat("user-service", &fresh.instance_id);
        clock.advance(Duration::from_secs(11));

        assert_eq!(sweeper.sweep_once(), 1);
        assert_eq!(registry.service_names(), vec!["user-service".to_string()]);
    }

    #[test]
    fn age_exactly_at_threshold_survives() {
        let (sweeper, registry, clock) = setup();
        registry.register(RegisterRequest::new("svc", "10.0.0.1", 1)).unwrap();

        clock.advance(Duration::from_secs(30));
        assert_eq!(sweeper.sweep_once(), 0);
        clock.advance(Duration::from_millis(1));
        assert_eq!(sweeper.sweep_once(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_can_stop_and_restart() {
        let (sweeper, registry, clock) = setup();
        registry.register(RegisterRequest::new("svc", "10.0.0.1", 1)).unwrap();

        assert!(sweeper.start());
        assert!(!sweeper.start());

        clock.advance(Duration::from_secs(31));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(registry.service_count(), 0);

        sweeper.stop().await;
        assert!(!sweeper.is_running());

        assert!(sweeper.start());
        sweeper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn restart_while_stopping_does_not_block_stop() {
        let (sweeper, _, _) = setup();
        assert!(sweeper.start());

        // stop 已取消旧任务但尚未等到其退出
        let mut stopping = Box::pin(sweeper.stop());
        assert!(futures::poll!(stopping.as_mut()).is_pending());
        assert!(sweeper.start());

        tokio::time::timeout(Duration::from_secs(2), stopping)
            .await
            .expect("stop should only wait for the run it cancelled");
        assert!(sweeper.is_running());

        sweeper.stop().await;
        assert!(!sweeper.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_running_sweeper_ends_task() {
        let (sweeper, registry, _) = setup();
        assert!(sweeper.start());
        assert_eq!(Arc::strong_count(&registry), 3);

        drop(sweeper);
        tokio::time::timeout(Duration::from_secs(1), async {
            while Arc::strong_count(&registry) > 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("sweeper task should exit after drop");
    }
}
