pub mod clock;
pub mod config_center;
pub mod error;
pub mod health;
pub mod registry;
pub mod registry_core;
pub mod response;
pub mod stats;
pub mod watch;

pub use config_center::{ConfigItem, ConfigStore, PublishRequest};
pub use registry_core::RegistryCore;
pub use error::{RegistryError, RegistryResult};
pub use health::HealthSweeper;
pub use registry::{InstanceStatus, RegisterRequest, ServiceInstance, ServiceRegistry};
pub use response::ApiResponse;
pub use watch::{WatchManager, WatchOutcome};
