//! Registry service module
//!
//! - `types`: 服务实例及注册请求
//! - `service`: 并发服务注册表

pub mod service;
pub mod types;

pub use service::ServiceRegistry;
pub use types::{InstanceStatus, RegisterRequest, ServiceInstance, ServiceInstances};
