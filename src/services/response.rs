use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::RegistryError;

pub const MSG_TIMEOUT: &str = "timeout";
pub const MSG_CANCELLED: &str = "cancelled";
pub const MSG_CHANGED: &str = "changed";
pub const MSG_CONFIG_ABSENT: &str = "config not found";

/// 统一响应包装：{success, message, data, timestamp}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
    pub timestamp: u64,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>, timestamp: u64) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            timestamp,
        }
    }

    pub fn success_with<T: Serialize>(
        message: impl Into<String>,
        data: &T,
        timestamp: u64,
    ) -> Self {
        // 序列化失败按内部错误处理，不向上抛出
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                message: message.into(),
                data: Some(value),
                timestamp,
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response payload");
                Self::from_error(&RegistryError::from(e), timestamp)
            }
        }
    }

    pub fn error(message: impl Into<String>, timestamp: u64) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            timestamp,
        }
    }

    pub fn from_error(error: &RegistryError, timestamp: u64) -> Self {
        Self::error(error.to_string(), timestamp)
    }

    pub fn is_timeout(&self) -> bool {
        self.success && self.data.is_none() && self.message == MSG_TIMEOUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_camel_case_fields() {
        let resp = ApiResponse::success_with("ok", &vec![1, 2], 42);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["data"][1], 2);
    }

    #[test]
    fn timeout_marker_is_successful_without_data() {
        let resp = ApiResponse::success(MSG_TIMEOUT, 1);
        assert!(resp.is_timeout());
        assert!(!ApiResponse::error(MSG_TIMEOUT, 1).is_timeout());
    }

    #[test]
    fn error_carries_error_text() {
        let resp = ApiResponse::from_error(&RegistryError::validation("ip must not be empty"), 7);
        assert!(!resp.success);
        assert_eq!(resp.message, "Validation failed: ip must not be empty");
    }
}
