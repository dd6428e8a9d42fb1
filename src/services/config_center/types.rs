use serde::{Deserialize, Serialize};

pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// 配置项，version 与 contentHash 只由存储在发布时生成
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigItem {
    pub data_id: String,
    pub group: String,
    pub content: String,
    pub version: u64,
    pub content_hash: String,
    pub updated_at: u64,
}

/// 发布请求
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishRequest {
    pub data_id: String,
    pub group: Option<String>,
    pub content: String,
}

// 空分组按默认分组处理
pub fn normalize_group(group: Option<&str>) -> &str {
    match group {
        Some(g) if !g.trim().is_empty() => g,
        _ => DEFAULT_GROUP,
    }
}

pub fn config_key(data_id: &str, group: &str) -> String {
    format!("{data_id}:{group}")
}

pub fn content_hash(content: &str) -> String {
    format!("{:x}", md5::compute(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_defaults_when_missing_or_blank() {
        assert_eq!(normalize_group(None), DEFAULT_GROUP);
        assert_eq!(normalize_group(Some("")), DEFAULT_GROUP);
        assert_eq!(normalize_group(Some("  ")), DEFAULT_GROUP);
        assert_eq!(normalize_group(Some("PROD")), "PROD");
    }

    #[test]
    fn key_joins_data_id_and_group() {
        assert_eq!(config_key("svc-a", DEFAULT_GROUP), "svc-a:DEFAULT_GROUP");
    }

    #[test]
    fn content_hash_is_md5_hex() {
        assert_eq!(content_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(content_hash("hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_ne!(content_hash("x=1"), content_hash("x=2"));
    }
}
