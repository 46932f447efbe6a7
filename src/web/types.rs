//! Request/response types for the web API

use serde::{Deserialize, Serialize};

use crate::state::OutputMode;
use crate::store::BootMode;

/// Generic API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// `?type=keyconfig|macros|system`
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigQuery {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutRequest {
    pub layout: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutSwitchResponse {
    pub index: usize,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutsResponse {
    pub titles: Vec<String>,
    pub current: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub device: String,
    /// None until the first battery reading
    pub battery_percentage: Option<u8>,
    pub battery: String,
    pub charging: bool,
    pub externally_powered: bool,
    pub low_battery: bool,
    pub output_mode: OutputMode,
    pub output_locked: bool,
    pub caffeinated: bool,
    pub boot_mode: BootMode,
    pub layout: String,
    pub layout_index: usize,
    pub key_info: String,
}

/// Network settings as shown to clients; the password is never echoed
#[derive(Debug, Clone, Serialize)]
pub struct NetworkResponse {
    pub hostname: String,
    pub ssid: String,
    pub password_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_device: Option<String>,
}

/// Fields left out keep their stored value
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkUpdate {
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageFile {
    pub name: String,
    pub bytes: u64,
    pub size: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageResponse {
    pub files: Vec<StorageFile>,
    pub file_count: usize,
    pub used_bytes: u64,
    pub used: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeycodeEntry {
    pub code: u8,
    pub name: String,
}

/// Byte count with a B/KB/MB/GB suffix
pub fn human_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.2} KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.2} MB", b / KB / KB)
    } else {
        format!("{:.2} GB", b / KB / KB / KB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0 B")]
    #[case(1023, "1023 B")]
    #[case(1024, "1.00 KB")]
    #[case(1536, "1.50 KB")]
    #[case(5 * 1024 * 1024, "5.00 MB")]
    #[case(3 * 1024 * 1024 * 1024, "3.00 GB")]
    fn test_human_size(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(human_size(bytes), expected);
    }

    #[test]
    fn test_api_response_skips_empty_fields() {
        let json = serde_json::to_value(ApiResponse::ok(1)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "data": 1 }));
        let json = serde_json::to_value(ApiResponse::<()>::error("overflowed")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "error": "overflowed" })
        );
    }
}
