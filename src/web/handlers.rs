//! API endpoint handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::display::battery_text;
use crate::error::ConfigError;
use crate::keycode;
use crate::layout::SharedLayout;
use crate::state::{PowerRequest, RuntimeFlags, BATTERY_UNKNOWN};
use crate::store::{BootMode, ConfigStore, DocumentKind, ParsedConfig, RetainedStore};

use super::types::{
    human_size, ApiResponse, ConfigQuery, KeycodeEntry, LayoutRequest, LayoutSwitchResponse,
    LayoutsResponse, NetworkResponse, NetworkUpdate, StatusResponse, StorageFile,
    StorageResponse,
};

/// Shared application state for web handlers
pub struct AppState {
    pub store: ConfigStore,
    pub flags: Arc<RuntimeFlags>,
    pub layout: Arc<SharedLayout>,
    pub retained: Arc<RetainedStore>,
    pub device_name: String,
    pub hostname: String,
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

fn fail<T>(status: StatusCode, message: impl Into<String>) -> ApiResult<T> {
    (status, Json(ApiResponse::error(message)))
}

/// Map a store error onto an HTTP status
fn config_failure<T>(e: &ConfigError) -> ApiResult<T> {
    match e {
        ConfigError::TooLarge { .. } => fail(StatusCode::BAD_REQUEST, e.status()),
        ConfigError::Parse { .. } | ConfigError::Invalid { .. } => {
            fail(StatusCode::BAD_REQUEST, e.to_string())
        }
        ConfigError::NotFound(_) => fail(StatusCode::NOT_FOUND, e.to_string()),
        ConfigError::Storage(_) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.status()),
    }
}

/// Layout documents only; network settings go through /api/network
fn document_kind<T>(query: &ConfigQuery) -> Result<DocumentKind, ApiResult<T>> {
    match query.kind.parse::<DocumentKind>() {
        Ok(DocumentKind::System) => Err(fail(
            StatusCode::BAD_REQUEST,
            "system settings are served by /api/network",
        )),
        Ok(kind) => Ok(kind),
        Err(e) => Err(fail(StatusCode::BAD_REQUEST, e)),
    }
}

/// GET /api/config?type= - The stored document
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
) -> ApiResult<Value> {
    let kind = match document_kind(&query) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    match state.store.get_raw(kind) {
        Ok(value) => ok(value),
        Err(e) => config_failure(&e),
    }
}

/// PUT /api/config?type= - Replace a document; applied on the next scan cycle
pub async fn put_config(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
    body: String,
) -> ApiResult<String> {
    let kind = match document_kind(&query) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    match state.store.put_raw(kind, &body) {
        Ok(()) => {
            state.flags.request_keymap_update();
            info!("Updated {} via web", kind);
            ok(kind.to_string())
        }
        Err(e) => {
            warn!("Rejected {} upload: {}", kind, e);
            config_failure(&e)
        }
    }
}

/// POST /api/layout - Switch to a layout by title
pub async fn switch_layout(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LayoutRequest>,
) -> ApiResult<LayoutSwitchResponse> {
    let titles = layout_titles(&state);
    let Some(index) = titles.iter().position(|t| *t == request.layout) else {
        return fail(
            StatusCode::NOT_FOUND,
            format!("Layout '{}' not found", request.layout),
        );
    };

    state.flags.request_layout(index as i64);
    // Also picked up on the next boot if nothing is scanning right now
    if let Err(e) = state.retained.set_layout_index(index) {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    info!("Layout switch requested: {} ({})", request.layout, index);
    ok(LayoutSwitchResponse {
        index,
        title: request.layout,
    })
}

/// GET /api/layouts - Layout titles and the active index
pub async fn list_layouts(State(state): State<Arc<AppState>>) -> ApiResult<LayoutsResponse> {
    ok(LayoutsResponse {
        titles: layout_titles(&state),
        current: state.layout.snapshot().index,
    })
}

/// Titles from the stored document, so uploads show up before they are applied
fn layout_titles(state: &AppState) -> Vec<String> {
    match state.store.load_layers() {
        Ok(layers) => layers.into_iter().map(|l| l.title).collect(),
        Err(e) => {
            warn!("Falling back to active layout titles: {}", e);
            state.layout.snapshot().titles.clone()
        }
    }
}

/// GET /api/status - Runtime state
pub async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    let flags = &state.flags;
    let layout = state.layout.snapshot();
    let percent = flags.battery_percentage();
    ok(StatusResponse {
        device: state.device_name.clone(),
        battery_percentage: (percent != BATTERY_UNKNOWN).then_some(percent),
        battery: battery_text(flags),
        charging: flags.is_charging(),
        externally_powered: flags.is_externally_powered(),
        low_battery: flags.is_low_battery(),
        output_mode: flags.output_mode(),
        output_locked: flags.is_output_locked(),
        caffeinated: flags.is_caffeinated(),
        boot_mode: state.retained.load().boot_mode,
        layout: layout.title.clone(),
        layout_index: layout.index,
        key_info: flags.key_info(),
    })
}

/// GET /api/network - Network settings, without the password
pub async fn get_network(State(state): State<Arc<AppState>>) -> ApiResult<NetworkResponse> {
    match state.store.load_system() {
        Ok(system) => ok(NetworkResponse {
            hostname: state.hostname.clone(),
            ssid: system.ssid,
            password_set: !system.password.is_empty(),
            last_device: system.last_device,
        }),
        Err(e) => config_failure(&e),
    }
}

/// PUT /api/network - Update network settings
pub async fn put_network(
    State(state): State<Arc<AppState>>,
    Json(update): Json<NetworkUpdate>,
) -> ApiResult<NetworkResponse> {
    let mut system = match state.store.load_system() {
        Ok(system) => system,
        Err(e) => return config_failure(&e),
    };
    if let Some(ssid) = update.ssid {
        system.ssid = ssid;
    }
    if let Some(password) = update.password {
        system.password = password;
    }

    if let Err(e) = state
        .store
        .save_document(&ParsedConfig::System(system.clone()))
    {
        return config_failure(&e);
    }
    info!("Network settings updated (ssid '{}')", system.ssid);
    ok(NetworkResponse {
        hostname: state.hostname.clone(),
        ssid: system.ssid,
        password_set: !system.password.is_empty(),
        last_device: system.last_device,
    })
}

/// GET /api/storage - Stored files and usage
pub async fn get_storage(State(state): State<Arc<AppState>>) -> ApiResult<StorageResponse> {
    match state.store.usage() {
        Ok(usage) => {
            let files: Vec<StorageFile> = usage
                .files
                .into_iter()
                .map(|(name, bytes)| StorageFile {
                    name,
                    bytes,
                    size: human_size(bytes),
                })
                .collect();
            ok(StorageResponse {
                file_count: files.len(),
                files,
                used_bytes: usage.used_bytes,
                used: human_size(usage.used_bytes),
            })
        }
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /api/keypad-mode - Leave Config Mode by rebooting into the keypad runtime
pub async fn enter_keypad_mode(State(state): State<Arc<AppState>>) -> ApiResult<BootMode> {
    if state.retained.load().boot_mode != BootMode::Config {
        return fail(
            StatusCode::CONFLICT,
            "Config Mode was forced from the command line; restart without --config-mode",
        );
    }
    if !state.flags.request_power(PowerRequest::ToggleBootMode) {
        return fail(StatusCode::CONFLICT, "Another power transition is pending");
    }
    info!("Rebooting into keypad mode");
    ok(BootMode::Keypad)
}

/// GET /api/keycodes - HID usage names for the editor
pub async fn list_keycodes() -> ApiResult<Vec<KeycodeEntry>> {
    ok(keycode::catalog()
        .into_iter()
        .map(|(code, name)| KeycodeEntry { code, name })
        .collect())
}
