//! Firmware upload, download, listing and deletion.
//!
//! Devices read; admins write. Uploads and deletions notify webhook
//! subscribers with the firmware DTO as event data.

use crate::error::{ApiError, ApiResult};
use crate::semver;
use crate::state::AppState;
use crate::storage::is_safe_segment;
use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use fwreg_auth::{AdminAccess, DeviceAccess};
use fwreg_db::Firmware;
use fwreg_webhooks::{FIRMWARE_DELETED, FIRMWARE_UPLOADED};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

/// Firmware as exposed over HTTP and in webhook events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareDto {
    #[serde(rename = "type")]
    pub firmware_type: String,
    pub version: String,
    pub filename: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl FirmwareDto {
    fn from_model(firmware: Firmware, state: &AppState) -> Self {
        let download_url = state.download_url(&firmware.firmware_type, &firmware.version);
        Self {
            firmware_type: firmware.firmware_type,
            version: firmware.version,
            filename: firmware.filename,
            size_bytes: firmware.size_bytes,
            sha256: firmware.sha256,
            created_at: firmware.created_at,
            download_url,
        }
    }
}

fn check_type(firmware_type: &str) -> ApiResult<()> {
    if is_safe_segment(firmware_type) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("invalid firmware type".into()))
    }
}

fn check_path(firmware_type: &str, version: &str) -> ApiResult<()> {
    check_type(firmware_type)?;
    if is_safe_segment(version) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("invalid version".into()))
    }
}

async fn sorted_versions(state: &AppState, firmware_type: &str) -> ApiResult<Vec<Firmware>> {
    let mut list = Firmware::list_by_type(state.db.inner(), firmware_type).await?;
    semver::sort_newest_first(&mut list, |f| f.version.as_str());
    Ok(list)
}

/// GET /api/firmware/{type}
///
/// All versions of a type, newest first.
pub async fn list(
    DeviceAccess(_): DeviceAccess,
    State(state): State<AppState>,
    Path(firmware_type): Path<String>,
) -> ApiResult<Json<Vec<FirmwareDto>>> {
    check_type(&firmware_type)?;
    let list = sorted_versions(&state, &firmware_type).await?;
    Ok(Json(
        list.into_iter()
            .map(|f| FirmwareDto::from_model(f, &state))
            .collect(),
    ))
}

/// GET /api/firmware/{type}/latest
pub async fn latest(
    DeviceAccess(_): DeviceAccess,
    State(state): State<AppState>,
    Path(firmware_type): Path<String>,
) -> ApiResult<Json<FirmwareDto>> {
    check_type(&firmware_type)?;
    sorted_versions(&state, &firmware_type)
        .await?
        .into_iter()
        .next()
        .map(|f| Json(FirmwareDto::from_model(f, &state)))
        .ok_or_else(|| ApiError::NotFound("no firmware".into()))
}

/// POST /api/firmware/{type}/{version}
///
/// Multipart upload with the binary in the `file` field. Re-uploading an
/// existing version replaces it.
pub async fn upload(
    AdminAccess(_): AdminAccess,
    State(state): State<AppState>,
    Path((firmware_type, version)): Path<(String, String)>,
    mut multipart: Multipart,
) -> ApiResult<Json<FirmwareDto>> {
    check_path(&firmware_type, &version)?;

    let mut upload: Option<(String, bytes::Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&state, &e))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("firmware.bin")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(&state, &e))?;
        upload = Some((filename, data));
        break;
    }
    let (filename, data) =
        upload.ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;

    tracing::info!(
        firmware_type = %firmware_type,
        version = %version,
        filename = %filename,
        "Starting firmware upload"
    );

    let stored = state.store.save(&firmware_type, &version, &data).await?;
    let firmware = Firmware {
        firmware_type,
        version,
        filename,
        size_bytes: stored.size_bytes,
        sha256: stored.sha256,
        created_at: Utc::now(),
    };
    Firmware::upsert(state.db.inner(), &firmware).await?;

    tracing::info!(
        firmware_type = %firmware.firmware_type,
        version = %firmware.version,
        size_bytes = firmware.size_bytes,
        sha256 = %firmware.sha256,
        "Firmware uploaded successfully"
    );

    let dto = FirmwareDto::from_model(firmware, &state);
    state.webhooks.dispatch(FIRMWARE_UPLOADED, &dto).await;
    Ok(Json(dto))
}

fn multipart_error(state: &AppState, err: &MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge {
            limit_mb: (state.max_upload_bytes / (1024 * 1024)) as u64,
        }
    } else {
        tracing::debug!(error = %err, "Rejected multipart upload");
        ApiError::BadRequest("invalid multipart".into())
    }
}

/// GET /api/firmware/{type}/{version}
///
/// Streams the binary with its checksum and version in response headers.
pub async fn download(
    DeviceAccess(_): DeviceAccess,
    State(state): State<AppState>,
    Path((firmware_type, version)): Path<(String, String)>,
) -> ApiResult<Response> {
    check_path(&firmware_type, &version)?;

    let firmware = Firmware::get(state.db.inner(), &firmware_type, &version)
        .await?
        .ok_or_else(|| ApiError::NotFound("not found".into()))?;

    let file = match state.store.open(&firmware_type, &version).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("missing binary".into()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(firmware.size_bytes));
    if let Ok(value) = HeaderValue::from_str(&firmware.sha256) {
        headers.insert("x-firmware-sha256", value);
    }
    if let Ok(value) = HeaderValue::from_str(&firmware.version) {
        headers.insert("x-firmware-version", value);
    }

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((StatusCode::OK, headers, body).into_response())
}

/// DELETE /api/firmware/{type}/{version}
pub async fn delete(
    AdminAccess(_): AdminAccess,
    State(state): State<AppState>,
    Path((firmware_type, version)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    check_path(&firmware_type, &version)?;

    let firmware = Firmware::get(state.db.inner(), &firmware_type, &version)
        .await?
        .ok_or_else(|| ApiError::NotFound("not found".into()))?;

    if let Err(e) = state.store.remove(&firmware_type, &version).await {
        tracing::warn!(
            firmware_type = %firmware_type,
            version = %version,
            error = %e,
            "Failed to remove firmware files"
        );
    }
    Firmware::delete(state.db.inner(), &firmware_type, &version).await?;

    tracing::info!(firmware_type = %firmware_type, version = %version, "Firmware deleted");

    let dto = FirmwareDto::from_model(firmware, &state);
    state.webhooks.dispatch(FIRMWARE_DELETED, &dto).await;
    Ok(Json(json!({ "deleted": true })))
}
