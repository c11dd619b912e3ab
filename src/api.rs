// 🌐 REST API - lookup, create, delete and bulk import of SWIFT codes
//
// All routes live under /v1/swift-codes. Error bodies are always
// {"message": "..."}.

use crate::db::{
    delete_swift_code, find_by_code, find_by_country, find_by_hq_code, insert_swift_code,
};
use crate::entities::SwiftCode;
use crate::error::{ImportError, StoreError};
use crate::parser::{decode_rows, SourceFormat};
use crate::reconciliation::{import_rows, ImportReport};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Upload limit for import files
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        MessageResponse {
            message: message.into(),
        }
    }
}

/// Single record, as returned for a branch and inside `branches`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwiftCodeDetails {
    pub address: String,
    pub bank_name: String,
    #[serde(rename = "countryISO2")]
    pub country_iso2: String,
    pub country_name: String,
    pub is_headquarter: bool,
    pub swift_code: String,
}

impl From<SwiftCode> for SwiftCodeDetails {
    fn from(code: SwiftCode) -> Self {
        SwiftCodeDetails {
            address: code.address,
            bank_name: code.bank_name,
            country_iso2: code.country_iso2,
            country_name: code.country_name,
            is_headquarter: code.is_headquarter,
            swift_code: code.swift_code,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadquartersResponse {
    #[serde(flatten)]
    pub details: SwiftCodeDetails,
    pub branches: Vec<SwiftCodeDetails>,
}

/// Entry of a country listing (no country name per entry)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryEntry {
    pub address: String,
    pub bank_name: String,
    #[serde(rename = "countryISO2")]
    pub country_iso2: String,
    pub is_headquarter: bool,
    pub swift_code: String,
}

impl From<SwiftCode> for CountryEntry {
    fn from(code: SwiftCode) -> Self {
        CountryEntry {
            address: code.address,
            bank_name: code.bank_name,
            country_iso2: code.country_iso2,
            is_headquarter: code.is_headquarter,
            swift_code: code.swift_code,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryResponse {
    #[serde(rename = "countryISO2")]
    pub country_iso2: String,
    pub country_name: String,
    pub swift_codes: Vec<CountryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: ImportReport,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => {
                error!("internal error: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };

        (status, Json(MessageResponse::new(message))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => {
                ApiError::Conflict("SWIFT code already exists in database".to_string())
            }
            StoreError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Store(e) => e.into(),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

// ============================================================================
// REQUEST VALIDATION
// ============================================================================

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwiftCodeRequest {
    pub swift_code: String,
    pub address: String,
    pub bank_name: String,
    #[serde(rename = "countryISO2")]
    pub country_iso2: String,
    pub country_name: String,
}

impl SwiftCodeRequest {
    /// First violated rule, if any
    pub fn validate(&self) -> Result<(), String> {
        let blank = |s: &str| s.trim().is_empty();

        if blank(&self.swift_code) {
            return Err("SWIFT code is required".to_string());
        }
        if !is_valid_code_length(&self.swift_code) {
            return Err("SWIFT code must be between 8 and 11 characters".to_string());
        }
        if blank(&self.address) {
            return Err("Address is required".to_string());
        }
        if blank(&self.bank_name) {
            return Err("Bank name is required".to_string());
        }
        if blank(&self.country_iso2) {
            return Err("Country ISO2 code is required".to_string());
        }
        if self.country_iso2.chars().count() != 2 {
            return Err("Country ISO2 code must be exactly 2 characters".to_string());
        }
        if blank(&self.country_name) {
            return Err("Country name is required".to_string());
        }

        Ok(())
    }

    pub fn into_swift_code(self) -> SwiftCode {
        SwiftCode::new(
            self.swift_code,
            self.bank_name,
            self.country_iso2,
            self.country_name,
            self.address,
        )
    }
}

fn is_valid_code_length(code: &str) -> bool {
    (8..=11).contains(&code.chars().count())
}

// ============================================================================
// API HANDLERS
// ============================================================================

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(MessageResponse::new("OK"))
}

/// GET /v1/swift-codes/:swift_code
async fn get_swift_code(
    State(state): State<AppState>,
    Path(swift_code): Path<String>,
) -> Result<Response, ApiError> {
    if !is_valid_code_length(&swift_code) {
        return Err(ApiError::BadRequest("Invalid SWIFT code format".to_string()));
    }

    let conn = state.lock()?;

    let record = find_by_code(&conn, &swift_code)?
        .ok_or_else(|| ApiError::NotFound("SWIFT code not found".to_string()))?;

    if record.is_headquarter {
        let branches = find_by_hq_code(&conn, &record.swift_code)?
            .into_iter()
            .map(SwiftCodeDetails::from)
            .collect();

        let response = HeadquartersResponse {
            details: record.into(),
            branches,
        };
        Ok(Json(response).into_response())
    } else {
        Ok(Json(SwiftCodeDetails::from(record)).into_response())
    }
}

/// GET /v1/swift-codes/country/:country_iso2
async fn get_by_country(
    State(state): State<AppState>,
    Path(country_iso2): Path<String>,
) -> Result<Json<CountryResponse>, ApiError> {
    let records = {
        let conn = state.lock()?;
        find_by_country(&conn, &country_iso2)?
    };

    let country_name = records
        .first()
        .map(|r| r.country_name.clone())
        .ok_or_else(|| {
            ApiError::NotFound("No SWIFT codes found for the given country".to_string())
        })?;

    Ok(Json(CountryResponse {
        country_iso2: country_iso2.to_uppercase(),
        country_name,
        swift_codes: records.into_iter().map(CountryEntry::from).collect(),
    }))
}

/// POST /v1/swift-codes
async fn add_swift_code(
    State(state): State<AppState>,
    payload: Result<Json<SwiftCodeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    request.validate().map_err(ApiError::BadRequest)?;

    let stored = {
        let conn = state.lock()?;
        insert_swift_code(&conn, &request.into_swift_code())?
    };
    info!(swift_code = %stored.swift_code, hq = ?stored.hq_swift_code, "SWIFT code added");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("SWIFT code added successfully")),
    ))
}

/// DELETE /v1/swift-codes/:swift_code
async fn remove_swift_code(
    State(state): State<AppState>,
    Path(swift_code): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let removed = {
        let conn = state.lock()?;
        delete_swift_code(&conn, &swift_code)?
    };

    if !removed {
        return Err(ApiError::NotFound("SWIFT code not found".to_string()));
    }

    info!(swift_code = %swift_code, "SWIFT code deleted");
    Ok(Json(MessageResponse::new("SWIFT code deleted successfully")))
}

/// POST /v1/swift-codes/import - multipart upload, field "file"
async fn import_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>, ApiError> {
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) = match upload {
        Some((filename, bytes)) if !bytes.is_empty() => (filename, bytes),
        _ => {
            warn!("import rejected: no file or empty file");
            return Err(ApiError::BadRequest("Please upload valid excel file".to_string()));
        }
    };

    // Excel unless the upload says otherwise
    let format = match filename.as_deref() {
        Some(name) if name.contains('.') => SourceFormat::from_filename(name)?,
        _ => SourceFormat::Xlsx,
    };

    let rows = tokio::task::spawn_blocking(move || decode_rows(&bytes, format))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let report = {
        let mut conn = state.lock()?;
        import_rows(&rows, &mut *conn)?
    };

    Ok(Json(ImportResponse {
        message: "File uploaded and processed successfully".to_string(),
        report,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/swift-codes", post(add_swift_code))
        .route("/v1/swift-codes/import", post(import_file))
        .route("/v1/swift-codes/country/:country_iso2", get(get_by_country))
        .route(
            "/v1/swift-codes/:swift_code",
            get(get_swift_code).delete(remove_swift_code),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// TESTS
// ============================================================================
