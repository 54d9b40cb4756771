use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Multipart, Path, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::accounts::{
    self, AdminLoginRequest, ChangePasswordRequest, RegisterAdminRequest, StudentLoginRequest,
};
use super::blob::BlobStore;
use super::db::DbHandle;
use super::directory::{self, ImageUpload, NewFaculty};
use super::models::{Actor, NewStudent, Role, TeachingAssignment};
use super::provisioning::provision_for;
use super::session::{ACCESS_COOKIE, AdminSession, REFRESH_COOKIE, StudentSession};
use super::submission::{self, SubmitFeedbackRequest};
use super::tokens::{TokenPair, TokenService};
use crate::config::AppConfig;
use crate::errors::{FeedbackError, FeedbackResult};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub tokens: TokenService,
    pub blobs: Arc<dyn BlobStore>,
    pub config: AppConfig,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetSummary {
    pub reset: usize,
}

// ── Response envelopes ────────────────────────────────────────────────

/// `{status, data, message, success: true}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, data, message)
    }

    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CREATED, data, message)
    }

    fn with_status(status: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            data,
            message: message.into(),
            success: true,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

// ── Error handling ────────────────────────────────────────────────────

/// `{status, error: <kind>, message, success: false}`. Server-side failures
/// are logged and replaced by a generic message.
impl IntoResponse for FeedbackError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match &self {
            FeedbackError::Blob(_) => {
                error!(error = %self, "Blob store request failed");
                "Image storage failed".to_string()
            }
            e if e.is_internal() => {
                error!(error = %self, "Request failed");
                "Internal server error".to_string()
            }
            e => e.to_string(),
        };
        let body = serde_json::json!({
            "status": status.as_u16(),
            "error": self.kind(),
            "message": message,
            "success": false,
        });
        (status, Json(body)).into_response()
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> FeedbackResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| FeedbackError::validation(rejection.body_text()))
}

fn path_param<T>(param: Result<Path<T>, PathRejection>) -> FeedbackResult<T> {
    param
        .map(|Path(v)| v)
        .map_err(|rejection| FeedbackError::validation(rejection.body_text()))
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .nest("/api/admin", admin_routes())
        .nest("/api/student", student_routes())
        .route("/health", get(health_check))
}

fn admin_routes() -> Router<SharedState> {
    Router::new()
        .route("/register", post(register_admin))
        .route("/login", post(login_admin))
        .route("/logout", post(logout_admin))
        .route("/refresh", post(refresh_admin))
        .route("/password", patch(change_password))
        .route("/admins", get(list_admins))
        .route("/me", delete(delete_me))
        .route("/students", post(add_student))
        .route("/students/{admission_no}", delete(delete_student))
        .route("/faculties", get(list_faculties).post(add_faculty))
        .route("/faculties/{emp_id}", delete(delete_faculty))
        .route("/faculties/{emp_id}/teaches", post(add_teaching))
        .route("/feedback/reset", patch(reset_feedback))
}

fn student_routes() -> Router<SharedState> {
    Router::new()
        .route("/login", post(login_student))
        .route("/logout", post(logout_student))
        .route("/refresh", post(refresh_student))
        .route("/feedback", get(list_feedback))
        .route("/feedback/{id}", get(open_feedback).post(submit_feedback))
}

// ── Cookies ───────────────────────────────────────────────────────────

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .build()
}

fn with_session_cookies(jar: CookieJar, pair: &TokenPair) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, pair.access_token.clone()))
        .add(session_cookie(REFRESH_COOKIE, pair.refresh_token.clone()))
}

fn without_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

/// A refresh token from the JSON body, else from the `refreshToken` cookie.
fn refresh_token_from(jar: &CookieJar, body: &Bytes) -> FeedbackResult<String> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(body)
            .map_err(|e| FeedbackError::validation(format!("Invalid request body: {}", e)))?
            .refresh_token
    };
    from_body
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| FeedbackError::auth("Refresh token is required"))
}

// ── Handlers: health ──────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

// ── Handlers: admin accounts ──────────────────────────────────────────

async fn register_admin(
    State(state): State<SharedState>,
    payload: Result<Json<RegisterAdminRequest>, JsonRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    let req = json_body(payload)?;
    let admin =
        accounts::register_admin(&state.db, &state.config.admin.registration_secret, req).await?;
    Ok(ApiResponse::created(admin, "Admin registered successfully"))
}

async fn login_admin(
    State(state): State<SharedState>,
    jar: CookieJar,
    payload: Result<Json<AdminLoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    let admin = accounts::login_admin(&state.db, json_body(payload)?).await?;
    let pair = state.tokens.issue_pair(&state.db, &Actor::Admin(admin.clone())).await?;
    let data = serde_json::json!({
        "admin": admin,
        "accessToken": pair.access_token,
        "refreshToken": pair.refresh_token,
    });
    Ok((
        with_session_cookies(jar, &pair),
        ApiResponse::ok(data, "Admin logged in successfully"),
    ))
}

async fn logout_admin(
    State(state): State<SharedState>,
    AdminSession(admin): AdminSession,
    jar: CookieJar,
) -> Result<impl IntoResponse, FeedbackError> {
    state.tokens.revoke(&state.db, Role::Admin, admin.id).await?;
    Ok((
        without_session_cookies(jar),
        ApiResponse::ok(serde_json::json!({}), "Admin logged out"),
    ))
}

async fn refresh_admin(
    State(state): State<SharedState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, FeedbackError> {
    let token = refresh_token_from(&jar, &body)?;
    let (_, pair) = state.tokens.rotate(&state.db, &token, Role::Admin).await?;
    Ok((
        with_session_cookies(jar, &pair),
        ApiResponse::ok(pair, "Access token refreshed"),
    ))
}

async fn change_password(
    State(state): State<SharedState>,
    AdminSession(admin): AdminSession,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    accounts::change_password(&state.db, &admin, json_body(payload)?).await?;
    Ok(ApiResponse::ok(serde_json::json!({}), "Password changed successfully"))
}

async fn list_admins(
    State(state): State<SharedState>,
    _session: AdminSession,
) -> Result<impl IntoResponse, FeedbackError> {
    let admins = accounts::list_admins(&state.db).await?;
    Ok(ApiResponse::ok(admins, "Admins fetched"))
}

async fn delete_me(
    State(state): State<SharedState>,
    AdminSession(admin): AdminSession,
    jar: CookieJar,
) -> Result<impl IntoResponse, FeedbackError> {
    accounts::delete_admin(&state.db, admin.id).await?;
    Ok((
        without_session_cookies(jar),
        ApiResponse::ok(serde_json::json!({}), "Admin deleted"),
    ))
}

// ── Handlers: directory ───────────────────────────────────────────────

async fn add_student(
    State(state): State<SharedState>,
    _session: AdminSession,
    payload: Result<Json<NewStudent>, JsonRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    let student = directory::add_student(&state.db, json_body(payload)?).await?;
    Ok(ApiResponse::created(student, "Student added successfully"))
}

async fn delete_student(
    State(state): State<SharedState>,
    _session: AdminSession,
    admission_no: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    let admission_no = path_param(admission_no)?;
    directory::delete_student(&state.db, &admission_no).await?;
    Ok(ApiResponse::ok(serde_json::json!({}), "Student deleted"))
}

async fn list_faculties(
    State(state): State<SharedState>,
    _session: AdminSession,
) -> Result<impl IntoResponse, FeedbackError> {
    let faculties = directory::list_faculties(&state.db).await?;
    Ok(ApiResponse::ok(faculties, "Faculties fetched"))
}

async fn add_faculty(
    State(state): State<SharedState>,
    _session: AdminSession,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    let mut multipart =
        multipart.map_err(|rejection| FeedbackError::validation(rejection.body_text()))?;
    let mut faculty = NewFaculty::default();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| FeedbackError::validation(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "empId" | "emp_id" => {
                faculty.emp_id = field
                    .text()
                    .await
                    .map_err(|e| FeedbackError::validation(format!("Invalid empId: {}", e)))?;
            }
            "name" => {
                faculty.name = field
                    .text()
                    .await
                    .map_err(|e| FeedbackError::validation(format!("Invalid name: {}", e)))?;
            }
            "image" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| FeedbackError::validation(format!("Invalid image: {}", e)))?;
                image = Some(ImageUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let created = directory::add_faculty(&state.db, &state.blobs, faculty, image).await?;
    Ok(ApiResponse::created(created, "Faculty added successfully"))
}

async fn add_teaching(
    State(state): State<SharedState>,
    _session: AdminSession,
    emp_id: Result<Path<String>, PathRejection>,
    payload: Result<Json<TeachingAssignment>, JsonRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    let emp_id = path_param(emp_id)?;
    let faculty = directory::add_teaching(&state.db, &emp_id, json_body(payload)?).await?;
    Ok(ApiResponse::ok(faculty, "Teaching assignment added"))
}

async fn delete_faculty(
    State(state): State<SharedState>,
    _session: AdminSession,
    emp_id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    let emp_id = path_param(emp_id)?;
    directory::delete_faculty(&state.db, &state.blobs, &emp_id).await?;
    Ok(ApiResponse::ok(serde_json::json!({}), "Faculty deleted"))
}

async fn reset_feedback(
    State(state): State<SharedState>,
    _session: AdminSession,
) -> Result<impl IntoResponse, FeedbackError> {
    if !state.config.feedback.bulk_reset_enabled {
        return Err(FeedbackError::forbidden("Bulk feedback reset is disabled"));
    }
    let reset = submission::bulk_reset(&state.db).await?;
    Ok(ApiResponse::ok(ResetSummary { reset }, "Feedback forms reset"))
}

// ── Handlers: students ────────────────────────────────────────────────

async fn login_student(
    State(state): State<SharedState>,
    jar: CookieJar,
    payload: Result<Json<StudentLoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    let student = accounts::login_student(&state.db, json_body(payload)?).await?;
    let pair = state
        .tokens
        .issue_pair(&state.db, &Actor::Student(student.clone()))
        .await?;
    let data = serde_json::json!({
        "student": student,
        "accessToken": pair.access_token,
        "refreshToken": pair.refresh_token,
    });
    Ok((
        with_session_cookies(jar, &pair),
        ApiResponse::ok(data, "Student logged in successfully"),
    ))
}

async fn logout_student(
    State(state): State<SharedState>,
    StudentSession(student): StudentSession,
    jar: CookieJar,
) -> Result<impl IntoResponse, FeedbackError> {
    state.tokens.revoke(&state.db, Role::Student, student.id).await?;
    Ok((
        without_session_cookies(jar),
        ApiResponse::ok(serde_json::json!({}), "Student logged out"),
    ))
}

async fn refresh_student(
    State(state): State<SharedState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, FeedbackError> {
    let token = refresh_token_from(&jar, &body)?;
    let (_, pair) = state.tokens.rotate(&state.db, &token, Role::Student).await?;
    Ok((
        with_session_cookies(jar, &pair),
        ApiResponse::ok(pair, "Access token refreshed"),
    ))
}

async fn list_feedback(
    State(state): State<SharedState>,
    StudentSession(student): StudentSession,
) -> Result<impl IntoResponse, FeedbackError> {
    let forms = provision_for(&state.db, student.id).await?;
    Ok(ApiResponse::ok(forms, "Feedback forms fetched"))
}

async fn open_feedback(
    State(state): State<SharedState>,
    StudentSession(student): StudentSession,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    let id = path_param(id)?;
    let form = submission::open(&state.db, id, student.id).await?;
    Ok(ApiResponse::ok(form, "Feedback form fetched"))
}

async fn submit_feedback(
    State(state): State<SharedState>,
    StudentSession(student): StudentSession,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<SubmitFeedbackRequest>, JsonRejection>,
) -> Result<impl IntoResponse, FeedbackError> {
    let id = path_param(id)?;
    let req = json_body(payload)?;
    let form = submission::submit(&state.db, id, student.id, req.questions).await?;
    Ok(ApiResponse::ok(form, "Feedback submitted successfully"))
}
