use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::{
    account, catalog, enrollment,
    error::ApiError,
    progress::{self, ChapterProgressView, ProgressView},
};

pub const USER_SESSION_KEY: &str = "user_id";

/// Pulls the authenticated user id out of the session or rejects.
async fn require_user(session: &Session) -> Result<i64, ApiError> {
    match session.get::<i64>(USER_SESSION_KEY).await {
        Ok(Some(id)) => Ok(id),
        _ => Err(ApiError::Unauthorized(
            "You must be logged in.".to_string(),
        )),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password1: String,
    pub password2: String,
}

#[utoipa::path(
    context_path = "/api",
    path = "/signup",
    method(post),
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created"),
        (status = 400, description = "Invalid input or email taken")
    )
)]
pub async fn signup(
    State(database): State<SqlitePool>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    account::signup(&database, &req.email, &req.password1, &req.password2).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": "Account created successfully!" })),
    ))
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    context_path = "/api",
    path = "/login",
    method(post),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful, session established"),
        (status = 400, description = "Missing fields or invalid credentials")
    )
)]
#[axum::debug_handler]
pub async fn login(
    State(database): State<SqlitePool>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = account::login(&database, &req.email, &req.password).await?;
    session
        .insert(USER_SESSION_KEY, id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to establish session: {}", e))?;
    Ok(Json(json!({ "success": "Logged in successfully!" })))
}

#[utoipa::path(
    context_path = "/api",
    path = "/logout",
    method(post),
    responses(
        (status = 200, description = "Logout successful")
    )
)]
pub async fn logout(session: Session) -> Result<Json<Value>, ApiError> {
    session
        .flush()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to clear session: {}", e))?;
    Ok(Json(json!({ "success": "Logged out" })))
}

#[utoipa::path(
    context_path = "/api",
    path = "/me",
    method(get),
    responses(
        (status = 200, description = "Current identity", body = account::UserInfo),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn user_info(
    State(database): State<SqlitePool>,
    session: Session,
) -> Result<Json<account::UserInfo>, ApiError> {
    let user_id = require_user(&session).await?;
    Ok(Json(account::get_user_info(&database, user_id).await?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/courses/{course_id}/enroll",
    method(post),
    params(
        ("course_id" = i64, Path, description = "Course id")
    ),
    responses(
        (status = 201, description = "Enrolled"),
        (status = 400, description = "Already enrolled"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "Unknown course")
    )
)]
pub async fn enroll(
    State(database): State<SqlitePool>,
    session: Session,
    Path(course_id): Path<i64>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user_id = require_user(&session).await?;
    let course = catalog::get_course(&database, course_id).await?;
    let enrollment_id = enrollment::enroll(&database, user_id, course.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": format!("You have successfully enrolled in \"{}\".", course.title),
            "enrollment_id": enrollment_id,
        })),
    ))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChapterResponse {
    pub chapter: ChapterProgressView,
}

/// The chapter segment is the chapter's position within the course, not
/// its id.
#[utoipa::path(
    context_path = "/api",
    path = "/courses/{course_id}/chapters/{chapter_order}",
    method(get),
    params(
        ("course_id" = i64, Path, description = "Course id"),
        ("chapter_order" = i64, Path, description = "Chapter position within the course")
    ),
    responses(
        (status = 200, description = "Chapter with the caller's progress", body = ChapterResponse),
        (status = 403, description = "Not enrolled"),
        (status = 404, description = "Chapter not found")
    )
)]
pub async fn chapter_detail(
    State(database): State<SqlitePool>,
    session: Session,
    Path((course_id, chapter_order)): Path<(i64, i64)>,
) -> Result<Json<ChapterResponse>, ApiError> {
    let user_id = require_user(&session).await?;
    let chapter =
        progress::chapter_progress_by_position(&database, user_id, course_id, chapter_order, None)
            .await?;
    Ok(Json(ChapterResponse { chapter }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompletionRequest {
    #[serde(default)]
    pub completed: bool,
}

#[utoipa::path(
    context_path = "/api",
    path = "/courses/{course_id}/chapters/{chapter_order}",
    method(post),
    params(
        ("course_id" = i64, Path, description = "Course id"),
        ("chapter_order" = i64, Path, description = "Chapter position within the course")
    ),
    request_body = CompletionRequest,
    responses(
        (status = 200, description = "Updated chapter progress", body = ChapterResponse),
        (status = 403, description = "Not enrolled"),
        (status = 404, description = "Chapter not found")
    )
)]
pub async fn chapter_toggle(
    State(database): State<SqlitePool>,
    session: Session,
    Path((course_id, chapter_order)): Path<(i64, i64)>,
    Json(req): Json<CompletionRequest>,
) -> Result<Json<ChapterResponse>, ApiError> {
    let user_id = require_user(&session).await?;
    let chapter = progress::chapter_progress_by_position(
        &database,
        user_id,
        course_id,
        chapter_order,
        Some(req.completed),
    )
    .await?;
    Ok(Json(ChapterResponse { chapter }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressResponse {
    pub progress: ProgressView,
}

#[utoipa::path(
    context_path = "/api",
    path = "/courses/{course_id}/chapters/{chapter_id}/progress",
    method(get),
    params(
        ("course_id" = i64, Path, description = "Course id"),
        ("chapter_id" = i64, Path, description = "Chapter id")
    ),
    responses(
        (status = 200, description = "Progress view", body = ProgressResponse),
        (status = 403, description = "Not enrolled"),
        (status = 404, description = "Unknown chapter")
    )
)]
pub async fn chapter_progress(
    State(database): State<SqlitePool>,
    session: Session,
    Path((_course_id, chapter_id)): Path<(i64, i64)>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let user_id = require_user(&session).await?;
    // the chapter's own course gates the request, not the path segment
    let progress = progress::progress_by_chapter_id(&database, user_id, chapter_id).await?;
    Ok(Json(ProgressResponse { progress }))
}

pub fn get_user_scope() -> Router<SqlitePool> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(user_info))
        .route("/courses/{course_id}/enroll", post(enroll))
        .route(
            "/courses/{course_id}/chapters/{chapter_id}",
            get(chapter_detail).post(chapter_toggle),
        )
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/progress",
            get(chapter_progress),
        )
}
