use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::{
    account::{self, UserInfo},
    catalog::{self, NewArticle, NewChapter, NewCourse},
    enrollment::{self, Enrollment},
    error::ApiError,
};

pub const MANAGER_SESSION_KEY: &str = "manager_id";

async fn require_manager(session: &Session) -> Result<i64, ApiError> {
    match session.get::<i64>(MANAGER_SESSION_KEY).await {
        Ok(Some(id)) => Ok(id),
        _ => Err(ApiError::Unauthorized("Manager login required.".to_string())),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/login",
    method(post),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful"),
        (status = 400, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(database): State<SqlitePool>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = account::manager_login(&database, &req.email, &req.password).await?;
    session
        .insert(MANAGER_SESSION_KEY, id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to establish session: {}", e))?;
    Ok(Json(json!({ "success": "Login successful" })))
}

#[utoipa::path(
    context_path = "/api/manager",
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
    Ok(Json(json!({ "success": "Logout successful" })))
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/courses",
    method(post),
    request_body = NewCourse,
    responses(
        (status = 201, description = "Course created"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_course(
    State(database): State<SqlitePool>,
    session: Session,
    Json(req): Json<NewCourse>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_manager(&session).await?;
    let id = catalog::create_course(&database, &req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/courses/{course_id}",
    method(put),
    params(
        ("course_id" = i64, Path, description = "Course id")
    ),
    request_body = NewCourse,
    responses(
        (status = 200, description = "Course updated"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown course")
    )
)]
pub async fn update_course(
    State(database): State<SqlitePool>,
    session: Session,
    Path(course_id): Path<i64>,
    Json(req): Json<NewCourse>,
) -> Result<Json<Value>, ApiError> {
    require_manager(&session).await?;
    catalog::update_course(&database, course_id, &req).await?;
    Ok(Json(json!({ "success": "Course updated" })))
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/courses/{course_id}",
    method(delete),
    params(
        ("course_id" = i64, Path, description = "Course id")
    ),
    responses(
        (status = 200, description = "Course deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown course")
    )
)]
pub async fn delete_course(
    State(database): State<SqlitePool>,
    session: Session,
    Path(course_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    require_manager(&session).await?;
    catalog::delete_course(&database, course_id).await?;
    Ok(Json(json!({ "success": "Course deleted" })))
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/courses/{course_id}/chapters",
    method(post),
    params(
        ("course_id" = i64, Path, description = "Course id")
    ),
    request_body = NewChapter,
    responses(
        (status = 201, description = "Chapter created"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown course")
    )
)]
pub async fn create_chapter(
    State(database): State<SqlitePool>,
    session: Session,
    Path(course_id): Path<i64>,
    Json(req): Json<NewChapter>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_manager(&session).await?;
    let id = catalog::create_chapter(&database, course_id, &req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/courses/{course_id}/articles",
    method(post),
    params(
        ("course_id" = i64, Path, description = "Course id")
    ),
    request_body = NewArticle,
    responses(
        (status = 201, description = "Article created"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown course")
    )
)]
pub async fn create_article(
    State(database): State<SqlitePool>,
    session: Session,
    Path(course_id): Path<i64>,
    Json(req): Json<NewArticle>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_manager(&session).await?;
    let id = catalog::create_article(&database, course_id, &req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/users",
    method(get),
    responses(
        (status = 200, description = "All users", body = Vec<UserInfo>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_users(
    State(database): State<SqlitePool>,
    session: Session,
) -> Result<Json<Vec<UserInfo>>, ApiError> {
    require_manager(&session).await?;
    Ok(Json(account::list_users(&database).await?))
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/enrollments",
    method(get),
    responses(
        (status = 200, description = "All enrollments", body = Vec<Enrollment>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_enrollments(
    State(database): State<SqlitePool>,
    session: Session,
) -> Result<Json<Vec<Enrollment>>, ApiError> {
    require_manager(&session).await?;
    Ok(Json(enrollment::list_enrollments(&database).await?))
}

pub fn get_manager_scope() -> Router<SqlitePool> {
    Router::new().nest(
        "/manager",
        Router::new()
            .route("/login", post(login))
            .route("/logout", post(logout))
            .route("/courses", post(create_course))
            .route(
                "/courses/{course_id}",
                put(update_course).delete(delete_course),
            )
            .route("/courses/{course_id}/chapters", post(create_chapter))
            .route("/courses/{course_id}/articles", post(create_article))
            .route("/users", get(list_users))
            .route("/enrollments", get(list_enrollments)),
    )
}
