use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::{
    catalog::{self, Article, CourseSummary},
    error::ApiError,
    progress::{self, ChapterWithCompletion},
};

use super::user::USER_SESSION_KEY;

pub const CSRF_SESSION_KEY: &str = "csrf_token";

#[derive(Debug, Serialize, ToSchema)]
pub struct CourseListResponse {
    pub courses: Vec<CourseSummary>,
}

/// Full catalog scan, intentionally unpaginated.
#[utoipa::path(
    context_path = "/api",
    path = "/courses",
    method(get),
    responses(
        (status = 200, description = "All courses", body = CourseListResponse)
    )
)]
pub async fn course_list(
    State(database): State<SqlitePool>,
) -> Result<Json<CourseListResponse>, ApiError> {
    let courses = catalog::list_courses(&database).await?;
    Ok(Json(CourseListResponse { courses }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CourseDetailResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub chapters: Vec<ChapterWithCompletion>,
}

/// Course detail. Completion flags come from the requester's progress
/// when a session is present and read false otherwise.
#[utoipa::path(
    context_path = "/api",
    path = "/courses/{course_id}",
    method(get),
    params(
        ("course_id" = i64, Path, description = "Course id")
    ),
    responses(
        (status = 200, description = "Course with chapters", body = CourseDetailResponse),
        (status = 404, description = "Unknown course")
    )
)]
pub async fn course_detail(
    State(database): State<SqlitePool>,
    session: Session,
    Path(course_id): Path<i64>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let course = catalog::get_course(&database, course_id).await?;
    let user_id = session.get::<i64>(USER_SESSION_KEY).await.ok().flatten();
    let chapters = progress::chapters_with_completion(&database, course.id, user_id).await?;
    Ok(Json(CourseDetailResponse {
        id: course.id,
        title: course.title,
        description: course.description,
        chapters,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CourseArticlesResponse {
    pub id: i64,
    pub title: String,
    pub articles: Vec<Article>,
}

#[utoipa::path(
    context_path = "/api",
    path = "/courses/{course_id}/articles",
    method(get),
    params(
        ("course_id" = i64, Path, description = "Course id")
    ),
    responses(
        (status = 200, description = "Course articles", body = CourseArticlesResponse),
        (status = 404, description = "Unknown course")
    )
)]
pub async fn course_articles(
    State(database): State<SqlitePool>,
    Path(course_id): Path<i64>,
) -> Result<Json<CourseArticlesResponse>, ApiError> {
    let course = catalog::get_course(&database, course_id).await?;
    let articles = catalog::course_articles(&database, course.id).await?;
    Ok(Json(CourseArticlesResponse {
        id: course.id,
        title: course.title,
        articles,
    }))
}

/// Issues a session-bound token for state-changing form posts.
#[utoipa::path(
    context_path = "/api",
    path = "/csrf-token",
    method(get),
    responses(
        (status = 200, description = "Fresh CSRF token")
    )
)]
pub async fn csrf_token(session: Session) -> Result<Json<Value>, ApiError> {
    let token = format!("{:032x}", rand::random::<u128>());
    session
        .insert(CSRF_SESSION_KEY, token.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to store CSRF token: {}", e))?;
    Ok(Json(json!({ "csrfToken": token })))
}

pub fn get_public_scope() -> Router<SqlitePool> {
    Router::new()
        .route("/courses", get(course_list))
        .route("/courses/{course_id}", get(course_detail))
        .route("/courses/{course_id}/articles", get(course_articles))
        .route("/csrf-token", get(csrf_token))
}
