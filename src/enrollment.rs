use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{catalog, error::ApiError};

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub enrolled_at: OffsetDateTime,
}

/// Enrolls the user in the course and fans out one progress row per
/// chapter the course has right now. Chapters added later get no
/// retroactive row; first access creates it lazily instead.
///
/// The (user_id, course_id) unique constraint is the duplicate check, and
/// both inserts share a transaction so a failed fan-out leaves no
/// enrollment behind.
pub async fn enroll(database: &SqlitePool, user_id: i64, course_id: i64) -> Result<i64, ApiError> {
    let course = catalog::get_course(database, course_id).await?;
    let mut tx = database.begin().await?;
    let enrollment_id =
        sqlx::query("INSERT INTO enrollment (user_id, course_id, enrolled_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(course.id)
            .bind(OffsetDateTime::now_utc())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                ApiError::conflict_or_db(e, "You are already enrolled in this course.")
            })?
            .last_insert_rowid();
    sqlx::query(
        "INSERT INTO progress (user_id, chapter_id, completed) \
         SELECT ?, id, FALSE FROM chapter WHERE course_id = ?",
    )
    .bind(user_id)
    .bind(course.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    info!("user {} enrolled in course {}-{}", user_id, course.id, course.title);
    Ok(enrollment_id)
}

pub async fn find_enrollment(
    database: &SqlitePool,
    user_id: i64,
    course_id: i64,
) -> Result<Option<Enrollment>, ApiError> {
    Ok(sqlx::query_as::<_, Enrollment>(
        "SELECT id, user_id, course_id, enrolled_at FROM enrollment \
         WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(database)
    .await?)
}

pub async fn is_enrolled(
    database: &SqlitePool,
    user_id: i64,
    course_id: i64,
) -> Result<bool, ApiError> {
    Ok(find_enrollment(database, user_id, course_id).await?.is_some())
}

pub async fn list_enrollments(database: &SqlitePool) -> Result<Vec<Enrollment>, ApiError> {
    Ok(sqlx::query_as::<_, Enrollment>(
        "SELECT id, user_id, course_id, enrolled_at FROM enrollment ORDER BY enrolled_at DESC",
    )
    .fetch_all(database)
    .await?)
}
