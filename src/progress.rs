use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::{
    catalog::{self, Chapter},
    enrollment,
    error::ApiError,
};

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Progress {
    pub id: i64,
    pub user_id: i64,
    pub chapter_id: i64,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// Chapter content joined with the requesting user's completion state.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChapterProgressView {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub course_title: String,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// Read-only projection for the by-id endpoint. A chapter the user never
/// touched reads as not started instead of erroring.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressView {
    pub enrollment_id: i64,
    pub chapter_id: i64,
    pub chapter_title: String,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub course_category: Option<String>,
}

/// Chapter rows for the course-detail projection, carrying the
/// requester's completion flag. Anonymous requests read all-false.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChapterWithCompletion {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "order")]
    pub position: i64,
    pub completed: bool,
}

/// Chapters are addressed externally by their position within a course
/// ("chapter 1, 2, 3" in the URL). This is the only place that mapping
/// exists; everything else keys chapters by id.
pub async fn chapter_by_position(
    database: &SqlitePool,
    course_id: i64,
    position: i64,
) -> Result<Chapter, ApiError> {
    sqlx::query_as::<_, Chapter>(
        "SELECT id, course_id, title, description, position, created_at, updated_at \
         FROM chapter WHERE course_id = ? AND position = ?",
    )
    .bind(course_id)
    .bind(position)
    .fetch_optional(database)
    .await?
    .ok_or_else(|| ApiError::NotFound("Chapter not found.".to_string()))
}

/// Fetches the user's progress row for a chapter, creating the
/// not-yet-completed row on first access. Concurrent first accesses race
/// benignly: the loser's insert is ignored and the follow-up read wins.
pub async fn get_or_create(
    database: &SqlitePool,
    user_id: i64,
    chapter_id: i64,
) -> Result<Progress, ApiError> {
    sqlx::query(
        "INSERT INTO progress (user_id, chapter_id, completed) VALUES (?, ?, FALSE) \
         ON CONFLICT (user_id, chapter_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(chapter_id)
    .execute(database)
    .await?;
    Ok(sqlx::query_as::<_, Progress>(
        "SELECT id, user_id, chapter_id, completed, completed_at \
         FROM progress WHERE user_id = ? AND chapter_id = ?",
    )
    .bind(user_id)
    .bind(chapter_id)
    .fetch_one(database)
    .await?)
}

/// Moves the row between the incomplete and complete states. Completing
/// stamps `completed_at`; un-completing clears it.
pub async fn set_completed(
    database: &SqlitePool,
    progress_id: i64,
    completed: bool,
) -> Result<Progress, ApiError> {
    let completed_at = completed.then(OffsetDateTime::now_utc);
    sqlx::query("UPDATE progress SET completed = ?, completed_at = ? WHERE id = ?")
        .bind(completed)
        .bind(completed_at)
        .bind(progress_id)
        .execute(database)
        .await?;
    Ok(sqlx::query_as::<_, Progress>(
        "SELECT id, user_id, chapter_id, completed, completed_at FROM progress WHERE id = ?",
    )
    .bind(progress_id)
    .fetch_one(database)
    .await?)
}

/// By-order lookup with an optional completion toggle. The enrollment
/// gate comes first, so outsiders get the same answer whether or not the
/// chapter exists.
pub async fn chapter_progress_by_position(
    database: &SqlitePool,
    user_id: i64,
    course_id: i64,
    position: i64,
    set: Option<bool>,
) -> Result<ChapterProgressView, ApiError> {
    if !enrollment::is_enrolled(database, user_id, course_id).await? {
        return Err(ApiError::Forbidden(
            "You are not enrolled in this course.".to_string(),
        ));
    }
    let chapter = chapter_by_position(database, course_id, position).await?;
    let mut progress = get_or_create(database, user_id, chapter.id).await?;
    if let Some(completed) = set {
        progress = set_completed(database, progress.id, completed).await?;
    }
    let course = catalog::get_course(database, chapter.course_id).await?;
    Ok(ChapterProgressView {
        id: chapter.id,
        title: chapter.title,
        description: chapter.description,
        course_title: course.title,
        completed: progress.completed,
        completed_at: progress.completed_at,
    })
}

/// By-id lookup, read-only. The chapter decides which course gates the
/// request; a missing progress row reads as the not-started state.
pub async fn progress_by_chapter_id(
    database: &SqlitePool,
    user_id: i64,
    chapter_id: i64,
) -> Result<ProgressView, ApiError> {
    let chapter = sqlx::query_as::<_, Chapter>(
        "SELECT id, course_id, title, description, position, created_at, updated_at \
         FROM chapter WHERE id = ?",
    )
    .bind(chapter_id)
    .fetch_optional(database)
    .await?
    .ok_or_else(|| ApiError::NotFound("Chapter not found.".to_string()))?;
    let Some(enrollment) =
        enrollment::find_enrollment(database, user_id, chapter.course_id).await?
    else {
        return Err(ApiError::Forbidden(
            "You are not enrolled in this course.".to_string(),
        ));
    };
    let course = catalog::get_course(database, chapter.course_id).await?;
    let progress = sqlx::query_as::<_, Progress>(
        "SELECT id, user_id, chapter_id, completed, completed_at \
         FROM progress WHERE user_id = ? AND chapter_id = ?",
    )
    .bind(user_id)
    .bind(chapter.id)
    .fetch_optional(database)
    .await?;
    let (completed, completed_at) = match progress {
        Some(p) => (p.completed, p.completed_at),
        None => (false, None),
    };
    Ok(ProgressView {
        enrollment_id: enrollment.id,
        chapter_id: chapter.id,
        chapter_title: chapter.title,
        completed,
        completed_at,
        course_category: course.category,
    })
}

pub async fn chapters_with_completion(
    database: &SqlitePool,
    course_id: i64,
    user_id: Option<i64>,
) -> Result<Vec<ChapterWithCompletion>, ApiError> {
    // LEFT JOIN keeps chapters the user never touched.
    let rows = sqlx::query_as::<_, (i64, String, Option<String>, i64, Option<bool>)>(
        "SELECT c.id, c.title, c.description, c.position, p.completed \
         FROM chapter c \
         LEFT JOIN progress p ON p.chapter_id = c.id AND p.user_id = ? \
         WHERE c.course_id = ? ORDER BY c.position",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(database)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, title, description, position, completed)| ChapterWithCompletion {
            id,
            title,
            description,
            position,
            completed: completed.unwrap_or(false),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{account, catalog::test_data, utils::test_pool};

    struct Fixture {
        pool: SqlitePool,
        user_id: i64,
        course_id: i64,
    }

    /// One enrolled user, one course with chapters at positions 1 and 2.
    async fn enrolled() -> Fixture {
        let pool = test_pool().await;
        let user_id = account::signup(&pool, "a@x.com", "p1", "p1").await.unwrap();
        let course_id = test_data::course(&pool, "Rust").await;
        test_data::chapter(&pool, course_id, "one", 1).await;
        test_data::chapter(&pool, course_id, "two", 2).await;
        enrollment::enroll(&pool, user_id, course_id).await.unwrap();
        Fixture {
            pool,
            user_id,
            course_id,
        }
    }

    #[tokio::test]
    async fn outsider_is_forbidden_either_way() {
        let f = enrolled().await;
        let outsider = account::signup(&f.pool, "b@x.com", "p1", "p1").await.unwrap();
        // by order, chapter exists
        let err = chapter_progress_by_position(&f.pool, outsider, f.course_id, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        // by order, chapter does not exist: the gate still answers first
        let err = chapter_progress_by_position(&f.pool, outsider, f.course_id, 99, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        // by id
        let chapter = chapter_by_position(&f.pool, f.course_id, 1).await.unwrap();
        let err = progress_by_chapter_id(&f.pool, outsider, chapter.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn unknown_position_not_found_for_member() {
        let f = enrolled().await;
        let err = chapter_progress_by_position(&f.pool, f.user_id, f.course_id, 99, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn toggle_stamps_and_clears_completed_at() {
        let f = enrolled().await;
        let view =
            chapter_progress_by_position(&f.pool, f.user_id, f.course_id, 1, Some(true))
                .await
                .unwrap();
        assert!(view.completed);
        assert!(view.completed_at.is_some());
        assert_eq!(view.course_title, "Rust");

        let view =
            chapter_progress_by_position(&f.pool, f.user_id, f.course_id, 1, Some(false))
                .await
                .unwrap();
        assert!(!view.completed);
        assert!(view.completed_at.is_none());
    }

    #[tokio::test]
    async fn repeated_toggles_keep_a_single_row() {
        let f = enrolled().await;
        for _ in 0..3 {
            chapter_progress_by_position(&f.pool, f.user_id, f.course_id, 1, Some(true))
                .await
                .unwrap();
        }
        let chapter = chapter_by_position(&f.pool, f.course_id, 1).await.unwrap();
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM progress WHERE user_id = ? AND chapter_id = ?",
        )
        .bind(f.user_id)
        .bind(chapter.id)
        .fetch_one(&f.pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_row() {
        let f = enrolled().await;
        let chapter = chapter_by_position(&f.pool, f.course_id, 1).await.unwrap();
        let first = get_or_create(&f.pool, f.user_id, chapter.id).await.unwrap();
        let second = get_or_create(&f.pool, f.user_id, chapter.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(!first.completed);
    }

    #[tokio::test]
    async fn untouched_chapter_reads_not_started() {
        let f = enrolled().await;
        // a chapter added after enrollment has no fan-out row
        let late_id = test_data::chapter(&f.pool, f.course_id, "three", 3).await;
        let view = progress_by_chapter_id(&f.pool, f.user_id, late_id).await.unwrap();
        assert!(!view.completed);
        assert!(view.completed_at.is_none());
        // the read-only path must not have created a row
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM progress WHERE user_id = ? AND chapter_id = ?",
        )
        .bind(f.user_id)
        .bind(late_id)
        .fetch_one(&f.pool)
        .await
        .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn by_id_view_carries_enrollment_and_category() {
        let f = enrolled().await;
        let chapter = chapter_by_position(&f.pool, f.course_id, 1).await.unwrap();
        let view = progress_by_chapter_id(&f.pool, f.user_id, chapter.id).await.unwrap();
        let enrollment = enrollment::find_enrollment(&f.pool, f.user_id, f.course_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.enrollment_id, enrollment.id);
        assert_eq!(view.course_category.as_deref(), Some("testing"));
        assert_eq!(view.chapter_title, "one");
    }

    #[tokio::test]
    async fn unknown_chapter_id_not_found() {
        let f = enrolled().await;
        let err = progress_by_chapter_id(&f.pool, f.user_id, 999).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn detail_merges_completion_flags() {
        let f = enrolled().await;
        chapter_progress_by_position(&f.pool, f.user_id, f.course_id, 1, Some(true))
            .await
            .unwrap();
        let chapters = chapters_with_completion(&f.pool, f.course_id, Some(f.user_id))
            .await
            .unwrap();
        let flags: Vec<bool> = chapters.iter().map(|c| c.completed).collect();
        assert_eq!(flags, vec![true, false]);
        // anonymous requests read all-false
        let chapters = chapters_with_completion(&f.pool, f.course_id, None).await.unwrap();
        assert!(chapters.iter().all(|c| !c.completed));
    }
}
