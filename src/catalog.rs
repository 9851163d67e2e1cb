use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::error::ApiError;

/// `position` is a display rank only. It is serialized as `order` to keep
/// the wire format callers already depend on.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Chapter {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "order")]
    pub position: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Article {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub content: String,
    #[serde(rename = "order")]
    pub position: i64,
}

pub async fn list_courses(database: &SqlitePool) -> Result<Vec<CourseSummary>, ApiError> {
    Ok(
        sqlx::query_as::<_, CourseSummary>("SELECT id, title FROM course ORDER BY id")
            .fetch_all(database)
            .await?,
    )
}

pub async fn get_course(database: &SqlitePool, course_id: i64) -> Result<Course, ApiError> {
    sqlx::query_as::<_, Course>(
        "SELECT id, title, description, category, created_at, updated_at \
         FROM course WHERE id = ?",
    )
    .bind(course_id)
    .fetch_optional(database)
    .await?
    .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))
}

pub async fn course_chapters(
    database: &SqlitePool,
    course_id: i64,
) -> Result<Vec<Chapter>, ApiError> {
    Ok(sqlx::query_as::<_, Chapter>(
        "SELECT id, course_id, title, description, position, created_at, updated_at \
         FROM chapter WHERE course_id = ? ORDER BY position",
    )
    .bind(course_id)
    .fetch_all(database)
    .await?)
}

pub async fn course_articles(
    database: &SqlitePool,
    course_id: i64,
) -> Result<Vec<Article>, ApiError> {
    Ok(sqlx::query_as::<_, Article>(
        "SELECT id, course_id, title, content, position \
         FROM article WHERE course_id = ? ORDER BY position",
    )
    .bind(course_id)
    .fetch_all(database)
    .await?)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewChapter {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "order")]
    pub position: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    #[serde(default, rename = "order")]
    pub position: i64,
}

pub async fn create_course(database: &SqlitePool, new: &NewCourse) -> Result<i64, ApiError> {
    if new.title.is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }
    let now = OffsetDateTime::now_utc();
    let result = sqlx::query(
        "INSERT INTO course (title, description, category, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.category)
    .bind(now)
    .bind(now)
    .execute(database)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn update_course(
    database: &SqlitePool,
    course_id: i64,
    new: &NewCourse,
) -> Result<(), ApiError> {
    if new.title.is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }
    let result = sqlx::query(
        "UPDATE course SET title = ?, description = ?, category = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.category)
    .bind(OffsetDateTime::now_utc())
    .bind(course_id)
    .execute(database)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Course not found".to_string()));
    }
    Ok(())
}

/// Chapters, articles, enrollments and progress rows go with the course.
pub async fn delete_course(database: &SqlitePool, course_id: i64) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM course WHERE id = ?")
        .bind(course_id)
        .execute(database)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Course not found".to_string()));
    }
    Ok(())
}

pub async fn create_chapter(
    database: &SqlitePool,
    course_id: i64,
    new: &NewChapter,
) -> Result<i64, ApiError> {
    if new.title.is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }
    let course = get_course(database, course_id).await?;
    let now = OffsetDateTime::now_utc();
    let result = sqlx::query(
        "INSERT INTO chapter (course_id, title, description, position, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(course.id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.position)
    .bind(now)
    .bind(now)
    .execute(database)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn create_article(
    database: &SqlitePool,
    course_id: i64,
    new: &NewArticle,
) -> Result<i64, ApiError> {
    if new.title.is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }
    let course = get_course(database, course_id).await?;
    let result = sqlx::query(
        "INSERT INTO article (course_id, title, content, position) VALUES (?, ?, ?, ?)",
    )
    .bind(course.id)
    .bind(&new.title)
    .bind(&new.content)
    .bind(new.position)
    .execute(database)
    .await?;
    Ok(result.last_insert_rowid())
}

#[cfg(test)]
pub(crate) mod test_data {
    use super::*;

    pub async fn course(pool: &SqlitePool, title: &str) -> i64 {
        create_course(
            pool,
            &NewCourse {
                title: title.to_string(),
                description: format!("about {title}"),
                category: Some("testing".to_string()),
            },
        )
        .await
        .unwrap()
    }

    pub async fn chapter(pool: &SqlitePool, course_id: i64, title: &str, position: i64) -> i64 {
        create_chapter(
            pool,
            course_id,
            &NewChapter {
                title: title.to_string(),
                description: None,
                position,
            },
        )
        .await
        .unwrap()
    }

    pub async fn article(pool: &SqlitePool, course_id: i64, title: &str, position: i64) -> i64 {
        create_article(
            pool,
            course_id,
            &NewArticle {
                title: title.to_string(),
                content: "lorem".to_string(),
                position,
            },
        )
        .await
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_pool;

    #[tokio::test]
    async fn chapters_sorted_by_position() {
        let pool = test_pool().await;
        let course_id = test_data::course(&pool, "Rust").await;
        test_data::chapter(&pool, course_id, "three", 3).await;
        test_data::chapter(&pool, course_id, "one", 1).await;
        test_data::chapter(&pool, course_id, "two", 2).await;
        let chapters = course_chapters(&pool, course_id).await.unwrap();
        let positions: Vec<i64> = chapters.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn articles_sorted_by_position() {
        let pool = test_pool().await;
        let course_id = test_data::course(&pool, "Rust").await;
        test_data::article(&pool, course_id, "b", 2).await;
        test_data::article(&pool, course_id, "a", 1).await;
        let articles = course_articles(&pool, course_id).await.unwrap();
        let titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unknown_course_not_found() {
        let pool = test_pool().await;
        let err = get_course(&pool, 42).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        let err = create_chapter(
            &pool,
            42,
            &NewChapter {
                title: "x".to_string(),
                description: None,
                position: 0,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_changes_fields() {
        let pool = test_pool().await;
        let course_id = test_data::course(&pool, "Rust").await;
        update_course(
            &pool,
            course_id,
            &NewCourse {
                title: "Rust 2024".to_string(),
                description: "updated".to_string(),
                category: None,
            },
        )
        .await
        .unwrap();
        let course = get_course(&pool, course_id).await.unwrap();
        assert_eq!(course.title, "Rust 2024");
        assert_eq!(course.category, None);
    }

    #[tokio::test]
    async fn deleting_course_cascades() {
        let pool = test_pool().await;
        let course_id = test_data::course(&pool, "Rust").await;
        test_data::chapter(&pool, course_id, "one", 1).await;
        test_data::article(&pool, course_id, "a", 1).await;
        delete_course(&pool, course_id).await.unwrap();
        assert!(course_chapters(&pool, course_id).await.unwrap().is_empty());
        assert!(course_articles(&pool, course_id).await.unwrap().is_empty());
    }
}
