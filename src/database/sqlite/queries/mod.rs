
use super::models::*;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

use crate::index::IndexBlobs;
use crate::llm::ChatMessage;

const COURSE_COLUMNS: &str =
    "id, title, description, index_faiss IS NOT NULL AS indexed, created_date";
const FILE_SUMMARY_COLUMNS: &str = "id, module_id, title, filename, ordering, \
     length(file_data) AS size_bytes, index_faiss IS NOT NULL AS indexed, created_date";

pub struct CourseQueries;

impl CourseQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_course: NewCourse) -> Result<Course> {
        let id = sqlx::query("INSERT INTO courses (title, description) VALUES (?, ?)")
            .bind(&new_course.title)
            .bind(&new_course.description)
            .execute(pool)
            .await
            .context("Failed to create course")?
            .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created course"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Course>> {
        sqlx::query_as::<_, Course>(&format!(
            "SELECT {} FROM courses WHERE id = ?",
            COURSE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get course by id")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Course>> {
        sqlx::query_as::<_, Course>(&format!(
            "SELECT {} FROM courses ORDER BY id",
            COURSE_COLUMNS
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list courses")
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete course")?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct ModuleQueries;

impl ModuleQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_module: NewModule) -> Result<Module> {
        let ordering = match new_module.ordering {
            Some(ordering) => ordering,
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COALESCE(MAX(ordering) + 1, 0) FROM modules WHERE course_id = ?",
                )
                .bind(new_module.course_id)
                .fetch_one(pool)
                .await
                .context("Failed to compute module ordering")?
            }
        };

        let id = sqlx::query("INSERT INTO modules (course_id, title, ordering) VALUES (?, ?, ?)")
            .bind(new_module.course_id)
            .bind(&new_module.title)
            .bind(ordering)
            .execute(pool)
            .await
            .context("Failed to create module")?
            .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created module"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Module>> {
        sqlx::query_as::<_, Module>(
            "SELECT id, course_id, title, ordering FROM modules WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get module by id")
    }

    #[inline]
    pub async fn list_by_course(pool: &SqlitePool, course_id: i64) -> Result<Vec<Module>> {
        sqlx::query_as::<_, Module>(
            "SELECT id, course_id, title, ordering FROM modules \
             WHERE course_id = ? ORDER BY ordering, id",
        )
        .bind(course_id)
        .fetch_all(pool)
        .await
        .context("Failed to list modules for course")
    }
}

pub struct FileQueries;

impl FileQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_file: NewFile) -> Result<FileSummary> {
        let ordering = match new_file.ordering {
            Some(ordering) => ordering,
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COALESCE(MAX(ordering) + 1, 0) FROM files WHERE module_id = ?",
                )
                .bind(new_file.module_id)
                .fetch_one(pool)
                .await
                .context("Failed to compute file ordering")?
            }
        };

        let id = sqlx::query(
            "INSERT INTO files (module_id, title, filename, file_data, ordering) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(new_file.module_id)
        .bind(&new_file.title)
        .bind(&new_file.filename)
        .bind(&new_file.file_data)
        .bind(ordering)
        .execute(pool)
        .await
        .context("Failed to create file")?
        .last_insert_rowid();

        debug!(
            "Stored file {} ({} bytes) as id {}",
            new_file.filename,
            new_file.file_data.len(),
            id
        );

        Self::get_summary(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created file"))
    }

    #[inline]
    pub async fn get_summary(pool: &SqlitePool, id: i64) -> Result<Option<FileSummary>> {
        sqlx::query_as::<_, FileSummary>(&format!(
            "SELECT {} FROM files WHERE id = ?",
            FILE_SUMMARY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get file by id")
    }

    #[inline]
    pub async fn get_with_data(pool: &SqlitePool, id: i64) -> Result<Option<StoredFile>> {
        sqlx::query_as::<_, StoredFile>(
            "SELECT id, module_id, title, filename, file_data, ordering FROM files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get file content")
    }

    #[inline]
    pub async fn list_by_module(pool: &SqlitePool, module_id: i64) -> Result<Vec<FileSummary>> {
        sqlx::query_as::<_, FileSummary>(&format!(
            "SELECT {} FROM files WHERE module_id = ? ORDER BY ordering, id",
            FILE_SUMMARY_COLUMNS
        ))
        .bind(module_id)
        .fetch_all(pool)
        .await
        .context("Failed to list files for module")
    }

    /// Every file of a course, by module ordering then file ordering
    #[inline]
    pub async fn list_by_course_with_data(
        pool: &SqlitePool,
        course_id: i64,
    ) -> Result<Vec<StoredFile>> {
        sqlx::query_as::<_, StoredFile>(
            "SELECT f.id, f.module_id, f.title, f.filename, f.file_data, f.ordering \
             FROM files f JOIN modules m ON f.module_id = m.id \
             WHERE m.course_id = ? \
             ORDER BY m.ordering, m.id, f.ordering, f.id",
        )
        .bind(course_id)
        .fetch_all(pool)
        .await
        .context("Failed to list files for course")
    }

    #[inline]
    pub async fn course_id(pool: &SqlitePool, file_id: i64) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT m.course_id FROM files f JOIN modules m ON f.module_id = m.id WHERE f.id = ?",
        )
        .bind(file_id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up course for file")
    }
}

pub struct IndexBlobQueries;

impl IndexBlobQueries {
    /// Overwrite both blobs in one statement inside a transaction
    #[inline]
    pub async fn replace(pool: &SqlitePool, owner: IndexOwner, blobs: &IndexBlobs) -> Result<()> {
        let mut tx = pool
            .begin()
            .await
            .context("Failed to begin index transaction")?;

        let result = sqlx::query(&format!(
            "UPDATE {} SET index_faiss = ?, index_pkl = ? WHERE id = ?",
            owner.table()
        ))
        .bind(&blobs.index)
        .bind(&blobs.metadata)
        .bind(owner.id())
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to store index for {}", owner))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .context("Failed to roll back index transaction")?;
            anyhow::bail!("Cannot store index: {} does not exist", owner);
        }

        tx.commit()
            .await
            .context("Failed to commit index transaction")?;

        debug!(
            "Stored index for {} ({} + {} bytes)",
            owner,
            blobs.index.len(),
            blobs.metadata.len()
        );
        Ok(())
    }

    /// `None` when the row is missing or has never been indexed
    #[inline]
    pub async fn get(pool: &SqlitePool, owner: IndexOwner) -> Result<Option<IndexBlobs>> {
        let row = sqlx::query_as::<_, (Option<Vec<u8>>, Option<Vec<u8>>)>(&format!(
            "SELECT index_faiss, index_pkl FROM {} WHERE id = ?",
            owner.table()
        ))
        .bind(owner.id())
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to load index for {}", owner))?;

        Ok(match row {
            Some((Some(index), Some(metadata))) => Some(IndexBlobs { index, metadata }),
            _ => None,
        })
    }
}

pub struct ChatQueries;

impl ChatQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_chat: NewChat) -> Result<Chat> {
        let id = sqlx::query("INSERT INTO chats (user_id, course_id, title) VALUES (?, ?, ?)")
            .bind(&new_chat.user_id)
            .bind(new_chat.course_id)
            .bind(&new_chat.title)
            .execute(pool)
            .await
            .context("Failed to create chat")?
            .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created chat"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Chat>> {
        sqlx::query_as::<_, Chat>(
            "SELECT id, user_id, course_id, title, created_date FROM chats WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get chat by id")
    }

    #[inline]
    pub async fn list_by_course(pool: &SqlitePool, course_id: i64) -> Result<Vec<Chat>> {
        sqlx::query_as::<_, Chat>(
            "SELECT id, user_id, course_id, title, created_date FROM chats \
             WHERE course_id = ? ORDER BY id",
        )
        .bind(course_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chats for course")
    }
}

pub struct MessageQueries;

impl MessageQueries {
    #[inline]
    pub async fn append(pool: &SqlitePool, chat_id: i64, message: &ChatMessage) -> Result<i64> {
        let id = sqlx::query("INSERT INTO messages (chat_id, role, content) VALUES (?, ?, ?)")
            .bind(chat_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .execute(pool)
            .await
            .context("Failed to append chat message")?
            .last_insert_rowid();
        Ok(id)
    }

    /// Messages of a chat in insertion order
    #[inline]
    pub async fn list_by_chat(pool: &SqlitePool, chat_id: i64) -> Result<Vec<StoredMessage>> {
        sqlx::query_as::<_, StoredMessage>(
            "SELECT id, chat_id, role, content, created_date FROM messages \
             WHERE chat_id = ? ORDER BY id",
        )
        .bind(chat_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chat messages")
    }
}
