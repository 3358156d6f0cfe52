use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::{ChatRepository, IndexRepository};
use crate::index::IndexBlobs;
use crate::llm::ChatMessage;

#[cfg(test)]
mod tests;

pub mod models;
pub mod queries;

pub use models::{
    Chat, Course, FileSummary, IndexOwner, Module, NewChat, NewCourse, NewFile, NewModule,
    StoredFile, StoredMessage,
};
pub use queries::{
    ChatQueries, CourseQueries, FileQueries, IndexBlobQueries, MessageQueries, ModuleQueries,
};

pub type DbPool = Pool<Sqlite>;

pub const DATABASE_FILENAME: &str = "coral.db";

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join(DATABASE_FILENAME)).await
    }

    // Course operations
    pub async fn create_course(&self, new_course: NewCourse) -> Result<Course> {
        CourseQueries::create(&self.pool, new_course).await
    }

    pub async fn get_course(&self, id: i64) -> Result<Option<Course>> {
        CourseQueries::get_by_id(&self.pool, id).await
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        CourseQueries::list_all(&self.pool).await
    }

    // Module operations
    pub async fn create_module(&self, new_module: NewModule) -> Result<Module> {
        CourseQueries::get_by_id(&self.pool, new_module.course_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Course {} does not exist", new_module.course_id))?;
        ModuleQueries::create(&self.pool, new_module).await
    }

    pub async fn list_modules(&self, course_id: i64) -> Result<Vec<Module>> {
        ModuleQueries::list_by_course(&self.pool, course_id).await
    }

    // File operations
    pub async fn create_file(&self, new_file: NewFile) -> Result<FileSummary> {
        ModuleQueries::get_by_id(&self.pool, new_file.module_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Module {} does not exist", new_file.module_id))?;
        FileQueries::create(&self.pool, new_file).await
    }

    pub async fn list_files(&self, module_id: i64) -> Result<Vec<FileSummary>> {
        FileQueries::list_by_module(&self.pool, module_id).await
    }

    pub async fn get_file_summary(&self, file_id: i64) -> Result<Option<FileSummary>> {
        FileQueries::get_summary(&self.pool, file_id).await
    }
}

#[async_trait]
impl IndexRepository for Database {
    async fn get_file(&self, file_id: i64) -> Result<Option<StoredFile>> {
        FileQueries::get_with_data(&self.pool, file_id).await
    }

    async fn list_course_files(&self, course_id: i64) -> Result<Vec<StoredFile>> {
        FileQueries::list_by_course_with_data(&self.pool, course_id).await
    }

    async fn replace_file_index(&self, file_id: i64, blobs: &IndexBlobs) -> Result<()> {
        IndexBlobQueries::replace(&self.pool, IndexOwner::File(file_id), blobs).await
    }

    async fn replace_course_index(&self, course_id: i64, blobs: &IndexBlobs) -> Result<()> {
        IndexBlobQueries::replace(&self.pool, IndexOwner::Course(course_id), blobs).await
    }

    async fn file_index(&self, file_id: i64) -> Result<Option<IndexBlobs>> {
        IndexBlobQueries::get(&self.pool, IndexOwner::File(file_id)).await
    }

    async fn course_index(&self, course_id: i64) -> Result<Option<IndexBlobs>> {
        IndexBlobQueries::get(&self.pool, IndexOwner::Course(course_id)).await
    }

    async fn course_id_for_file(&self, file_id: i64) -> Result<Option<i64>> {
        FileQueries::course_id(&self.pool, file_id).await
    }
}

#[async_trait]
impl ChatRepository for Database {
    async fn create_chat(&self, new_chat: NewChat) -> Result<Chat> {
        ChatQueries::create(&self.pool, new_chat).await
    }

    async fn get_chat(&self, chat_id: i64) -> Result<Option<Chat>> {
        ChatQueries::get_by_id(&self.pool, chat_id).await
    }

    async fn chat_history(&self, chat_id: i64) -> Result<Vec<ChatMessage>> {
        MessageQueries::list_by_chat(&self.pool, chat_id)
            .await?
            .iter()
            .map(StoredMessage::to_chat_message)
            .collect()
    }

    async fn append_message(&self, chat_id: i64, message: &ChatMessage) -> Result<()> {
        MessageQueries::append(&self.pool, chat_id, message).await?;
        Ok(())
    }
}
