// Database module
// SQLite storage for courses, uploaded files, index blobs and tutor chats

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::index::IndexBlobs;
use crate::llm::ChatMessage;

pub use sqlite::*;

/// Storage the index lifecycle reads source files from and writes blob pairs to
#[async_trait]
pub trait IndexRepository: Send + Sync {
    async fn get_file(&self, file_id: i64) -> Result<Option<StoredFile>>;

    /// Files of every module, by module ordering then file ordering
    async fn list_course_files(&self, course_id: i64) -> Result<Vec<StoredFile>>;

    /// Both blobs change together or not at all
    async fn replace_file_index(&self, file_id: i64, blobs: &IndexBlobs) -> Result<()>;

    async fn replace_course_index(&self, course_id: i64, blobs: &IndexBlobs) -> Result<()>;

    async fn file_index(&self, file_id: i64) -> Result<Option<IndexBlobs>>;

    async fn course_index(&self, course_id: i64) -> Result<Option<IndexBlobs>>;

    async fn course_id_for_file(&self, file_id: i64) -> Result<Option<i64>>;
}

/// Per-student conversation history
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_chat(&self, new_chat: NewChat) -> Result<Chat>;

    async fn get_chat(&self, chat_id: i64) -> Result<Option<Chat>>;

    /// Messages in the order they were appended
    async fn chat_history(&self, chat_id: i64) -> Result<Vec<ChatMessage>>;

    async fn append_message(&self, chat_id: i64, message: &ChatMessage) -> Result<()>;
}
