#[cfg(test)]
mod tests;

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::llm::{ChatMessage, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Whether an index blob pair is stored
    pub indexed: bool,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Module {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub ordering: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewModule {
    pub course_id: i64,
    pub title: String,
    /// Appended after the last module when unset
    pub ordering: Option<i64>,
}

/// File row without its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FileSummary {
    pub id: i64,
    pub module_id: i64,
    pub title: String,
    pub filename: String,
    pub ordering: i64,
    pub size_bytes: i64,
    pub indexed: bool,
    pub created_date: NaiveDateTime,
}

/// File row with the uploaded bytes
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StoredFile {
    pub id: i64,
    pub module_id: i64,
    pub title: String,
    pub filename: String,
    pub file_data: Vec<u8>,
    pub ordering: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub module_id: i64,
    pub title: String,
    pub filename: String,
    pub file_data: Vec<u8>,
    pub ordering: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Chat {
    pub id: i64,
    pub user_id: String,
    pub course_id: i64,
    pub title: String,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChat {
    pub user_id: String,
    pub course_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub chat_id: i64,
    pub role: String,
    pub content: String,
    pub created_date: NaiveDateTime,
}

impl StoredMessage {
    #[inline]
    pub fn to_chat_message(&self) -> Result<ChatMessage> {
        let role: Role = self.role.parse()?;
        Ok(ChatMessage {
            role,
            content: self.content.clone(),
        })
    }
}

/// Row that owns an index blob pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOwner {
    Course(i64),
    File(i64),
}

impl IndexOwner {
    #[inline]
    pub fn table(self) -> &'static str {
        match self {
            Self::Course(_) => "courses",
            Self::File(_) => "files",
        }
    }

    #[inline]
    pub fn id(self) -> i64 {
        match self {
            Self::Course(id) | Self::File(id) => id,
        }
    }
}

impl std::fmt::Display for IndexOwner {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Course(id) => write!(f, "course {}", id),
            Self::File(id) => write!(f, "file {}", id),
        }
    }
}
