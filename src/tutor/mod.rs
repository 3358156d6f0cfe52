// Tutor module
// Personalized course chat grounded in the nearest course excerpts


use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::debug;

use crate::Result;
use crate::database::ChatRepository;
use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::llm::{ChatMessage, ChatModel};
use crate::retrieval::RetrievalError;

pub const TUTOR_SYSTEM_PROMPT: &str = "You are a helpful and knowledgeable AI tutor assisting a student. \
You must use the student's background and interests to personalize each explanation and response. \
If course content is relevant to the user's message, you must use it to answer. \
If the question is relevant to course material, but not specifically included, you can use your greater knowledge outside of course content. \
If it is not relevant, do not fabricate an answer. Instead, respond with:\n\n\
\"I'm here to help with this course, but that question isn't related to the material we've covered.\"\n\n\
Avoid speculation or answering based on general knowledge if the topic isn't in the course context.";

const EXCERPTS_PREAMBLE: &str = "The following excerpts are from course materials. \
You must use them to answer the student's question if relevant:\n\n";

/// Onboarding answers used to personalize replies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentProfile {
    pub name: Option<String>,
    pub occupation: Option<String>,
    pub tone: Option<String>,
    pub learning_style: Option<String>,
    /// beginner, intermediate or advanced
    pub depth: Option<String>,
    pub topics: Option<String>,
    pub interests: Option<String>,
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expertise {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Expertise {
    /// Unrecognized or missing depth counts as beginner
    #[inline]
    pub fn from_depth(depth: Option<&str>) -> Self {
        match depth.map(|d| d.trim().to_lowercase()).as_deref() {
            Some("intermediate") => Self::Intermediate,
            Some("advanced") => Self::Advanced,
            _ => Self::Beginner,
        }
    }

    #[inline]
    pub fn summary(self) -> &'static str {
        match self {
            Self::Beginner => "They prefer simple, clear explanations.",
            Self::Intermediate => "They want moderate technical depth.",
            Self::Advanced => "They want in-depth, technical explanations.",
        }
    }
}

impl StudentProfile {
    /// Filled-in fields as `Label: value`, joined by " • "
    #[inline]
    pub fn persona(&self) -> String {
        [
            ("Name", &self.name),
            ("Occupation", &self.occupation),
            ("Preferred tone", &self.tone),
            ("Learning style", &self.learning_style),
            ("Depth", &self.depth),
            ("Topics", &self.topics),
            ("Interests", &self.interests),
            ("Schedule", &self.schedule),
        ]
        .iter()
        .filter_map(|(label, value)| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(|v| format!("{}: {}", label, v))
        })
        .collect::<Vec<_>>()
        .join(" • ")
    }

    #[inline]
    pub fn expertise(&self) -> Expertise {
        Expertise::from_depth(self.depth.as_deref())
    }

    #[inline]
    pub fn persona_message(&self) -> ChatMessage {
        let persona = self.persona();
        let summary = self.expertise().summary();
        if persona.is_empty() {
            ChatMessage::system(summary)
        } else {
            ChatMessage::system(format!("{}. {}", persona, summary))
        }
    }
}

pub struct TutorSession<'a> {
    embedder: &'a dyn Embedder,
    chat: &'a dyn ChatModel,
    context_chunks: usize,
}

impl<'a> TutorSession<'a> {
    #[inline]
    pub fn new(embedder: &'a dyn Embedder, chat: &'a dyn ChatModel, context_chunks: usize) -> Self {
        Self {
            embedder,
            chat,
            context_chunks,
        }
    }

    /// System prompt, course excerpts, history, the new message, then the persona
    #[inline]
    pub fn build_messages(
        &self,
        student: &StudentProfile,
        course_index: &VectorIndex,
        history: &[ChatMessage],
        message: &str,
    ) -> std::result::Result<Vec<ChatMessage>, RetrievalError> {
        let mut messages = vec![ChatMessage::system(TUTOR_SYSTEM_PROMPT)];

        let excerpts = self.nearest_excerpts(course_index, message)?;
        if !excerpts.is_empty() {
            let mut content = EXCERPTS_PREAMBLE.to_string();
            for (i, excerpt) in excerpts.iter().enumerate() {
                if i > 0 {
                    content.push_str("\n\n");
                }
                let _ = write!(content, "Chunk {}:\n{}", i + 1, excerpt.trim());
            }
            messages.push(ChatMessage::system(content));
        }

        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(message));
        messages.push(student.persona_message());

        Ok(messages)
    }

    #[inline]
    pub fn respond(
        &self,
        student: &StudentProfile,
        course_index: &VectorIndex,
        history: &[ChatMessage],
        message: &str,
    ) -> std::result::Result<String, RetrievalError> {
        let messages = self.build_messages(student, course_index, history, message)?;
        debug!("Sending tutor request with {} messages", messages.len());
        Ok(self.chat.complete(&messages)?.trim().to_string())
    }

    /// Records the student's message, replies using the stored history,
    /// then records the reply
    #[inline]
    pub async fn respond_in_chat<R: ChatRepository + ?Sized>(
        &self,
        repository: &R,
        chat_id: i64,
        student: &StudentProfile,
        course_index: &VectorIndex,
        message: &str,
    ) -> Result<String> {
        let history = repository.chat_history(chat_id).await?;
        repository
            .append_message(chat_id, &ChatMessage::user(message))
            .await?;

        let reply = self.respond(student, course_index, &history, message)?;

        repository
            .append_message(chat_id, &ChatMessage::assistant(reply.as_str()))
            .await?;
        Ok(reply)
    }

    fn nearest_excerpts(
        &self,
        course_index: &VectorIndex,
        message: &str,
    ) -> std::result::Result<Vec<String>, RetrievalError> {
        if course_index.is_empty() || self.context_chunks == 0 {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed_query(message)?;
        let hits = course_index.search(&query, self.context_chunks)?;

        Ok(hits
            .iter()
            .filter_map(|hit| course_index.records().get(hit.position))
            .map(|record| record.content.clone())
            .filter(|content| !content.is_empty())
            .collect())
    }
}
