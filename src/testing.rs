// Deterministic model fakes shared by unit tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embeddings::{Embedder, EmbeddingError};
use crate::http::HttpError;
use crate::llm::{ChatError, ChatMessage, ChatModel};

/// Route `tracing` output through the test harness's captured writer
pub(crate) fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok(); // already installed by another test
}

/// Embeds text as keyword occurrence counts, one dimension per keyword
pub(crate) struct KeywordEmbedder {
    keywords: Vec<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub(crate) fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&["unused"])
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .map(|keyword| lower.matches(keyword.as_str()).count() as f32)
            .collect()
    }
}

impl Embedder for KeywordEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::Http(HttpError::Status(503)));
        }
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.keywords.len()
    }
}

type Reply = Box<dyn Fn(&[ChatMessage]) -> Result<String, ChatError> + Send + Sync>;

/// Chat model answering through a closure and recording every request
pub(crate) struct ScriptedChat {
    reply: Reply,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub(crate) fn new(
        reply: impl Fn(&[ChatMessage]) -> Result<String, ChatError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub(crate) fn failing() -> Self {
        Self::new(|_| Err(ChatError::Http(HttpError::Status(500))))
    }

    pub(crate) fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ChatModel for ScriptedChat {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(messages.to_vec());
        (self.reply)(messages)
    }
}
