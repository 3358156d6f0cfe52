use super::*;
use crate::index::ChunkRecord;
use crate::llm::Role;
use crate::testing::{KeywordEmbedder, ScriptedChat};

const KEYWORDS: [&str; 3] = ["coral", "algae", "fish"];

fn record(source_id: &str, chunk_index: usize, content: &str, citation: Option<&str>) -> ChunkRecord {
    ChunkRecord {
        content: content.to_string(),
        source_id: source_id.to_string(),
        chunk_index,
        filename: format!("{}.txt", source_id),
        citation: citation.map(ToString::to_string),
    }
}

fn index_of(embedder: &KeywordEmbedder, records: Vec<ChunkRecord>) -> VectorIndex {
    let vectors = records.iter().map(|r| embedder.vector(&r.content)).collect();
    VectorIndex::build(records, vectors).expect("index should build")
}

/// General-knowledge requests carry only the user message
fn qa_chat(answer: &'static str) -> ScriptedChat {
    ScriptedChat::new(move |messages| {
        if messages.len() == 1 {
            Ok("Reefs are warm.".to_string())
        } else {
            Ok(answer.to_string())
        }
    })
}

fn options(top_k: usize, threshold: usize, include_sources: bool) -> QueryOptions {
    QueryOptions {
        top_k,
        threshold,
        include_sources,
    }
}

#[test]
fn single_chunk_triggers_fallback() {
    let embedder = KeywordEmbedder::new(&KEYWORDS);
    let chat = qa_chat("unused");
    let index = index_of(&embedder, vec![record("a", 0, "coral coral", None)]);

    let outcome = QaEngine::new(&embedder, &chat)
        .retrieve(&index, "coral?", &options(5, 2, false))
        .expect("retrieval should succeed");

    assert!(outcome.fell_back);
    assert_eq!(outcome.chunks.len(), 2);
    assert_eq!(outcome.chunks[0].source, "a.txt");
    assert_eq!(outcome.chunks[1].source, DEFAULT_FALLBACK_LABEL);
    assert_eq!(outcome.chunks[1].content, "Reefs are warm.");
    assert_eq!(outcome.chunks[1].hit, None);

    let requests = chat.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0], vec![ChatMessage::user("coral?")]);
}

#[test]
fn enough_chunks_skip_fallback() {
    let embedder = KeywordEmbedder::new(&KEYWORDS);
    let chat = qa_chat("unused");
    let index = index_of(
        &embedder,
        vec![
            record("a", 0, "coral", None),
            record("b", 0, "algae", None),
            record("c", 0, "fish", None),
        ],
    );

    let outcome = QaEngine::new(&embedder, &chat)
        .retrieve(&index, "coral", &options(5, 2, false))
        .expect("retrieval should succeed");

    assert!(!outcome.fell_back);
    assert_eq!(outcome.chunks.len(), 3);
    assert_eq!(outcome.chunks[0].source, "a.txt");
    assert!(outcome.chunks.iter().all(|c| c.hit.is_some()));
    assert!(chat.requests().is_empty());
}

#[test]
fn retrieval_is_deterministic() {
    let embedder = KeywordEmbedder::new(&KEYWORDS);
    let chat = qa_chat("unused");
    let index = index_of(
        &embedder,
        vec![
            record("a", 0, "coral algae", None),
            record("b", 0, "algae", None),
            record("c", 0, "fish coral", None),
        ],
    );
    let engine = QaEngine::new(&embedder, &chat);

    let first = engine
        .retrieve(&index, "coral algae fish", &options(2, 1, false))
        .expect("retrieval should succeed");
    let second = engine
        .retrieve(&index, "coral algae fish", &options(2, 1, false))
        .expect("retrieval should succeed");
    assert_eq!(first, second);
}

#[test]
fn empty_index_answers_from_general_knowledge() {
    let embedder = KeywordEmbedder::new(&KEYWORDS);
    let chat = qa_chat("Reefs are warm.");
    let index = VectorIndex::empty();

    let outcome = QaEngine::new(&embedder, &chat)
        .retrieve(&index, "coral?", &options(5, 2, false))
        .expect("retrieval should succeed");
    assert!(outcome.fell_back);
    assert_eq!(outcome.sources(), vec![DEFAULT_FALLBACK_LABEL.to_string()]);
}

#[test]
fn answer_stuffs_context_and_lists_sources_once() {
    let embedder = KeywordEmbedder::new(&KEYWORDS);
    let chat = qa_chat("Corals host algae.");
    let index = index_of(
        &embedder,
        vec![
            record("b", 0, "coral algae", Some("Bee, B. (2021). Reefs.")),
            record("b", 1, "coral algae coral", Some("Bee, B. (2021). Reefs.")),
            record("a", 0, "fish", None),
        ],
    );

    let answer = QaEngine::new(&embedder, &chat)
        .answer(&index, "coral algae", &options(2, 2, true))
        .expect("answer should succeed");

    assert_eq!(
        answer,
        "Corals host algae.\nSources:\n \nBee, B. (2021). Reefs."
    );

    let requests = chat.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0][0].role, Role::System);
    assert!(requests[0][0].content.contains("coral algae\n\ncoral algae coral"));
    assert_eq!(requests[0][1], ChatMessage::user("coral algae"));
}

#[test]
fn fallback_label_is_listed_as_source() {
    let embedder = KeywordEmbedder::new(&KEYWORDS);
    let chat = qa_chat("Reefs are warm and shallow.");
    let index = index_of(&embedder, vec![record("a", 0, "coral", None)]);

    let answer = QaEngine::new(&embedder, &chat)
        .with_fallback_label("OpenAI")
        .answer(&index, "coral", &options(5, 2, true))
        .expect("answer should succeed");

    assert_eq!(
        answer,
        "Reefs are warm and shallow.\nSources:\n \na.txt\n \nOpenAI"
    );
}

#[test]
fn unknown_answer_has_no_sources() {
    let embedder = KeywordEmbedder::new(&KEYWORDS);
    let chat = qa_chat("I do not know. The context is silent.");
    let index = index_of(
        &embedder,
        vec![record("a", 0, "coral", None), record("b", 0, "fish", None)],
    );

    let answer = QaEngine::new(&embedder, &chat)
        .answer(&index, "coral", &options(5, 2, true))
        .expect("answer should succeed");
    assert_eq!(answer, "I do not know");
}

#[test]
fn all_chunks_mode_skips_retrieval() {
    let embedder = KeywordEmbedder::new(&KEYWORDS);
    let chat = qa_chat("Summary.");
    let index = index_of(
        &embedder,
        vec![record("a", 0, "first", None), record("b", 0, "second", None)],
    );
    let embed_calls = embedder.calls();

    let answer = QaEngine::new(&embedder, &chat)
        .answer_all_chunks(&index, "Summarize")
        .expect("answer should succeed");

    assert_eq!(answer, "Summary.");
    assert_eq!(embedder.calls(), embed_calls);
    let requests = chat.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0][0].content.ends_with("first\n\nsecond"));
}

#[test]
fn failures_are_reported() {
    let embedder = KeywordEmbedder::new(&KEYWORDS);
    let index = index_of(&embedder, vec![record("a", 0, "coral", None)]);

    let failing_chat = ScriptedChat::failing();
    let result = QaEngine::new(&embedder, &failing_chat).answer(&index, "coral", &options(5, 2, false));
    assert!(matches!(result, Err(RetrievalError::Chat(_))));

    let failing_embedder = KeywordEmbedder::failing();
    let chat = qa_chat("unused");
    let result = QaEngine::new(&failing_embedder, &chat).answer(&index, "coral", &options(5, 2, false));
    assert!(matches!(result, Err(RetrievalError::Embedding(_))));
    assert!(chat.requests().is_empty());
}

#[test]
fn postprocess_unknown_variants() {
    assert_eq!(postprocess_answer("I do not know.", None), "I do not know");
    assert_eq!(postprocess_answer("  I DON'T KNOW", None), "I don't know");
    assert_eq!(postprocess_answer("Unknown. Sorry.", Some(&[])), "Unknown");
    assert_eq!(
        postprocess_answer("I'm not sure. Maybe coral?", None),
        "I'm not sure"
    );
    assert_eq!(
        postprocess_answer("Unknown species live there.", None),
        "Unknown species live there."
    );
}

#[test]
fn postprocess_sources_section() {
    let sources = vec!["A".to_string(), "B".to_string(), "A".to_string()];
    assert_eq!(
        postprocess_answer("Reefs grow slowly.", Some(&sources)),
        "Reefs grow slowly.\nSources:\n \nA\n \nB"
    );
    assert_eq!(
        postprocess_answer("Reefs grow slowly.", Some(&[])),
        "Reefs grow slowly.\nSources:"
    );
    assert_eq!(
        postprocess_answer("Reefs grow slowly.", None),
        "Reefs grow slowly."
    );
}

#[test]
fn citations_listed_per_source() {
    let embedder = KeywordEmbedder::new(&KEYWORDS);
    let index = index_of(
        &embedder,
        vec![
            record("b", 0, "coral", Some("Bee (2021)")),
            record("a", 0, "fish", None),
            record("b", 1, "algae", Some("Bee (2021)")),
        ],
    );

    assert_eq!(
        list_citations(&index),
        vec![
            CitedSource {
                source_id: "b".to_string(),
                filename: "b.txt".to_string(),
                citation: Some("Bee (2021)".to_string()),
            },
            CitedSource {
                source_id: "a".to_string(),
                filename: "a.txt".to_string(),
                citation: None,
            },
        ]
    );
}

#[test]
fn options_from_config() {
    let config = RetrievalConfig::default();
    assert_eq!(QueryOptions::from(&config), QueryOptions::default());
}
