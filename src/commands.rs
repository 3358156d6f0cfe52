use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::citations::CitationMap;
use crate::config::Config;
use crate::database::{
    ChatRepository, Database, IndexOwner, IndexRepository, NewChat, NewCourse, NewFile, NewModule,
};
use crate::embeddings::{OpenAiEmbedder, TextChunker, estimate_token_count};
use crate::extraction::extract_normalized;
use crate::index::VectorIndex;
use crate::indexer::{IndexBuilder, IndexLifecycle, load_index};
use crate::llm::OpenAiChatModel;
use crate::retrieval::{QaEngine, QueryOptions, list_citations};
use crate::tutor::{StudentProfile, TutorSession};

/// Per-invocation overrides for `ask`
#[derive(Debug, Clone, Default)]
pub struct AskOverrides {
    pub all_chunks: bool,
    pub include_sources: bool,
    pub top_k: Option<usize>,
    pub threshold: Option<usize>,
}

impl AskOverrides {
    #[inline]
    pub fn apply(&self, config: &Config) -> QueryOptions {
        let mut options = QueryOptions::from(&config.retrieval);
        options.include_sources |= self.include_sources;
        if let Some(top_k) = self.top_k {
            options.top_k = top_k;
        }
        if let Some(threshold) = self.threshold {
            options.threshold = threshold;
        }
        options
    }
}

/// Open the SQLite database under the configured base directory
#[inline]
pub async fn open_database(config: &Config) -> Result<Database> {
    Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize database")
}

fn spinner(message: String) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

#[inline]
pub async fn add_course(config: &Config, title: String, description: Option<String>) -> Result<()> {
    let database = open_database(config).await?;
    let course = database
        .create_course(NewCourse { title, description })
        .await
        .context("Failed to create course")?;

    println!(
        "Created course: {} (ID: {})",
        style(&course.title).bold(),
        course.id
    );
    Ok(())
}

#[inline]
pub async fn add_module(config: &Config, course_id: i64, title: String) -> Result<()> {
    let database = open_database(config).await?;
    let module = database
        .create_module(NewModule {
            course_id,
            title,
            ordering: None,
        })
        .await
        .context("Failed to create module")?;

    println!(
        "Created module: {} (ID: {}, position {})",
        style(&module.title).bold(),
        module.id,
        module.ordering
    );
    Ok(())
}

/// Store a file, then rebuild its index and its course's index
#[inline]
pub async fn add_file(
    config: &Config,
    module_id: i64,
    path: &Path,
    title: Option<String>,
    rebuild: bool,
) -> Result<()> {
    let file_data =
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;

    let text = extract_normalized(&file_data, &filename);
    if text.is_empty() {
        println!(
            "{} no text could be extracted from {}; it will not contribute to the index",
            style("Warning:").yellow().bold(),
            filename
        );
    } else {
        println!(
            "Extracted ~{} tokens from {}",
            estimate_token_count(&text),
            filename
        );
    }

    let database = open_database(config).await?;
    let file = database
        .create_file(NewFile {
            module_id,
            title: title.unwrap_or_else(|| filename.clone()),
            filename,
            file_data,
            ordering: None,
        })
        .await
        .context("Failed to store file")?;

    println!(
        "Stored file: {} (ID: {}, {} bytes)",
        style(&file.filename).bold(),
        file.id,
        file.size_bytes
    );

    if rebuild {
        rebuild_index(config, &database, IndexOwner::File(file.id)).await?;
    }
    Ok(())
}

#[inline]
pub async fn list_courses(config: &Config) -> Result<()> {
    let database = open_database(config).await?;
    let courses = database
        .list_courses()
        .await
        .context("Failed to list courses")?;

    if courses.is_empty() {
        println!("No courses have been added yet.");
        println!("Use 'coral-rag add-course <title>' to add one.");
        return Ok(());
    }

    println!("Courses ({} total):", courses.len());
    for course in &courses {
        println!();
        println!(
            "{} (ID: {}) {}",
            style(&course.title).bold(),
            course.id,
            if course.indexed {
                style("indexed").green()
            } else {
                style("not indexed").yellow()
            }
        );
        if let Some(description) = &course.description {
            println!("   {}", style(description).dim());
        }

        for module in database.list_modules(course.id).await? {
            println!("   {}. {} (ID: {})", module.ordering + 1, module.title, module.id);
            for file in database.list_files(module.id).await? {
                println!(
                    "      - {} [{}] (ID: {}, {} bytes{})",
                    file.title,
                    file.filename,
                    file.id,
                    file.size_bytes,
                    if file.indexed { ", indexed" } else { "" }
                );
            }
        }
    }
    Ok(())
}

/// Rebuild `owner`'s index; a file rebuild also refreshes its course
#[inline]
pub async fn rebuild(config: &Config, owner: IndexOwner) -> Result<()> {
    let database = open_database(config).await?;
    rebuild_index(config, &database, owner).await
}

async fn rebuild_index(config: &Config, database: &Database, owner: IndexOwner) -> Result<()> {
    let embedder = OpenAiEmbedder::new(&config.openai)?;
    let chat = OpenAiChatModel::new(&config.openai)?;
    let chunker = TextChunker::new(config.chunking.clone())?;
    let lifecycle = IndexLifecycle::new(database, IndexBuilder::new(&embedder, &chat, chunker));

    let bar = spinner(format!("Rebuilding index for {}", owner));
    let result = match owner {
        IndexOwner::File(file_id) => lifecycle.on_file_changed(file_id).await,
        IndexOwner::Course(course_id) => lifecycle
            .rebuild_course_index(course_id)
            .await
            .map(|_| ()),
    };
    bar.finish_and_clear();
    result.with_context(|| format!("Failed to rebuild index for {}", owner))?;

    let index = load_index(database, owner).await?;
    if let Some((index_bytes, metadata_bytes)) = index_size(database, owner).await? {
        info!(
            "Stored index for {}: {} index bytes, {} metadata bytes",
            owner, index_bytes, metadata_bytes
        );
    }
    println!(
        "{} index for {}: {} chunks",
        style("Rebuilt").green().bold(),
        owner,
        index.len()
    );
    Ok(())
}

async fn load_or_explain(database: &Database, owner: IndexOwner) -> Result<VectorIndex> {
    load_index(database, owner).await.with_context(|| {
        format!(
            "No usable index for {}; run 'coral-rag rebuild' first",
            owner
        )
    })
}

#[inline]
pub async fn ask(
    config: &Config,
    owner: IndexOwner,
    query: &str,
    overrides: &AskOverrides,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Query must not be empty");
    }

    let database = open_database(config).await?;
    let index = load_or_explain(&database, owner).await?;
    debug!("Loaded index for {} with {} chunks", owner, index.len());

    let embedder = OpenAiEmbedder::new(&config.openai)?;
    let chat = OpenAiChatModel::new(&config.openai)?;
    let engine =
        QaEngine::new(&embedder, &chat).with_fallback_label(config.retrieval.fallback_label.as_str());

    let answer = if overrides.all_chunks {
        engine.answer_all_chunks(&index, query)?
    } else {
        let options = overrides.apply(config);
        info!(
            "Answering over {} (top_k {}, threshold {})",
            owner, options.top_k, options.threshold
        );
        engine.answer(&index, query, &options)?
    };

    println!("{}", answer);
    Ok(())
}

/// Print the citation of every source in a course index, optionally
/// writing the lookup table to `export`
#[inline]
pub async fn citations(config: &Config, course_id: i64, export: Option<&Path>) -> Result<()> {
    let database = open_database(config).await?;
    let index = load_or_explain(&database, IndexOwner::Course(course_id)).await?;
    let sources = list_citations(&index);

    if sources.is_empty() {
        println!("Course {} has no indexed sources.", course_id);
        return Ok(());
    }

    let mut table = CitationMap::default();
    for source in &sources {
        let citation = source.citation.as_deref().unwrap_or("(no citation)");
        println!(
            "{} {}",
            style(format!("[{}]", source.filename)).cyan(),
            citation
        );
        if let Some(citation) = &source.citation {
            table.insert(source.source_id.clone(), citation.clone());
        }
    }

    if let Some(path) = export {
        fs::write(path, table.to_csv())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!(
            "Wrote {} citations to {}",
            table.len(),
            style(path.display()).dim()
        );
    }
    Ok(())
}

/// Where a tutor message goes
#[derive(Debug, Clone)]
pub struct TutorTarget {
    pub course_id: i64,
    /// Existing chat, or `None` to start one
    pub chat_id: Option<i64>,
    pub user_id: String,
}

#[inline]
pub async fn tutor(
    config: &Config,
    target: &TutorTarget,
    profile_path: Option<&Path>,
    message: &str,
) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Message must not be empty");
    }

    let profile = load_profile(profile_path)?;
    let database = open_database(config).await?;
    let index = load_or_explain(&database, IndexOwner::Course(target.course_id)).await?;

    let chat_id = match target.chat_id {
        Some(chat_id) => {
            let chat = database
                .get_chat(chat_id)
                .await?
                .with_context(|| format!("Chat {} does not exist", chat_id))?;
            if chat.course_id != target.course_id {
                bail!(
                    "Chat {} belongs to course {}, not course {}",
                    chat_id,
                    chat.course_id,
                    target.course_id
                );
            }
            chat_id
        }
        None => {
            let chat = database
                .create_chat(NewChat {
                    user_id: target.user_id.clone(),
                    course_id: target.course_id,
                    title: "New Chat".to_string(),
                })
                .await?;
            println!("Started chat {}", style(chat.id).bold());
            chat.id
        }
    };

    let embedder = OpenAiEmbedder::new(&config.openai)?;
    let chat = OpenAiChatModel::for_model(&config.openai, &config.openai.tutor_model)?
        .with_temperature(config.tutor.temperature)
        .with_max_tokens(config.tutor.max_tokens);
    let session = TutorSession::new(&embedder, &chat, config.tutor.context_chunks);

    let reply = session
        .respond_in_chat(&database, chat_id, &profile, &index, message)
        .await?;
    println!("{}", reply);
    Ok(())
}

/// Student profile from a TOML file; an empty profile when no file is given
#[inline]
pub fn load_profile(path: Option<&Path>) -> Result<StudentProfile> {
    let Some(path) = path else {
        return Ok(StudentProfile::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse profile: {}", path.display()))
}

/// Stored blob sizes for `owner`, if its index was ever built
async fn index_size(database: &Database, owner: IndexOwner) -> Result<Option<(usize, usize)>> {
    let blobs = match owner {
        IndexOwner::Course(id) => database.course_index(id).await?,
        IndexOwner::File(id) => database.file_index(id).await?,
    };
    Ok(blobs.map(|blobs| (blobs.index.len(), blobs.metadata.len())))
}
