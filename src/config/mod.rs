// Configuration management module
// TOML settings for the model endpoints, chunking, retrieval and tutor prompts

pub mod settings;


use console::style;

pub use settings::{Config, ConfigError, OpenAiConfig, RetrievalConfig, TutorConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}

/// Print the effective configuration, never echoing the API key itself
#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Model Endpoint:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.openai.base_url).cyan());
    eprintln!(
        "  API key: {}",
        if config.openai.resolved_api_key().is_some() {
            style("set").green()
        } else {
            style("missing").red()
        }
    );
    eprintln!(
        "  Embedding model: {} ({} dims, batch {})",
        style(&config.openai.embedding_model).cyan(),
        config.openai.embedding_dimension,
        config.openai.batch_size
    );
    eprintln!("  Chat model: {}", style(&config.openai.chat_model).cyan());
    eprintln!("  Tutor model: {}", style(&config.openai.tutor_model).cyan());

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!(
        "  {} tokens per chunk, {} overlap",
        config.chunking.max_tokens, config.chunking.overlap
    );

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  top_k {}, threshold {}, sources {}",
        config.retrieval.top_k, config.retrieval.threshold, config.retrieval.include_sources
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}
