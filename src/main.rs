use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use coral_rag::Result;
use coral_rag::commands::{
    AskOverrides, TutorTarget, add_course, add_file, add_module, ask, citations, list_courses,
    rebuild, tutor,
};
use coral_rag::config::{Config, show_config};
use coral_rag::database::IndexOwner;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coral-rag")]
#[command(about = "Course indexing, cited retrieval QA and tutoring over uploaded course files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Exactly one of a course or a file
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct IndexTarget {
    /// Course ID
    #[arg(long)]
    course: Option<i64>,
    /// File ID
    #[arg(long)]
    file: Option<i64>,
}

impl IndexTarget {
    fn owner(&self) -> Option<IndexOwner> {
        self.course
            .map(IndexOwner::Course)
            .or_else(|| self.file.map(IndexOwner::File))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show or update the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Base URL of the OpenAI-compatible API
        #[arg(long)]
        base_url: Option<String>,
        /// Model used for answers and citations
        #[arg(long)]
        chat_model: Option<String>,
        /// Texts per embedding request
        #[arg(long)]
        batch_size: Option<u32>,
        /// Expected embedding vector length
        #[arg(long)]
        embedding_dimension: Option<u32>,
    },
    /// Create a course
    AddCourse {
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Append a module to a course
    AddModule {
        #[arg(long)]
        course: i64,
        title: String,
    },
    /// Upload a file into a module and reindex it
    AddFile {
        #[arg(long)]
        module: i64,
        path: PathBuf,
        /// Display title, defaults to the file name
        #[arg(long)]
        title: Option<String>,
        /// Store the file without rebuilding any index
        #[arg(long)]
        no_index: bool,
    },
    /// List courses with their modules and files
    List,
    /// Rebuild the stored index of a course or a file
    Rebuild {
        #[command(flatten)]
        target: IndexTarget,
    },
    /// Ask a question against a course or file index
    Ask {
        #[command(flatten)]
        target: IndexTarget,
        query: String,
        /// Put every chunk of the index in the prompt
        #[arg(long)]
        all_chunks: bool,
        /// Append the sources used
        #[arg(long)]
        sources: bool,
        /// Number of nearest chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
        /// Minimum chunks before falling back to general knowledge
        #[arg(long)]
        threshold: Option<usize>,
    },
    /// List the citation of every source in a course
    Citations {
        #[arg(long)]
        course: i64,
        /// Write a source,citation table to this path
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Chat with the course tutor
    Tutor {
        #[arg(long)]
        course: i64,
        /// Continue an existing chat instead of starting one
        #[arg(long)]
        chat: Option<i64>,
        #[arg(long, default_value = "cli")]
        user: String,
        /// TOML file with the student's profile
        #[arg(long)]
        profile: Option<PathBuf>,
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_default()?;

    match cli.command {
        Commands::Config {
            show,
            base_url,
            chat_model,
            batch_size,
            embedding_dimension,
        } => {
            let changed = base_url.is_some()
                || chat_model.is_some()
                || batch_size.is_some()
                || embedding_dimension.is_some();
            if let Some(base_url) = base_url {
                config.openai.set_base_url(base_url)?;
            }
            if let Some(chat_model) = chat_model {
                config.openai.set_chat_model(chat_model)?;
            }
            if let Some(batch_size) = batch_size {
                config.openai.set_batch_size(batch_size)?;
            }
            if let Some(dimension) = embedding_dimension {
                config.openai.set_embedding_dimension(dimension)?;
            }
            if changed || !config.config_file_path().exists() {
                config.save()?;
                eprintln!("Saved {}", config.config_file_path().display());
            }
            if show || !changed {
                show_config(&config);
            }
        }
        Commands::AddCourse { title, description } => {
            add_course(&config, title, description).await?;
        }
        Commands::AddModule { course, title } => {
            add_module(&config, course, title).await?;
        }
        Commands::AddFile {
            module,
            path,
            title,
            no_index,
        } => {
            add_file(&config, module, &path, title, !no_index).await?;
        }
        Commands::List => {
            list_courses(&config).await?;
        }
        Commands::Rebuild { target } => {
            let owner = target
                .owner()
                .ok_or_else(|| anyhow!("Either --course or --file is required"))?;
            rebuild(&config, owner).await?;
        }
        Commands::Ask {
            target,
            query,
            all_chunks,
            sources,
            top_k,
            threshold,
        } => {
            let owner = target
                .owner()
                .ok_or_else(|| anyhow!("Either --course or --file is required"))?;
            let overrides = AskOverrides {
                all_chunks,
                include_sources: sources,
                top_k,
                threshold,
            };
            ask(&config, owner, &query, &overrides).await?;
        }
        Commands::Citations { course, export } => {
            citations(&config, course, export.as_deref()).await?;
        }
        Commands::Tutor {
            course,
            chat,
            user,
            profile,
            message,
        } => {
            let target = TutorTarget {
                course_id: course,
                chat_id: chat,
                user_id: user,
            };
            tutor(&config, &target, profile.as_deref(), &message).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("coral-rag").chain(args.iter().copied()))
    }

    #[test]
    fn list_command() {
        let cli = parse(&["list"]).expect("list should parse");
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn ask_with_course() {
        let cli = parse(&["ask", "--course", "3", "What is a reef?", "--sources", "--top-k", "4"])
            .expect("ask should parse");

        let Commands::Ask {
            target,
            query,
            sources,
            top_k,
            threshold,
            all_chunks,
        } = cli.command
        else {
            panic!("expected ask");
        };
        assert_eq!(target.owner(), Some(IndexOwner::Course(3)));
        assert_eq!(query, "What is a reef?");
        assert!(sources);
        assert!(!all_chunks);
        assert_eq!(top_k, Some(4));
        assert_eq!(threshold, None);
    }

    #[test]
    fn ask_with_file() {
        let cli = parse(&["ask", "--file", "9", "--all-chunks", "Summarize"]).expect("should parse");
        let Commands::Ask { target, all_chunks, .. } = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(target.owner(), Some(IndexOwner::File(9)));
        assert!(all_chunks);
    }

    #[test]
    fn target_is_required_and_exclusive() {
        let missing = parse(&["rebuild"]);
        assert!(matches!(
            missing.map_err(|e| e.kind()),
            Err(ErrorKind::MissingRequiredArgument)
        ));

        let both = parse(&["rebuild", "--course", "1", "--file", "2"]);
        assert!(matches!(
            both.map_err(|e| e.kind()),
            Err(ErrorKind::ArgumentConflict)
        ));
    }

    #[test]
    fn add_file_command() {
        let cli = parse(&["add-file", "--module", "2", "notes/week1.pdf", "--no-index"])
            .expect("add-file should parse");
        let Commands::AddFile {
            module,
            path,
            title,
            no_index,
        } = cli.command
        else {
            panic!("expected add-file");
        };
        assert_eq!(module, 2);
        assert_eq!(path, PathBuf::from("notes/week1.pdf"));
        assert_eq!(title, None);
        assert!(no_index);
    }

    #[test]
    fn tutor_defaults() {
        let cli = parse(&["tutor", "--course", "1", "Explain bleaching"]).expect("should parse");
        let Commands::Tutor {
            course,
            chat,
            user,
            profile,
            message,
        } = cli.command
        else {
            panic!("expected tutor");
        };
        assert_eq!(course, 1);
        assert_eq!(chat, None);
        assert_eq!(user, "cli");
        assert_eq!(profile, None);
        assert_eq!(message, "Explain bleaching");
    }

    #[test]
    fn citations_export() {
        let cli = parse(&["citations", "--course", "5", "--export", "refs.csv"])
            .expect("should parse");
        let Commands::Citations { course, export } = cli.command else {
            panic!("expected citations");
        };
        assert_eq!(course, 5);
        assert_eq!(export, Some(PathBuf::from("refs.csv")));
    }

    #[test]
    fn config_show_flag() {
        let cli = parse(&["config", "--show"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Config { show: true, .. }));
    }

    #[test]
    fn invalid_command() {
        let cli = parse(&["serve"]);
        assert!(matches!(
            cli.map_err(|e| e.kind()),
            Err(ErrorKind::InvalidSubcommand)
        ));
    }

    #[test]
    fn help_message() {
        let cli = parse(&["--help"]);
        assert!(matches!(
            cli.map_err(|e| e.kind()),
            Err(ErrorKind::DisplayHelp)
        ));
    }
}
