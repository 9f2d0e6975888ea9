// src/cli/mod.rs
// Command-line surface over the Memory Engine and Runtime Dispatcher.
// Shaped after the teacher's `clap::Parser` + `Subcommand` derive, trimmed
// to the six canonical commands this crate exposes.

use crate::config::ResolvedConfig;
use crate::conversation_log::ConversationLog;
use crate::embeddings::{EmbeddingProvider, MockEmbeddingProvider};
use crate::error::Result;
use crate::memory::{MemoryEngine, SearchOptions};
use crate::store::{Store, StoreOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "prometheus")]
#[command(about = "Memory and runtime substrate for the Prometheus meta-agent")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database file path (overrides config/env).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and apply all pending migrations.
    InitDb,

    /// Apply any pending migrations to an existing database.
    Migrate,

    /// Walk a directory, chunk source files, and index them for search.
    Index {
        path: PathBuf,
    },

    /// Hybrid keyword + vector search over indexed code chunks.
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0.3)]
        keyword_weight: f64,
        #[arg(long, default_value_t = 0.7)]
        vector_weight: f64,
    },

    /// Ask the runtime dispatcher to answer a prompt via the fallback chain.
    Ask {
        prompt: String,
        #[arg(long, default_value = "chat")]
        task_type: String,
    },

    /// Print row counts for every table the Memory Engine manages.
    Stats,
}

async fn open_engine(db_path: &PathBuf, config: &ResolvedConfig) -> Result<MemoryEngine> {
    let store = Store::open(db_path, StoreOptions { embedding_dim: config.embedding_dim }).await?;
    let conversations_dir = crate::store::conversations_dir(db_path);
    let log = ConversationLog::open(&conversations_dir).await?;
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new(config.embedding_dim));
    Ok(MemoryEngine::new(store, log, embeddings))
}

/// Runs the parsed command, returning the process's exit code. Errors are
/// rendered via `Display` only, never `Debug`, so credential material never
/// reaches stderr.
pub async fn run(cli: Cli, config: ResolvedConfig) -> i32 {
    match dispatch(cli, config).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

async fn dispatch(cli: Cli, config: ResolvedConfig) -> Result<()> {
    let db_path = cli.db.unwrap_or(config.database_path.clone());

    match cli.command {
        Commands::InitDb => {
            let engine = open_engine(&db_path, &config).await?;
            println!("database ready at {}", db_path.display());
            engine.close().await?;
        }
        Commands::Migrate => {
            let store = Store::open(&db_path, StoreOptions { embedding_dim: config.embedding_dim }).await?;
            let applied = store.apply_pending().await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Index { path } => {
            let engine = open_engine(&db_path, &config).await?;
            let counters = engine.index_codebase(&path).await?;
            println!(
                "scanned {} file(s), wrote {} chunk(s)",
                counters.files_scanned, counters.chunks_written
            );
            engine.close().await?;
        }
        Commands::Search { query, limit, keyword_weight, vector_weight } => {
            let engine = open_engine(&db_path, &config).await?;
            let opts = SearchOptions { limit, keyword_weight, vector_weight, ..Default::default() };
            let results = engine.search_code(&query, opts).await?;
            for r in &results {
                println!("{:.3}  {}:{}-{}", r.score, r.file_path, r.start_line, r.end_line);
            }
            engine.close().await?;
        }
        Commands::Ask { prompt, task_type } => {
            use crate::runtime::catalog::ModelCatalog;
            use crate::runtime::provider::{ChatRequest, ChatMessage, EchoProvider};
            use crate::runtime::selector::{Preferences, SelectOptions};
            use crate::runtime::RuntimeDispatcher;
            use tokio_util::sync::CancellationToken;

            let dispatcher = RuntimeDispatcher::new(
                ModelCatalog::builtin(),
                Preferences::default(),
                Arc::new(EchoProvider),
            )
            .with_credential_cooldown_bounds(
                config.credential_cooldown_base_ms,
                config.credential_cooldown_max_ms,
            );
            for provider in ["openai", "deepseek"] {
                dispatcher.credentials().register(provider, format!("{provider}-default"));
            }

            let request = ChatRequest {
                messages: vec![ChatMessage::user(prompt)],
                max_tokens: None,
                temperature: None,
                deadline: None,
            };
            let outcome = dispatcher
                .execute(&task_type, &SelectOptions::default(), request, CancellationToken::new())
                .await?;
            if let Some(content) = outcome.response.content {
                println!("{content}");
            }
        }
        Commands::Stats => {
            let engine = open_engine(&db_path, &config).await?;
            let stats = engine.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            engine.close().await?;
        }
    }
    Ok(())
}
