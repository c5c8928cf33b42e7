use anyhow::Result;
use clap::{Parser, Subcommand};
use docanalyzer::analysis::{Analyzer, SamplingParams};
use docanalyzer::api::{ApiServer, AppState};
use docanalyzer::completion::OpenAiChatClient;
use docanalyzer::config::{Config, StorageBackend};
use docanalyzer::db::{migrate, Db};
use docanalyzer::error::DocAnalyzerError;
use docanalyzer::store::{DocumentStore, MemoryDocumentStore, SqliteDocumentStore};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "docanalyzer")]
#[command(version, about = "Document storage API with LLM topic and summary analysis")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Run migrations and verify the database schema
    Verify,
    /// Analyze one stored document and print the result as JSON
    Analyze {
        /// Document id
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger from environment variable or default to info level
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server().await?,
        Command::Verify => run_schema_verification().await?,
        Command::Analyze { id } => run_analyze(id).await?,
    }

    Ok(())
}

/// Open the configured document store, running migrations for SQLite
async fn build_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.storage.backend {
        StorageBackend::Sqlite => {
            let db = Db::new(config.db_path());
            log::info!("Database path: {}", db.path().display());
            Arc::new(SqliteDocumentStore::open(db, &config.storage.migrations_dir).await?)
        }
        StorageBackend::Memory => {
            log::warn!("Using in-memory document store; documents are lost on exit");
            Arc::new(MemoryDocumentStore::new())
        }
    };
    Ok(store)
}

/// Build the completion client and analyzer on top of `store`
fn build_analyzer(config: &Config, store: Arc<dyn DocumentStore>) -> Result<Analyzer> {
    let client = OpenAiChatClient::new(
        config.completion_api_key()?,
        config.completion.model.clone(),
        &config.completion.base_url,
        config.completion.timeout(),
    )?;
    log::info!("Completion model: {}", client.model());

    Ok(Analyzer::new(
        store,
        Arc::new(client),
        SamplingParams::from(&config.completion),
    ))
}

/// Run the HTTP API
async fn run_server() -> Result<()> {
    log::info!("Starting docanalyzer v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let store = build_store(&config).await?;
    let analyzer = build_analyzer(&config, Arc::clone(&store))?;

    let server = ApiServer::new(
        AppState::new(store, Arc::new(analyzer)),
        config.server.clone(),
    );
    server.run().await?;

    Ok(())
}

/// Run one analysis from the command line
async fn run_analyze(id: i64) -> Result<()> {
    let config = Config::load()?;
    config.require_persistent_storage("analyze")?;
    let store = build_store(&config).await?;
    let analyzer = build_analyzer(&config, store)?;

    let analysis = analyzer.analyze(id).await?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);

    Ok(())
}

/// Run database schema verification
async fn run_schema_verification() -> Result<()> {
    let config = Config::load_for_storage()?;
    if config.storage.backend == StorageBackend::Memory {
        log::info!("In-memory storage configured; nothing to verify");
        return Ok(());
    }

    let db = Db::new(config.db_path());
    log::info!("Verifying database at {}", db.path().display());
    SqliteDocumentStore::open(db.clone(), &config.storage.migrations_dir).await?;
    log::info!("Database initialized successfully");

    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for table in ["documents", "schema_migrations"] {
            if !tables.iter().any(|t| t == table) {
                return Err(DocAnalyzerError::Config(format!("Missing table: {}", table)));
            }
            log::debug!("✓ Table exists: {}", table);
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(DocAnalyzerError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }
        log::debug!("✓ Journal mode: WAL");

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(DocAnalyzerError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        log::info!("✓ {} documents stored", count);

        Ok(())
    }).await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
