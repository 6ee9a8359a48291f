use anyhow::Context;
use article_ingest::{
    AiCapability, AutoFetchScheduler, ChatAdapter, CrawlOrchestrator, Fetcher, MockLlmAdapter, PgStore,
    PipelineConfig, PipelineStores, Source, SourceKind,
};
use clap::{Parser, Subcommand};
use interfaces::memory::InMemoryStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bilingual article ingestion pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the auto-fetch scheduler until Ctrl-C
    Run,
    /// Fetch once from every active source, a single stored source, or an ad-hoc URL
    Fetch {
        #[arg(long)]
        source: Option<Uuid>,
        /// Crawl this URL without a stored source
        #[arg(long, conflicts_with = "source")]
        url: Option<String>,
        #[arg(long, default_value = "feed")]
        kind: SourceKind,
        /// Ignore stored articles and fetch history
        #[arg(long)]
        force: bool,
        #[arg(long, env = "FETCH_USER_ID", default_value = "cli")]
        user: String,
        /// Cap on accepted articles per source
        #[arg(long)]
        max: Option<usize>,
    },
    /// Create database tables
    InitDb,
}

enum Backend {
    Postgres(Arc<PgStore>),
    Memory(Arc<InMemoryStore>),
}

impl Backend {
    async fn open(config: &PipelineConfig) -> anyhow::Result<Self> {
        match &config.database_url {
            Some(url) => {
                let store = PgStore::connect(url).await.context("failed to connect to database")?;
                info!("Using PostgreSQL store");
                Ok(Backend::Postgres(Arc::new(store)))
            }
            None => {
                warn!("DATABASE_URL not set, using an in-memory store");
                Ok(Backend::Memory(Arc::new(InMemoryStore::new())))
            }
        }
    }

    fn stores(&self) -> PipelineStores {
        match self {
            Backend::Postgres(store) => PipelineStores::shared(store.clone()),
            Backend::Memory(store) => PipelineStores::shared(store.clone()),
        }
    }

    async fn register_source(&self, source: &Source) -> anyhow::Result<()> {
        match self {
            Backend::Postgres(store) => store.upsert_source(source).await?,
            Backend::Memory(store) => store.add_source(source.clone()).await,
        }
        Ok(())
    }
}

fn ai_capability(config: &PipelineConfig) -> anyhow::Result<Arc<dyn AiCapability>> {
    if config.ai.api_key.is_some() {
        let adapter = ChatAdapter::new(config.ai.clone())?;
        info!("Using AI model {} at {}", config.ai.model, config.ai.base_url);
        Ok(Arc::new(adapter))
    } else {
        warn!("AI_API_KEY not set, translations and summaries are simulated");
        Ok(Arc::new(MockLlmAdapter::new("offline")))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env()?;
    let backend = Backend::open(&config).await?;

    if let Backend::Postgres(store) = &backend {
        store.ensure_schema().await?;
    }

    match cli.command {
        Command::InitDb => {
            if matches!(backend, Backend::Memory(_)) {
                anyhow::bail!("init-db needs DATABASE_URL");
            }
            info!("Database initialised");
        }
        Command::Fetch {
            source,
            url,
            kind,
            force,
            user,
            max,
        } => {
            let pages = Arc::new(Fetcher::new(config.fetch.clone())?);
            let orchestrator = CrawlOrchestrator::new(pages, ai_capability(&config)?, backend.stores(), &config);

            let sources = match url {
                Some(url) => {
                    let adhoc = Source::new(url.clone(), url, kind);
                    backend.register_source(&adhoc).await?;
                    vec![adhoc]
                }
                None => orchestrator.load_sources(source).await?,
            };
            if sources.is_empty() {
                warn!("No active sources to fetch");
                return Ok(());
            }

            let report = orchestrator.fetch_now(&sources, max, force, &user).await;
            for run in &report.sources {
                match &run.error {
                    Some(e) => error!("{}: failed after {}ms: {}", run.source_name, run.duration_ms, e),
                    None => info!(
                        "{}: {} fetched, {} stored, {} duplicates, {} too short, {} failed",
                        run.source_name,
                        run.raw_count,
                        run.inserted,
                        run.duplicate_skipped,
                        run.too_short_skipped,
                        run.failed
                    ),
                }
            }
        }
        Command::Run => {
            let pages = Arc::new(Fetcher::new(config.fetch.clone())?);
            let orchestrator = Arc::new(CrawlOrchestrator::new(
                pages,
                ai_capability(&config)?,
                backend.stores(),
                &config,
            ));
            let scheduler = AutoFetchScheduler::new(orchestrator, config.scheduler.clone());

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Shutting down");
                        signal.cancel();
                    }
                    Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
                }
            });

            scheduler.run(shutdown).await;
        }
    }

    Ok(())
}
