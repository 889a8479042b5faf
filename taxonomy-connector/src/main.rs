//! taxonomy-connector - skills taxonomy service
//!
//! Runs the REST API and event listener (`serve`) or one of the batch
//! commands that refresh vendor data, finalize votes or reindex search.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use taxonomy_common::config::{ConfigResolver, TomlConfig};
use taxonomy_common::db::ProductType;
use taxonomy_common::events::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taxonomy_connector::api::ApiThrottle;
use taxonomy_connector::config::{
    build_vendor_client, resolve_throttle_per_minute, resolve_verification_thresholds,
};
use taxonomy_connector::providers::{ContentProvider, JsonCatalogProvider};
use taxonomy_connector::search::{index_jobs_data, AlgoliaClient};
use taxonomy_connector::services::skill_refresh::DEFAULT_CHUNK_SIZE;
use taxonomy_connector::services::task_queue::DEFAULT_QUEUE_CAPACITY;
use taxonomy_connector::services::xblock_refresh::DEFAULT_SUCCESS_THRESHOLD;
use taxonomy_connector::services::{
    fetch_skill_details, run_event_listener, sync_industries, DisabledTaskRunner, EventDispatcher,
    HandlerContext, JobRefresher, RefreshTaskRunner, SkillRefresher, TaskQueue, TaskRunner,
    XBlockRefresher, XBlockSkillFinalizer, XBlockTarget,
};
use taxonomy_connector::AppState;

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "taxonomy-connector")]
#[command(about = "Skills taxonomy connector")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the REST API and event listener
    Serve {
        /// Override the configured bind address
        #[arg(long, env = "TAXONOMY_BIND_ADDRESS")]
        bind: Option<String>,
    },
    /// Refresh course skills from the vendor
    RefreshCourseSkills {
        /// Refresh every course in the catalog
        #[arg(long, conflicts_with = "course")]
        all: bool,
        #[arg(long = "course", value_name = "COURSE_KEY")]
        course: Vec<String>,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Refresh program skills from the vendor
    RefreshProgramSkills {
        #[arg(long, conflicts_with = "program")]
        all: bool,
        #[arg(long = "program", value_name = "PROGRAM_UUID")]
        program: Vec<String>,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Tag xblocks with skills
    RefreshXblockSkills {
        /// Every xblock under these course runs
        #[arg(long = "course", value_name = "COURSE_RUN_KEY", conflicts_with = "xblock")]
        course: Vec<String>,
        #[arg(long = "xblock", value_name = "USAGE_KEY")]
        xblock: Vec<String>,
        /// Every published course run
        #[arg(long, conflicts_with_all = ["course", "xblock"])]
        all: bool,
        /// Maximum course runs processed with --all (0 means no limit)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        /// Share of tagged xblocks needed to mark a course run complete
        #[arg(long, default_value_t = DEFAULT_SUCCESS_THRESHOLD)]
        success_threshold: f64,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Refresh job-skill statistics and job names
    RefreshJobSkills,
    /// Refresh job posting statistics
    RefreshJobPostings,
    /// Fill skill categories and subcategories
    FetchSkillDetails,
    /// Turn xblock skill votes into verified or blacklisted tags
    FinalizeXblockskillTags {
        #[arg(long)]
        min_votes: Option<i64>,
        #[arg(long)]
        ratio_threshold: Option<f64>,
    },
    /// Rebuild the Algolia jobs index
    IndexJobsDataToAlgolia,
    /// Load industries and their jobs from the catalog
    SyncIndustries,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Items per provider call and transaction
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Write results; without it the run only reports counts
    #[arg(long)]
    commit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml_config = ConfigResolver::new(cli.config.clone())
        .load()
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("taxonomy-connector {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", toml_config.database_path.display());

    let db = taxonomy_common::db::init_database(&toml_config.database_path)
        .await
        .context("Failed to open database")?;

    match cli.command {
        Command::Serve { bind } => serve(db, toml_config, bind).await,
        Command::RefreshCourseSkills { all, course, batch } => {
            refresh_products(db, &toml_config, ProductType::Course, all, course, batch).await
        }
        Command::RefreshProgramSkills { all, program, batch } => {
            refresh_products(db, &toml_config, ProductType::Program, all, program, batch).await
        }
        Command::RefreshXblockSkills {
            course,
            xblock,
            all,
            limit,
            success_threshold,
            batch,
        } => {
            let target = if all {
                XBlockTarget::All {
                    limit: (limit > 0).then_some(limit),
                }
            } else if !xblock.is_empty() {
                XBlockTarget::XBlocks(xblock)
            } else if !course.is_empty() {
                XBlockTarget::CourseRuns(course)
            } else {
                bail!("Pass --all, --course or --xblock");
            };

            let vendor = Arc::new(build_vendor_client(&db, &toml_config).await?);
            let provider = load_provider(&toml_config)?;
            let refresher = XBlockRefresher::new(db, vendor, provider)
                .with_chunk_size(batch.chunk_size)
                .with_commit(batch.commit)
                .with_success_threshold(success_threshold);
            let report = refresher.refresh(target).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::RefreshJobSkills => {
            let vendor = Arc::new(build_vendor_client(&db, &toml_config).await?);
            let report = JobRefresher::new(db, vendor).refresh_job_skills().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::RefreshJobPostings => {
            let vendor = Arc::new(build_vendor_client(&db, &toml_config).await?);
            let report = JobRefresher::new(db, vendor).refresh_job_postings().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::FetchSkillDetails => {
            let vendor = build_vendor_client(&db, &toml_config).await?;
            let updated = fetch_skill_details(&db, &vendor).await?;
            info!(updated, "Skill details fetched");
            Ok(())
        }
        Command::FinalizeXblockskillTags {
            min_votes,
            ratio_threshold,
        } => {
            let thresholds =
                resolve_verification_thresholds(&db, &toml_config, min_votes, ratio_threshold).await?;
            let report = XBlockSkillFinalizer::new(db, thresholds).finalize().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::IndexJobsDataToAlgolia => {
            let Some(algolia) = toml_config.algolia.as_ref() else {
                bail!("Algolia is not configured; add an [algolia] section to the config file");
            };
            let client = AlgoliaClient::new(algolia)?;
            let indexed = index_jobs_data(&db, &client).await?;
            info!(indexed, "Algolia reindex complete");
            Ok(())
        }
        Command::SyncIndustries => {
            let provider = load_provider(&toml_config)?;
            let report = sync_industries(&db, provider.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn load_provider(toml_config: &TomlConfig) -> Result<Arc<dyn ContentProvider>> {
    let Some(path) = toml_config.catalog_path.as_ref() else {
        bail!("catalog_path is not configured");
    };
    Ok(Arc::new(JsonCatalogProvider::from_file(path)?))
}

async fn refresh_products(
    db: sqlx::SqlitePool,
    toml_config: &TomlConfig,
    product_type: ProductType,
    all: bool,
    keys: Vec<String>,
    batch: BatchArgs,
) -> Result<()> {
    if !all && keys.is_empty() {
        bail!("Pass --all or at least one {} key", product_type);
    }

    let vendor = Arc::new(build_vendor_client(&db, toml_config).await?);
    let provider = load_provider(toml_config)?;
    let refresher = SkillRefresher::new(db, vendor, provider)
        .with_chunk_size(batch.chunk_size)
        .with_commit(batch.commit);

    let summary = refresher
        .refresh(product_type, (!all).then_some(keys))
        .await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn serve(db: sqlx::SqlitePool, toml_config: TomlConfig, bind: Option<String>) -> Result<()> {
    let provider: Arc<dyn ContentProvider> = match toml_config.catalog_path.as_ref() {
        Some(path) => Arc::new(JsonCatalogProvider::from_file(path)?),
        None => {
            warn!("catalog_path not configured, tagging tasks will find no content");
            Arc::new(JsonCatalogProvider::default())
        }
    };

    let runner: Arc<dyn TaskRunner> = match build_vendor_client(&db, &toml_config).await {
        Ok(vendor) => {
            let vendor = Arc::new(vendor);
            Arc::new(RefreshTaskRunner::new(
                SkillRefresher::new(db.clone(), vendor.clone(), provider.clone()),
                XBlockRefresher::new(db.clone(), vendor, provider),
            ))
        }
        Err(e) => {
            warn!("Tagging disabled: {}", e);
            Arc::new(DisabledTaskRunner)
        }
    };
    let (queue, _worker) = TaskQueue::start(runner, DEFAULT_QUEUE_CAPACITY);

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let dispatcher = Arc::new(EventDispatcher::new(HandlerContext {
        db: db.clone(),
        queue,
    }));
    tokio::spawn(run_event_listener(dispatcher.clone(), event_bus.clone()));

    let throttle = ApiThrottle::per_minute(resolve_throttle_per_minute(&db, &toml_config).await?);
    info!(per_minute = throttle.rate(), "API throttle configured");

    let state = AppState::new(db, event_bus, dispatcher, throttle);
    let app = taxonomy_connector::build_router(state);

    let addr = bind.unwrap_or_else(|| toml_config.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
