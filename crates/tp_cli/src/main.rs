use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tp_core::config::{load_config_or_default, Config, StorageConfig};
use tp_core::models::CrawlRequest;
use tp_core::query::RawArticleQuery;
use tp_core::{ArticleId, ArticleStorage, Storage, TopicCollection, TopicId, TopicStorage};
use tracing::info;

mod commands;
mod logging;

use commands::{parse_category, parse_move, CategoryArg, TopicEdits};

const STORAGE_OPEN_RETRIES: u32 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about = "TOPICS digest curation backend", long_about = None)]
struct Cli {
    /// TOML config file. Defaults apply when it does not exist.
    #[arg(long, default_value = "topics.toml")]
    config: PathBuf,
    /// Overrides storage.backend (sqlite or memory).
    #[arg(long)]
    storage: Option<String>,
    /// Overrides storage.path.
    #[arg(long)]
    db: Option<PathBuf>,
    /// Overrides pipeline.url.
    #[arg(long)]
    pipeline_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        /// Overrides server.bind.
        #[arg(long)]
        bind: Option<String>,
    },
    Articles {
        #[command(subcommand)]
        command: ArticleCommands,
    },
    Topics {
        #[command(subcommand)]
        command: TopicCommands,
    },
    /// Ask the pipeline to crawl a date range.
    Crawl {
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Ask the pipeline to summarize unsummarized articles.
    Summarize {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand, Debug)]
enum ArticleCommands {
    List(ListArgs),
    Labels,
    /// Insert a JSON array of articles, skipping known urls.
    Import { file: PathBuf },
    Delete {
        #[arg(required = true)]
        ids: Vec<ArticleId>,
    },
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    keyword: Option<String>,
    #[arg(long)]
    source: Option<String>,
    /// Comma-separated; matches articles carrying any of them.
    #[arg(long)]
    labels: Option<String>,
    #[arg(long)]
    date_from: Option<String>,
    #[arg(long)]
    date_to: Option<String>,
    #[arg(long)]
    page: Option<String>,
    #[arg(long)]
    limit: Option<String>,
}

impl From<ListArgs> for RawArticleQuery {
    fn from(args: ListArgs) -> Self {
        Self {
            keyword: args.keyword,
            source: args.source,
            labels: args.labels,
            date_from: args.date_from,
            date_to: args.date_to,
            page: args.page,
            limit: args.limit,
            ..Self::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum TopicCommands {
    List {
        #[arg(long)]
        q: Option<String>,
    },
    Show { id: TopicId },
    /// Create (without --id) or edit a topic, then save it.
    Edit(EditArgs),
    /// Auto-categorize one member through the pipeline.
    Categorize { id: TopicId, article_id: ArticleId },
    /// Generate the monthly summary through the pipeline.
    Summary { id: TopicId },
    Export {
        id: TopicId,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    Delete { id: TopicId },
}

#[derive(Args, Debug)]
struct EditArgs {
    #[arg(long)]
    id: Option<TopicId>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    summary: Option<String>,
    #[arg(long, value_delimiter = ',')]
    add: Vec<ArticleId>,
    #[arg(long, value_delimiter = ',')]
    remove: Vec<ArticleId>,
    #[arg(long)]
    up: Vec<ArticleId>,
    #[arg(long)]
    down: Vec<ArticleId>,
    /// ID:POSITION
    #[arg(long = "move", value_parser = parse_move)]
    moves: Vec<(ArticleId, usize)>,
    /// ID=MAJOR[:MINOR,..]
    #[arg(long = "category", value_parser = parse_category)]
    categories: Vec<CategoryArg>,
}

impl From<EditArgs> for TopicEdits {
    fn from(args: EditArgs) -> Self {
        Self {
            title: args.title,
            summary: args.summary,
            add: args.add,
            remove: args.remove,
            up: args.up,
            down: args.down,
            moves: args.moves,
            categories: args.categories,
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = load_config_or_default(&cli.config)?;
    if let Some(backend) = &cli.storage {
        config.storage.backend = backend.clone();
    }
    if let Some(db) = &cli.db {
        config.storage.path = db.clone();
    }
    if let Some(url) = &cli.pipeline_url {
        config.pipeline.url = Some(url.clone());
    }
    if let Commands::Serve { bind: Some(bind) } = &cli.command {
        config.server.bind = bind.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn open_storage_with_retry(
    config: &StorageConfig,
    max_retries: u32,
) -> Result<Arc<dyn Storage>> {
    let mut attempt = 1;
    loop {
        match tp_storage::create_storage(config).await {
            Ok(storage) => return Ok(storage),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                info!("Storage initialization failed, retrying {}/{}...", attempt, max_retries);
                attempt += 1;
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(e) => return Err(e).context("Failed to open storage"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    logging::init_logging(&config.logging.level);

    let storage = open_storage_with_retry(&config.storage, STORAGE_OPEN_RETRIES).await?;
    info!("💾 Storage initialized successfully (using {})", config.storage.backend);
    let pipeline = tp_pipeline::create_pipeline(&config.pipeline)?;
    info!("🧠 Pipeline initialized successfully (using {})", pipeline.name());
    let vocabulary = Arc::new(config.categories.clone());
    let collection = || TopicCollection::new(vocabulary.clone());

    match cli.command {
        Commands::Serve { .. } => {
            let app = tp_web::create_app(tp_web::AppState::new(
                storage.clone(),
                pipeline.clone(),
                vocabulary.clone(),
            ));
            info!("✨ Serving on {}", config.server.bind);
            tp_web::serve(app, &config.server.bind).await?;
        }
        Commands::Articles { command } => match command {
            ArticleCommands::List(args) => {
                commands::list_articles(storage.as_ref(), args.into()).await?
            }
            ArticleCommands::Labels => {
                for label in storage.labels().await? {
                    println!("{}", label);
                }
            }
            ArticleCommands::Import { file } => {
                commands::import_articles(storage.as_ref(), &file).await?
            }
            ArticleCommands::Delete { ids } => {
                let removed = storage.delete_articles(&ids).await?;
                println!("Deleted {} articles", removed);
            }
        },
        Commands::Topics { command } => match command {
            TopicCommands::List { q } => {
                for topic in storage.list_topics(q.as_deref()).await? {
                    println!(
                        "{:>4}  {}  {}",
                        topic.id,
                        topic.updated_at.format("%Y-%m-%d %H:%M"),
                        topic.title
                    );
                }
            }
            TopicCommands::Show { id } => {
                commands::show_topic(storage.as_ref(), collection(), id).await?
            }
            TopicCommands::Edit(args) => {
                let id = args.id;
                let saved =
                    commands::edit_topic(storage.as_ref(), collection(), id, &args.into()).await?;
                println!("{}", saved);
            }
            TopicCommands::Categorize { id, article_id } => {
                commands::categorize_member(
                    storage.as_ref(),
                    pipeline.as_ref(),
                    collection(),
                    id,
                    article_id,
                )
                .await?
            }
            TopicCommands::Summary { id } => {
                commands::summarize_topic(storage.as_ref(), pipeline.as_ref(), collection(), id)
                    .await?
            }
            TopicCommands::Export { id, output } => {
                commands::export_topic(storage.as_ref(), id, output.as_deref()).await?
            }
            TopicCommands::Delete { id } => {
                if !storage.delete_topic(id).await? {
                    anyhow::bail!("topic {} does not exist", id);
                }
                println!("Deleted topic {}", id);
            }
        },
        Commands::Crawl {
            start_date,
            end_date,
            sources,
        } => {
            commands::crawl(
                pipeline.as_ref(),
                CrawlRequest {
                    start_date,
                    end_date,
                    sources,
                },
            )
            .await?
        }
        Commands::Summarize { limit } => commands::summarize_batch(pipeline.as_ref(), limit).await?,
    }

    Ok(())
}
