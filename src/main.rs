use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use energy_news_crawler::{
    config::{Config, ConfigArgs},
    crawler::{
        newsletter::{default_range, NewsletterIndexer},
        CrawlController,
    },
    error::CrawlerError,
    etl,
    persistent::CollectionKey,
    sources::{extractor_for, newsletter::NewsletterExtractor},
    Extractor, Source,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "energy-news-crawler", about = "Incremental energy news crawler")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Crawl new articles of a source (every topic unless some are given)
    Crawl {
        #[arg(value_parser = parse_source)]
        source: Source,
        #[arg(long)]
        topic: Vec<String>,
    },
    /// Fetch article pages for stored records that still have no body
    Backfill {
        #[arg(value_parser = parse_source)]
        source: Source,
        #[arg(long)]
        topic: Vec<String>,
    },
    /// Index newsletter issues by date
    Newsletters {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Fetch the articles linked from indexed newsletters
    NewsletterArticles,
    /// Export collections to a SQLite file
    Transform {
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// `source/topic`; the default set when omitted
        #[arg(long = "collection", value_parser = parse_collection)]
        collections: Vec<CollectionKey>,
    },
    /// Every source and topic, then the newsletter
    All,
}

fn parse_source(s: &str) -> Result<Source, String> {
    Source::parse(s).ok_or_else(|| {
        let known: Vec<_> = Source::ALL.iter().map(Source::as_str).collect();
        format!("unknown source {:?}, expected one of {}", s, known.join(", "))
    })
}

fn parse_collection(s: &str) -> Result<CollectionKey, String> {
    let (source, topic) = s
        .split_once('/')
        .ok_or_else(|| format!("expected source/topic, got {:?}", s))?;
    Ok(CollectionKey::new(parse_source(source)?, topic))
}

fn topics_of(extractor: &dyn Extractor, requested: Vec<String>) -> Vec<String> {
    if requested.is_empty() {
        extractor.topics().iter().map(ToString::to_string).collect()
    } else {
        requested
    }
}

/// Crawls (or backfills) each topic in turn. A failing topic is logged and
/// the next one still runs.
async fn run_source(
    config: &Config,
    source: Source,
    topics: Vec<String>,
    backfill: bool,
) -> Result<(), CrawlerError> {
    let Some(extractor) = extractor_for(source) else {
        return run_newsletter(config, None, None, true).await;
    };
    let controller = CrawlController::new(
        config.store(),
        config.fetcher(extractor.identity())?,
        config.crawl.clone(),
    );

    info!("{:=^50}", format!(" {} ", source));
    for topic in topics_of(extractor.as_ref(), topics) {
        let result = if backfill {
            controller.backfill(extractor.as_ref(), &topic).await
        } else {
            controller.crawl_topic(extractor.as_ref(), &topic).await
        };
        if let Err(e) = result {
            error!("[{}/{}] {}", source, topic, e);
        }
    }
    Ok(())
}

async fn run_newsletter(
    config: &Config,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    drain: bool,
) -> Result<(), CrawlerError> {
    let extractor = NewsletterExtractor::new();
    let indexer = NewsletterIndexer::new(
        config.store(),
        config.fetcher(extractor.identity())?,
        config.crawl.clone(),
    );
    let (start, end) = default_range(chrono::Local::now().naive_local().date());
    indexer
        .index_dates(from.unwrap_or(start), to.unwrap_or(end))
        .await?;
    if drain {
        indexer.drain().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "debug,html5ever=error,selectors=error,hyper=warn,reqwest=info,sqlx=warn".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let cli = Cli::parse();
    let config = Config::from(cli.config);

    match cli.command {
        Command::Crawl { source, topic } => run_source(&config, source, topic, false).await?,
        Command::Backfill { source, topic } => run_source(&config, source, topic, true).await?,
        Command::Newsletters { from, to } => run_newsletter(&config, from, to, false).await?,
        Command::NewsletterArticles => {
            let extractor = NewsletterExtractor::new();
            let indexer = NewsletterIndexer::new(
                config.store(),
                config.fetcher(extractor.identity())?,
                config.crawl.clone(),
            );
            indexer.drain().await?;
        }
        Command::Transform {
            output,
            collections,
        } => {
            let keys = if collections.is_empty() {
                etl::default_collections()
            } else {
                collections
            };
            let output = output.unwrap_or_else(|| config.default_output());
            let report = etl::export(&config.store(), keys, &output).await?;
            info!(
                "{} loaded, {} exported, {} skipped into {}",
                report.loaded,
                report.exported,
                report.skipped,
                output.display()
            );
        }
        Command::All => {
            for source in Source::ALL {
                if source != Source::Nleec {
                    run_source(&config, source, vec![], false).await?;
                }
            }
            info!("{:=^50}", " nleec ");
            run_newsletter(&config, None, None, true).await?;
        }
    }

    Ok(())
}
