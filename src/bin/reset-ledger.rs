use clap::Parser;
use energy_news_crawler::{
    config::DEFAULT_DUMP_DIR,
    persistent::{CollectionKey, ListingStore},
    Source,
};
use std::path::PathBuf;

/// Empties the faulty-id ledger of one collection so its articles are
/// attempted again.
#[derive(Debug, Parser)]
struct Args {
    source: String,
    topic: String,
    #[arg(long, env = "ENERGY_NEWS_DUMP_DIR", default_value = DEFAULT_DUMP_DIR)]
    dump_dir: PathBuf,
}

async fn reset_ledger(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let source =
        Source::parse(&args.source).ok_or_else(|| format!("unknown source {:?}", args.source))?;
    let key = CollectionKey::new(source, args.topic);
    let store = ListingStore::new(args.dump_dir);
    let dropped = store.reset_ledger(&key).await?;
    println!("[{}] Deleted {} faulty ids", key, dropped);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    reset_ledger(Args::parse()).await
}
