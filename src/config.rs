use crate::{
    crawler::CrawlOptions,
    error::CrawlerError,
    fetcher::{HttpFetcher, Identity, PageFetcher},
    persistent::ListingStore,
    retry::RetryPolicy,
    ListingOrder,
};
use std::{path::PathBuf, sync::Arc};

pub const DEFAULT_DUMP_DIR: &str = "./dss-selc-dump/scraper";
pub const DEFAULT_PROXY: &str = "socks5h://127.0.0.1:1080";

/// Command line (and environment) settings shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Root directory of the per-source JSON dumps
    #[arg(long, env = "ENERGY_NEWS_DUMP_DIR", default_value = DEFAULT_DUMP_DIR, global = true)]
    pub dump_dir: PathBuf,

    /// Route every request through the SOCKS proxy
    #[arg(long, global = true)]
    pub use_proxy: bool,

    #[arg(long, env = "ENERGY_NEWS_PROXY", default_value = DEFAULT_PROXY, global = true)]
    pub proxy: String,

    /// Processed articles between two checkpoints
    #[arg(long, default_value_t = 10, global = true)]
    pub checkpoint_every: usize,

    /// Attempts per listing page before the topic is abandoned
    #[arg(long, default_value_t = 5, global = true)]
    pub page_retries: u32,

    /// Article pages fetched at once
    #[arg(long, default_value_t = 1, global = true)]
    pub detail_concurrency: usize,

    /// Do not stop at the first known article; check every listed item
    #[arg(long, global = true)]
    pub full_scan: bool,

    #[arg(long, global = true)]
    pub max_pages: Option<u32>,
}

/// Immutable run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub dump_dir: PathBuf,
    pub proxy: Option<String>,
    pub crawl: CrawlOptions,
}

impl From<ConfigArgs> for Config {
    fn from(args: ConfigArgs) -> Self {
        Config {
            dump_dir: args.dump_dir,
            proxy: args.use_proxy.then_some(args.proxy),
            crawl: CrawlOptions {
                checkpoint_every: args.checkpoint_every.max(1),
                page_retry: RetryPolicy::bounded(args.page_retries.max(1)),
                detail_retry: RetryPolicy::unbounded(),
                detail_concurrency: args.detail_concurrency.max(1),
                ordering: args.full_scan.then_some(ListingOrder::Unordered),
                max_pages: args.max_pages,
            },
        }
    }
}

impl Config {
    pub fn store(&self) -> ListingStore {
        ListingStore::new(&self.dump_dir)
    }

    /// HTTP client sending `identity`'s headers, through the proxy if one
    /// is configured.
    pub fn fetcher(&self, identity: &Identity) -> Result<Arc<dyn PageFetcher>, CrawlerError> {
        Ok(Arc::new(HttpFetcher::new(identity, self.proxy.as_deref())?))
    }

    pub fn default_output(&self) -> PathBuf {
        self.dump_dir.join("articles.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: ConfigArgs,
    }

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["energy-news-crawler"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().config.into()
    }

    #[test]
    fn defaults() {
        let config = parse(&["--dump-dir", "/tmp/dump"]);
        assert_eq!(config.dump_dir, PathBuf::from("/tmp/dump"));
        assert_eq!(config.proxy, None);
        assert_eq!(config.crawl, CrawlOptions::default());
        assert_eq!(config.default_output(), PathBuf::from("/tmp/dump/articles.db"));
    }

    #[test]
    fn proxy_only_when_enabled() {
        let config = parse(&["--use-proxy", "--proxy", "socks5h://10.0.0.1:9050"]);
        assert_eq!(config.proxy.as_deref(), Some("socks5h://10.0.0.1:9050"));
    }

    #[test]
    fn crawl_overrides() {
        let config = parse(&[
            "--full-scan",
            "--checkpoint-every",
            "25",
            "--page-retries",
            "2",
            "--max-pages",
            "3",
        ]);
        assert_eq!(config.crawl.ordering, Some(ListingOrder::Unordered));
        assert_eq!(config.crawl.checkpoint_every, 25);
        assert_eq!(config.crawl.page_retry.max_attempts, Some(2));
        assert_eq!(config.crawl.max_pages, Some(3));
    }
}
