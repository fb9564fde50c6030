//! Source-specific extractors.
//!
//! Every site gets one type implementing [`Extractor`]; the crawl loop picks
//! it once through [`extractor_for`] and never looks at the source again.

pub mod ec;
pub mod eec;
pub mod mercom;
pub mod newsletter;
pub mod pvmag;
pub mod saur;

mod json_ld;

use crate::{article::Source, error::CrawlerError, utils::squash_whitespace, Extractor};
use scraper::ElementRef;

pub use json_ld::article_from_json_ld;

/// The extractor for a paginated source, `None` for the newsletter which is
/// driven by date instead.
pub fn extractor_for(source: Source) -> Option<Box<dyn Extractor>> {
    match source {
        Source::Ec => Some(Box::new(ec::EcExtractor::new())),
        Source::Eec => Some(Box::new(eec::EecExtractor::new())),
        Source::Mercom => Some(Box::new(mercom::MercomExtractor::new())),
        Source::Pvmag => Some(Box::new(pvmag::PvMagExtractor::new(pvmag::Edition::India))),
        Source::PvmagUsa => Some(Box::new(pvmag::PvMagExtractor::new(pvmag::Edition::Usa))),
        Source::PvmagGlobal => Some(Box::new(pvmag::PvMagExtractor::new(pvmag::Edition::Global))),
        Source::Saur => Some(Box::new(saur::SaurExtractor::new())),
        Source::Nleec => None,
    }
}

pub(crate) fn text_of(el: ElementRef) -> String {
    squash_whitespace(&el.text().collect::<String>())
}

pub(crate) fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub(crate) fn check_topic(
    source: Source,
    topics: &[&'static str],
    topic: &str,
) -> Result<(), CrawlerError> {
    if topics.contains(&topic) {
        Ok(())
    } else {
        Err(CrawlerError::UnknownTopic {
            site: source.to_string(),
            topic: topic.to_string(),
        })
    }
}
