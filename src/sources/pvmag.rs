//! pv magazine news listings (India, USA and global editions share one
//! WordPress theme).

use super::{check_topic, non_empty, text_of};
use crate::{
    article::{ArticleRecord, DetailFields, Source},
    error::{CrawlerError, ExtractError},
    fetcher::{Identity, Page, PageRequest},
    utils::squash_whitespace,
    Extractor, ListingPage,
};
use lazy_static::lazy_static;
use scraper::Selector;
use tracing::warn;
use uuid::Uuid;

const HEADERS: [(&str, &str); 11] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0)",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Connection", "keep-alive"),
    ("Cookie", "c4YGUxxz5aNu6NODlhMDg=hello"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("Priority", "u=0, i"),
    ("TE", "trailers"),
];

const E: &str = "Invalid selector";
lazy_static! {
    static ref PREVIEW: Selector = Selector::parse("div.article-preview").expect(E);
    static ref H2: Selector = Selector::parse("h2.entry-title").expect(E);
    static ref A: Selector = Selector::parse("a[href]").expect(E);
    static ref PUBLISHED: Selector = Selector::parse("time.entry-published").expect(E);
    static ref AUTHOR: Selector = Selector::parse("span.entry-author").expect(E);
    static ref LEAD: Selector = Selector::parse("div.article-lead-text p").expect(E);
    static ref ENTRY_CONTENT: Selector = Selector::parse("div.entry-content").expect(E);
    static ref P: Selector = Selector::parse("p").expect(E);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edition {
    India,
    Usa,
    Global,
}

impl Edition {
    fn base(&self) -> &'static str {
        match self {
            Edition::India => "https://www.pv-magazine-india.com",
            Edition::Usa => "https://www.pv-magazine-usa.com",
            Edition::Global => "https://www.pv-magazine.com",
        }
    }

    fn source(&self) -> Source {
        match self {
            Edition::India => Source::Pvmag,
            Edition::Usa => Source::PvmagUsa,
            Edition::Global => Source::PvmagGlobal,
        }
    }
}

#[derive(Debug)]
pub struct PvMagExtractor {
    edition: Edition,
    identity: Identity,
    topics: [&'static str; 1],
}

impl PvMagExtractor {
    pub fn new(edition: Edition) -> PvMagExtractor {
        PvMagExtractor {
            edition,
            identity: Identity::new(HEADERS.to_vec()),
            topics: [edition.source().as_str()],
        }
    }
}

/// Listing previews expose no native id, so the id is a name-based UUID of
/// the headline.
pub fn article_id(title: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, title.as_bytes()).to_string()
}

impl Extractor for PvMagExtractor {
    fn source(&self) -> Source {
        self.edition.source()
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn topics(&self) -> &[&'static str] {
        &self.topics
    }

    fn listing_request(&self, topic: &str, page: u32) -> Result<PageRequest, CrawlerError> {
        check_topic(self.source(), &self.topics, topic)?;
        Ok(PageRequest::get(format!(
            "{}/news/page/{}/",
            self.edition.base(),
            page
        )))
    }

    fn extract_listing_page(&self, page: &Page) -> Result<ListingPage, ExtractError> {
        let doc = page.html();
        let mut items = vec![];
        for preview in doc.select(&PREVIEW) {
            let Some(h2) = preview.select(&H2).next() else {
                warn!("[{}] no title in preview, skipping", self.source());
                continue;
            };
            let Some(url) = h2.select(&A).next().and_then(|a| a.value().attr("href")) else {
                warn!("[{}] no link in preview, skipping", self.source());
                continue;
            };
            let title = text_of(h2);
            let mut record =
                ArticleRecord::new(self.source(), article_id(&title), url.trim(), title);
            record.date_published = preview
                .select(&PUBLISHED)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .map(squash_whitespace);
            record.author = preview.select(&AUTHOR).next().map(text_of).and_then(non_empty);
            record.summary = preview.select(&LEAD).next().map(text_of).and_then(non_empty);
            items.push(record);
        }
        Ok(ListingPage::new(items))
    }

    fn extract_detail(&self, page: &Page) -> Result<DetailFields, ExtractError> {
        let doc = page.html();
        let content = doc
            .select(&ENTRY_CONTENT)
            .next()
            .ok_or(ExtractError::MissingField("div.entry-content"))?;
        let paras: Vec<String> = content.select(&P).map(text_of).collect();
        // The last paragraph is the newsletter/contact footer.
        let kept = paras.len().saturating_sub(1);
        let body = squash_whitespace(&paras[..kept].join("\n"));
        Ok(DetailFields {
            body: non_empty(body),
            ..DetailFields::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn listing_request_per_edition() {
        let r = PvMagExtractor::new(Edition::Usa)
            .listing_request("pvmag_usa", 4)
            .unwrap();
        assert_eq!(r.url, "https://www.pv-magazine-usa.com/news/page/4/");
        assert!(PvMagExtractor::new(Edition::Usa)
            .listing_request("pvmag", 1)
            .is_err());
    }

    #[test]
    fn ids_are_stable() {
        assert_eq!(article_id("Same title"), article_id("Same title"));
        assert_ne!(article_id("Same title"), article_id("Other title"));
    }

    #[test]
    fn parses_listing_fixture() {
        let html = fs::read_to_string("tests/htmls/pvmag_listing.html").expect("Invalid file url");
        let page = Page::new("https://www.pv-magazine-india.com/news/page/1/", html);
        let listing = PvMagExtractor::new(Edition::India)
            .extract_listing_page(&page)
            .unwrap();

        assert_eq!(listing.items.len(), 2);
        let first = &listing.items[0];
        assert_eq!(first.title, "India adds 15 GW of solar in first half");
        assert_eq!(first.article_id, article_id("India adds 15 GW of solar in first half"));
        assert_eq!(
            first.url,
            "https://www.pv-magazine-india.com/2024/07/19/india-adds-15-gw-of-solar/"
        );
        assert_eq!(first.date_published.as_deref(), Some("2024-07-19T10:30:00+05:30"));
        assert_eq!(first.author.as_deref(), Some("Uma Gupta"));
        assert_eq!(first.summary.as_deref(), Some("Installations rose sharply."));
        assert_eq!(listing.items[1].summary, None);
    }

    #[test]
    fn detail_drops_footer_paragraph() {
        let html = fs::read_to_string("tests/htmls/pvmag_article.html").expect("Invalid file url");
        let page = Page::new("https://www.pv-magazine-india.com/2024/07/19/x/", html);
        let detail = PvMagExtractor::new(Edition::India)
            .extract_detail(&page)
            .unwrap();
        assert_eq!(
            detail.body.as_deref(),
            Some("India installed 15 GW of solar capacity. Most of it was utility scale.")
        );
    }

    #[test]
    fn missing_content_is_malformed() {
        let page = Page::new("https://x", "<html><body>gone</body></html>");
        assert!(matches!(
            PvMagExtractor::new(Edition::Global).extract_detail(&page),
            Err(ExtractError::MissingField(_))
        ));
    }
}
