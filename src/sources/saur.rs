use super::{check_topic, non_empty, text_of};
use crate::{
    article::{ArticleRecord, DetailFields, Source},
    error::{CrawlerError, ExtractError},
    fetcher::{Identity, Page, PageRequest},
    Extractor, ListingPage,
};
use lazy_static::lazy_static;
use scraper::Selector;
use tracing::warn;

pub const LISTING_URL: &str = "https://www.saurenergy.com/solar-energy-news/page";
pub const TOPICS: [&str; 1] = ["saur"];

const HEADERS: [(&str, &str); 12] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0)",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Connection", "keep-alive"),
    (
        "Cookie",
        "og48dbhr=284rlsvaxwwd; a1h4i8n6=kayvqm2t6crc; fvpphomepage23=true",
    ),
    ("Referer", "https://www.saurenergy.com/solar-energy-news"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "same-origin"),
    ("Sec-Fetch-User", "?1"),
    ("Priority", "u=0, i"),
    ("TE", "trailers"),
];

const E: &str = "Invalid selector";
lazy_static! {
    static ref ARTICLE: Selector = Selector::parse("article[id]").expect(E);
    static ref TITLE_LINK: Selector = Selector::parse("a.content-title-link").expect(E);
    static ref PUBLISHED: Selector =
        Selector::parse(r#"span[itemprop="datePublished"]"#).expect(E);
    static ref AUTHOR: Selector = Selector::parse("span.vcard.author").expect(E);
    static ref SUMMARY: Selector =
        Selector::parse("div.entry-summary.content-list-summary p").expect(E);
    static ref ENTRY_CONTENT: Selector = Selector::parse("div.entry-content.clearfix").expect(E);
    static ref P: Selector = Selector::parse("p").expect(E);
    static ref TAGS: Selector = Selector::parse("div.entry-tags a").expect(E);
}

#[derive(Debug)]
pub struct SaurExtractor {
    identity: Identity,
}

impl SaurExtractor {
    pub fn new() -> SaurExtractor {
        SaurExtractor {
            identity: Identity::new(HEADERS.to_vec()),
        }
    }
}

impl Default for SaurExtractor {
    fn default() -> Self {
        SaurExtractor::new()
    }
}

impl Extractor for SaurExtractor {
    fn source(&self) -> Source {
        Source::Saur
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn topics(&self) -> &[&'static str] {
        &TOPICS
    }

    fn listing_request(&self, topic: &str, page: u32) -> Result<PageRequest, CrawlerError> {
        check_topic(self.source(), &TOPICS, topic)?;
        Ok(PageRequest::get(format!("{}/{}", LISTING_URL, page)))
    }

    fn extract_listing_page(&self, page: &Page) -> Result<ListingPage, ExtractError> {
        let doc = page.html();
        let mut items = vec![];
        for article in doc.select(&ARTICLE) {
            let id = article.value().attr("id").unwrap_or_default().trim();
            if id.is_empty() {
                warn!("[saur] article without id, skipping");
                continue;
            }
            let Some(anchor) = article.select(&TITLE_LINK).next() else {
                warn!("[saur] {} has no title link, skipping", id);
                continue;
            };
            let Some(url) = anchor.value().attr("href") else {
                warn!("[saur] {} has no href, skipping", id);
                continue;
            };
            let mut record = ArticleRecord::new(Source::Saur, id, url.trim(), text_of(anchor));
            record.date_published = article.select(&PUBLISHED).next().map(text_of).and_then(non_empty);
            record.author = article.select(&AUTHOR).next().map(text_of).and_then(non_empty);
            record.summary = article.select(&SUMMARY).next().map(text_of).and_then(non_empty);
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
        let body = content
            .select(&P)
            .map(text_of)
            .collect::<Vec<_>>()
            .join(" ");
        let keywords = doc
            .select(&TAGS)
            .map(text_of)
            .filter(|k| !k.is_empty())
            .collect();
        Ok(DetailFields {
            body: non_empty(crate::utils::squash_whitespace(&body)),
            keywords,
            ..DetailFields::default()
        })
    }
}
