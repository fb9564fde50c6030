//! Energy Economic Times category listings, served as HTML fragments by an
//! AJAX endpoint.

use super::{article_from_json_ld, check_topic, non_empty, text_of};
use crate::{
    article::{ArticleRecord, DetailFields, Source},
    error::{CrawlerError, ExtractError},
    fetcher::{Identity, Page, PageRequest},
    utils::last_segment,
    Extractor, ListingPage,
};
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

pub const ENERGY_BASE: &str = "https://energy.economictimes.indiatimes.com";
pub const AJAX_CALL_URL: &str = "https://energy.economictimes.indiatimes.com/ajax/call";

pub const TOPICS: [&str; 6] = [
    "all-news",
    "renewable-news",
    "economy-news",
    "oil-news",
    "coal-news",
    "power-news",
];

pub(crate) const HEADERS: [(&str, &str); 12] = [
    ("Accept", "application/json, text/javascript, */*; q=0.01"),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("X-Requested-With", "XMLHttpRequest"),
    ("DNT", "1"),
    ("Sec-GPC", "1"),
    ("Connection", "keep-alive"),
    ("Referer", "https://energy.economictimes.indiatimes.com/news"),
    ("Sec-Fetch-Dest", "empty"),
    ("Sec-Fetch-Mode", "cors"),
    ("Sec-Fetch-Site", "same-origin"),
    ("Priority", "u=1"),
    ("TE", "trailers"),
];

const E: &str = "Invalid selector";
lazy_static! {
    static ref LI: Selector = Selector::parse("li").expect(E);
    static ref A: Selector = Selector::parse("a[href]").expect(E);
    static ref P: Selector = Selector::parse("p").expect(E);
}

#[derive(Debug, Deserialize)]
struct AjaxResponse {
    data: AjaxData,
}

#[derive(Debug, Deserialize)]
struct AjaxData {
    #[serde(default)]
    has_reached_end: bool,
    #[serde(default)]
    html: Option<String>,
}

#[derive(Debug)]
pub struct EecExtractor {
    identity: Identity,
}

impl EecExtractor {
    pub fn new() -> EecExtractor {
        EecExtractor {
            identity: Identity::new(HEADERS.to_vec()),
        }
    }

    fn ajax_params(topic: &str, page: u32) -> (&'static str, serde_json::Value) {
        let category = match topic {
            "all-news" => {
                return (
                    "RevNewsListing",
                    json!({ "is_ajax": true, "page": page }),
                )
            }
            "economy-news" => {
                return (
                    "RevTagWiseNewsListing",
                    json!({ "q": "economy", "is_ajax": true, "action": "", "page": page }),
                )
            }
            "renewable-news" => "Renewable",
            "oil-news" => "oil-and-gas",
            "coal-news" => "coal",
            _ => "power",
        };
        (
            "RevCategoryWiseNewsListing",
            json!({
                "cat_name": category,
                "sub_cat_name": "",
                "is_ajax": true,
                "page": page,
            }),
        )
    }
}

impl Default for EecExtractor {
    fn default() -> Self {
        EecExtractor::new()
    }
}

/// Absolute article URL for a listing href.
pub(crate) fn absolute_url(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", ENERGY_BASE, href)
    } else {
        format!("{}/{}", ENERGY_BASE, href)
    }
}

/// Listing fragment → candidates. Items without a link are skipped.
pub(crate) fn parse_fragment(source: Source, fragment: &str) -> Vec<ArticleRecord> {
    let doc = Html::parse_fragment(fragment);
    let mut items = vec![];
    for li in doc.select(&LI) {
        let Some(anchor) = li.select(&A).next() else {
            warn!("[{}] listing item without link, skipping", source);
            continue;
        };
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        let url = absolute_url(href);
        let article_id = last_segment(&url).to_string();
        if article_id.is_empty() {
            warn!("[{}] no id in {}, skipping", source, url);
            continue;
        }
        let mut record = ArticleRecord::new(source, article_id, url, text_of(anchor));
        record.summary = li.select(&P).next().map(text_of).and_then(non_empty);
        items.push(record);
    }
    items
}

impl Extractor for EecExtractor {
    fn source(&self) -> Source {
        Source::Eec
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn topics(&self) -> &[&'static str] {
        &TOPICS
    }

    fn listing_request(&self, topic: &str, page: u32) -> Result<PageRequest, CrawlerError> {
        check_topic(self.source(), &TOPICS, topic)?;
        let (module, params) = EecExtractor::ajax_params(topic, page);
        Ok(PageRequest::get(AJAX_CALL_URL)
            .query("module", module)
            .query("ajax_params", params.to_string()))
    }

    fn extract_listing_page(&self, page: &Page) -> Result<ListingPage, ExtractError> {
        let response: AjaxResponse = page.json()?;
        if response.data.has_reached_end {
            return Ok(ListingPage::end());
        }
        let html = response
            .data
            .html
            .ok_or(ExtractError::MissingField("data.html"))?;
        Ok(ListingPage::new(parse_fragment(self.source(), &html)))
    }

    fn extract_detail(&self, page: &Page) -> Result<DetailFields, ExtractError> {
        article_from_json_ld(&page.html())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn listing_request_for_category() {
        let e = EecExtractor::new();
        let r = e.listing_request("coal-news", 3).unwrap();
        assert_eq!(r.url, AJAX_CALL_URL);
        assert_eq!(r.query[0], ("module".into(), "RevCategoryWiseNewsListing".into()));
        assert_eq!(
            r.query[1].1,
            r#"{"cat_name":"coal","sub_cat_name":"","is_ajax":true,"page":3}"#
        );
        assert!(e.listing_request("cricket", 1).is_err());
    }

    #[test]
    fn listing_page_items() {
        let body = json!({
            "data": {
                "has_reached_end": false,
                "html": r#"<ul>
                    <li><a href="news/renewable/green-hydrogen-push/111">  Green
                        hydrogen push </a><p>Summary one</p></li>
                    <li><span>advert</span></li>
                    <li><a href="/news/power/grid-upgrade/222?from=mdr">Grid upgrade</a></li>
                </ul>"#
            }
        });
        let page = Page::new(AJAX_CALL_URL, body.to_string());
        let listing = EecExtractor::new().extract_listing_page(&page).unwrap();

        assert!(!listing.reached_end);
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.items[0].article_id, "111");
        assert_eq!(listing.items[0].title, "Green hydrogen push");
        assert_eq!(
            listing.items[0].url,
            "https://energy.economictimes.indiatimes.com/news/renewable/green-hydrogen-push/111"
        );
        assert_eq!(listing.items[0].summary.as_deref(), Some("Summary one"));
        assert_eq!(listing.items[1].article_id, "222");
        assert_eq!(listing.items[1].summary, None);
    }

    #[test]
    fn reached_end_is_authoritative() {
        let page = Page::new(
            AJAX_CALL_URL,
            r#"{"data": {"has_reached_end": true, "html": "<li><a href='/x/1'>x</a></li>"}}"#,
        );
        let listing = EecExtractor::new().extract_listing_page(&page).unwrap();
        assert_eq!(listing, ListingPage::end());
    }

    #[test]
    fn changed_contract_is_an_error() {
        let page = Page::new(AJAX_CALL_URL, r#"{"status": "moved"}"#);
        assert!(EecExtractor::new().extract_listing_page(&page).is_err());
        let page = Page::new(AJAX_CALL_URL, "<html>maintenance</html>");
        assert!(matches!(
            EecExtractor::new().extract_listing_page(&page),
            Err(ExtractError::Json(_))
        ));
    }
}
