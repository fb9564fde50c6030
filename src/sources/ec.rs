//! Economic Times lazy-loading category lists.

use super::{article_from_json_ld, check_topic, text_of};
use crate::{
    article::{ArticleRecord, DetailFields, Source},
    error::{CrawlerError, ExtractError},
    fetcher::{Identity, Page, PageRequest},
    utils::last_segment,
    Extractor, ListingPage,
};
use lazy_static::lazy_static;
use reqwest::Url;
use scraper::Selector;
use tracing::warn;

pub const EC_URL: &str = "https://economictimes.indiatimes.com/";
const MSID: &str = "81585238";

pub const TOPICS: [&str; 3] = ["solar", "renewable-regulation", "hybrid"];

const HEADERS: [(&str, &str); 10] = [
    (
        "User-Agent",
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
    ),
    ("Accept", "text/html, */*; q=0.01"),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("X-Requested-With", "XMLHttpRequest"),
    ("Connection", "keep-alive"),
    ("Referer", "https://www.google.com/"),
    ("Sec-Fetch-Dest", "empty"),
    ("Sec-Fetch-Mode", "cors"),
    ("Sec-Fetch-Site", "same-origin"),
    ("TE", "trailers"),
];

const E: &str = "Invalid selector";
lazy_static! {
    static ref LI: Selector = Selector::parse("li").expect(E);
    static ref ANCHOR: Selector = Selector::parse("a.anc, a.ancs").expect(E);
}

#[derive(Debug)]
pub struct EcExtractor {
    identity: Identity,
    base: Url,
}

impl EcExtractor {
    pub fn new() -> EcExtractor {
        EcExtractor {
            identity: Identity::new(HEADERS.to_vec()),
            base: Url::parse(EC_URL).expect("Invalid base url"),
        }
    }

    fn cfmid(topic: &str) -> &'static str {
        match topic {
            "solar" => "4005094",
            "renewable-regulation" => "4016096",
            _ => "4005093",
        }
    }
}

impl Default for EcExtractor {
    fn default() -> Self {
        EcExtractor::new()
    }
}

/// `.../articleshow/101234567.cms` → `101234567`
fn article_id(url: &str) -> &str {
    let segment = last_segment(url);
    segment.split('.').next().unwrap_or(segment)
}

impl Extractor for EcExtractor {
    fn source(&self) -> Source {
        Source::Ec
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn topics(&self) -> &[&'static str] {
        &TOPICS
    }

    fn listing_request(&self, topic: &str, page: u32) -> Result<PageRequest, CrawlerError> {
        check_topic(self.source(), &TOPICS, topic)?;
        let url = format!(
            "{}defencelazyloadinglist/cfmid-{}.cms",
            EC_URL,
            EcExtractor::cfmid(topic)
        );
        Ok(PageRequest::get(url)
            .query("curpg", page.to_string())
            .query("msid", MSID))
    }

    fn extract_listing_page(&self, page: &Page) -> Result<ListingPage, ExtractError> {
        let doc = page.html();
        let mut items = vec![];
        for li in doc.select(&LI) {
            let Some(anchor) = li.select(&ANCHOR).next() else {
                warn!("[ec] listing item without headline link, skipping");
                continue;
            };
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let url = match self.base.join(href.trim()) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    warn!("[ec] bad link {:?}: {}", href, e);
                    continue;
                }
            };
            let title = anchor
                .value()
                .attr("title")
                .map(crate::utils::squash_whitespace)
                .unwrap_or_else(|| text_of(anchor));
            let id = article_id(&url).to_string();
            items.push(ArticleRecord::new(Source::Ec, id, url, title));
        }
        Ok(ListingPage::new(items))
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
    fn listing_request() {
        let r = EcExtractor::new().listing_request("hybrid", 2).unwrap();
        assert_eq!(
            r.describe(),
            "https://economictimes.indiatimes.com/defencelazyloadinglist/cfmid-4005093.cms?curpg=2&msid=81585238"
        );
    }

    #[test]
    fn listing_items() {
        let html = r#"<ul>
            <li><a class="anc" title="Rooftop solar scheme crosses 1 GW"
                   href="/industry/renewables/rooftop-solar/articleshow/110000001.cms">Rooftop</a></li>
            <li><a class="other" href="/x">ad</a></li>
            <li><a class="ancs" href="https://economictimes.indiatimes.com/news/hybrid-parks/articleshow/110000002.cms">Hybrid parks</a></li>
        </ul>"#;
        let listing = EcExtractor::new()
            .extract_listing_page(&Page::new(EC_URL, html))
            .unwrap();
        let got: Vec<_> = listing
            .items
            .iter()
            .map(|r| (r.article_id.as_str(), r.title.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("110000001", "Rooftop solar scheme crosses 1 GW"),
                ("110000002", "Hybrid parks"),
            ]
        );
        assert_eq!(
            listing.items[0].url,
            "https://economictimes.indiatimes.com/industry/renewables/rooftop-solar/articleshow/110000001.cms"
        );
    }

    #[test]
    fn empty_list_is_end() {
        let listing = EcExtractor::new()
            .extract_listing_page(&Page::new(EC_URL, ""))
            .unwrap();
        assert!(listing.items.is_empty());
    }
}
