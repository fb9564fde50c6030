//! Energy Economic Times daily newsletter. Each issue is a page of tracked
//! links; the article pages behind them are the regular EET pages.

use super::{article_from_json_ld, eec, text_of};
use crate::{
    article::DetailFields,
    error::ExtractError,
    fetcher::{Identity, Page, PageRequest},
    utils::last_segment,
};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use scraper::Selector;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Newsletter categories and the escaped path fragment that marks them in
/// tracked links.
pub const CATEGORIES: [(&str, &str); 7] = [
    ("environment", "news%2Fenvironment"),
    ("renewable", "news%2Frenewable"),
    ("companies", "news%2Fcompanies"),
    ("economy", "news%2Feconomy"),
    ("power", "news%2Fpower"),
    ("coal", "news%2Fcoal"),
    ("oil", "news%2Foil"),
];

const ACTIVITY_ID: &str = "35";

const E: &str = "Invalid selector";
lazy_static! {
    static ref A: Selector = Selector::parse("a[href]").expect(E);
}

/// Links of one issue, grouped by category.
pub type IssueLinks = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug)]
pub struct NewsletterExtractor {
    identity: Identity,
}

impl NewsletterExtractor {
    pub fn new() -> NewsletterExtractor {
        NewsletterExtractor {
            identity: Identity::new(eec::HEADERS.to_vec()),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn issue_request(&self, date: NaiveDate) -> PageRequest {
        PageRequest::get(format!("{}/newsletter", eec::ENERGY_BASE))
            .query("for_date", date.format("%Y-%m-%d").to_string())
            .query("activity_id", ACTIVITY_ID)
    }

    /// Category links of an issue. Anchors with an empty or "read more"
    /// headline duplicate a headline link and are ignored.
    pub fn extract_links(&self, page: &Page) -> IssueLinks {
        let doc = page.html();
        let mut links = IssueLinks::new();
        for anchor in doc.select(&A) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some((category, _)) = CATEGORIES.iter().find(|(_, marker)| href.contains(marker))
            else {
                continue;
            };
            let headline = text_of(anchor);
            if headline.is_empty() || headline.eq_ignore_ascii_case("read more") {
                continue;
            }
            let url = unwrap_tracked(href);
            debug!("[nleec] {:>12}: {}", category, headline);
            links.entry(category.to_string()).or_default().insert(url);
        }
        links
    }

    pub fn detail_request(&self, url: &str) -> PageRequest {
        PageRequest::get(url)
    }

    pub fn extract_detail(&self, page: &Page) -> Result<DetailFields, ExtractError> {
        article_from_json_ld(&page.html())
    }
}

impl Default for NewsletterExtractor {
    fn default() -> Self {
        NewsletterExtractor::new()
    }
}

/// `...?url=<escaped target>&mailer_id=...` → target URL.
pub fn unwrap_tracked(href: &str) -> String {
    let target = href.split_once("?url=").map_or(href, |(_, rest)| rest);
    let target = target.split_once("&mailer_id").map_or(target, |(t, _)| t);
    match urlencoding::decode(target) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => target.to_string(),
    }
}

pub fn article_id(url: &str) -> &str {
    last_segment(url)
}

/// The eec topic covering the same ground as a newsletter category.
pub fn companion_topic(category: &str) -> String {
    format!("{}-news", category)
}
