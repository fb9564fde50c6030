//! Mercom India, read through its headless CMS GraphQL API. Listing pages
//! already carry the full article body.

use super::{check_topic, non_empty, text_of};
use crate::{
    article::{ArticleRecord, DetailFields, Source},
    error::{CrawlerError, ExtractError},
    fetcher::{Identity, Page, PageRequest},
    Extractor, ListingPage,
};
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

pub const GRAPHQL_ENDPOINT: &str = "https://cms.mercomindia.com/graphql";
pub const MERCOM_BASE: &str = "https://www.mercomindia.com/";
pub const PAGE_SIZE: u32 = 15;
pub const TOPICS: [&str; 1] = ["mercom"];

const GRAPHQL_QUERY: &str = r#"
query getPosts($offset: Int, $size: Int) {
    posts(where: {
        status: PUBLISH,
        categoryNotIn: [],
        offsetPagination: {offset: $offset, size: $size}
    }) {
        nodes {
            id
            slug
            date
            content
            title
            categories { nodes { name slug } }
            author { node { name } }
        }
    }
}
"#;

const HEADERS: [(&str, &str); 9] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0)",
    ),
    ("Accept", "*/*"),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Referer", "https://www.mercomindia.com/"),
    ("Origin", "https://www.mercomindia.com"),
    ("Connection", "keep-alive"),
    ("Sec-Fetch-Dest", "empty"),
    ("Sec-Fetch-Mode", "cors"),
    ("Sec-Fetch-Site", "same-site"),
];

const E: &str = "Invalid selector";
lazy_static! {
    static ref P: Selector = Selector::parse("p").expect(E);
    static ref ENTRY_CONTENT: Selector = Selector::parse("div.entry-content").expect(E);
    static ref TITLE: Selector = Selector::parse("h1").expect(E);
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    slug: String,
    title: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    categories: Option<Nodes<Named>>,
    #[serde(default)]
    author: Option<NodeOf<Named>>,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct NodeOf<T> {
    node: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug)]
pub struct MercomExtractor {
    identity: Identity,
}

impl MercomExtractor {
    pub fn new() -> MercomExtractor {
        MercomExtractor {
            identity: Identity::new(HEADERS.to_vec()),
        }
    }
}

impl Default for MercomExtractor {
    fn default() -> Self {
        MercomExtractor::new()
    }
}

/// Paragraph text of an HTML body, joined by single spaces.
fn paragraphs(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    doc.select(&P)
        .map(text_of)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl Extractor for MercomExtractor {
    fn source(&self) -> Source {
        Source::Mercom
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn topics(&self) -> &[&'static str] {
        &TOPICS
    }

    fn listing_request(&self, topic: &str, page: u32) -> Result<PageRequest, CrawlerError> {
        check_topic(self.source(), &TOPICS, topic)?;
        let offset = page.saturating_sub(1) * PAGE_SIZE;
        Ok(PageRequest::post_json(
            GRAPHQL_ENDPOINT,
            json!({
                "query": GRAPHQL_QUERY,
                "variables": { "offset": offset, "size": PAGE_SIZE },
            }),
        ))
    }

    fn extract_listing_page(&self, page: &Page) -> Result<ListingPage, ExtractError> {
        let response: Value = page.json()?;
        if let Some(errors) = response.get("errors") {
            return Err(ExtractError::Structure(format!("GraphQL errors: {}", errors)));
        }
        let nodes = response
            .pointer("/data/posts/nodes")
            .and_then(Value::as_array)
            .ok_or(ExtractError::MissingField("data.posts.nodes"))?;

        let mut items = vec![];
        for node in nodes {
            let post: Post = match serde_json::from_value(node.clone()) {
                Ok(post) => post,
                Err(e) => {
                    warn!("[mercom] skipping malformed post: {}", e);
                    continue;
                }
            };
            let Some(content) = post.content.as_deref() else {
                warn!("[mercom] {} has no content, skipping", post.id);
                continue;
            };
            let mut record = ArticleRecord::new(
                Source::Mercom,
                post.id.as_str(),
                format!("{}{}", MERCOM_BASE, post.slug),
                crate::utils::squash_whitespace(&post.title),
            );
            record.body = non_empty(paragraphs(content));
            record.date_published = post.date;
            record.keywords = post
                .categories
                .map(|c| c.nodes.into_iter().map(|n| n.name).collect())
                .unwrap_or_default();
            record.author = post.author.and_then(|a| a.node).map(|n| n.name);
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
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(DetailFields {
            title: doc.select(&TITLE).next().map(text_of).and_then(non_empty),
            body: non_empty(body),
            ..DetailFields::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn offsets_follow_page_number() {
        let e = MercomExtractor::new();
        let r = e.listing_request("mercom", 3).unwrap();
        match r.method {
            crate::fetcher::Method::PostJson(body) => {
                assert_eq!(body["variables"]["offset"], 30);
                assert_eq!(body["variables"]["size"], 15);
            }
            other => panic!("unexpected method {:?}", other),
        }
    }

    #[test]
    fn listing_carries_body() {
        let body = json!({
            "data": { "posts": { "nodes": [
                {
                    "id": "cG9zdDoxMjM=",
                    "slug": "sjvn-commissions-solar-project",
                    "title": "SJVN Commissions  Solar Project",
                    "date": "2024-06-30T18:20:00",
                    "content": "<p>SJVN has commissioned</p><p>a 90 MW project.</p>",
                    "categories": { "nodes": [ { "name": "Solar", "slug": "solar" } ] },
                    "author": { "node": { "name": "Rahul Nair" } }
                },
                { "id": "cG9zdDoxMjQ=", "slug": "no-content", "title": "Empty", "content": null },
                { "slug": "missing-id" }
            ] } }
        });
        let listing = MercomExtractor::new()
            .extract_listing_page(&Page::new(GRAPHQL_ENDPOINT, body.to_string()))
            .unwrap();

        assert_eq!(listing.items.len(), 1);
        let r = &listing.items[0];
        assert_eq!(r.article_id, "cG9zdDoxMjM=");
        assert_eq!(r.url, "https://www.mercomindia.com/sjvn-commissions-solar-project");
        assert_eq!(r.title, "SJVN Commissions Solar Project");
        assert_eq!(r.body.as_deref(), Some("SJVN has commissioned a 90 MW project."));
        assert_eq!(r.keywords, vec!["Solar".to_string()]);
        assert_eq!(r.author.as_deref(), Some("Rahul Nair"));
        assert!(r.is_complete());
    }

    #[test]
    fn graphql_errors_break_the_page() {
        let page = Page::new(GRAPHQL_ENDPOINT, r#"{"errors": [{"message": "bad query"}]}"#);
        assert!(matches!(
            MercomExtractor::new().extract_listing_page(&page),
            Err(ExtractError::Structure(_))
        ));
    }

    #[test]
    fn empty_nodes_is_end() {
        let page = Page::new(GRAPHQL_ENDPOINT, r#"{"data": {"posts": {"nodes": []}}}"#);
        let listing = MercomExtractor::new().extract_listing_page(&page).unwrap();
        assert!(listing.items.is_empty());
    }
}
