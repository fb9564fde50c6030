use crate::{article::DetailFields, error::ExtractError, utils::squash_whitespace};
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

const E: &str = "Invalid selector";
lazy_static! {
    static ref LD_JSON: Selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).expect(E);
}

const ARTICLE_TYPES: [&str; 4] = [
    "NewsArticle",
    "Article",
    "ReportageNewsArticle",
    "BlogPosting",
];

/// Reads article fields from the page's linked-data blocks.
///
/// Pages carry several blocks (organization, breadcrumbs, the article); the
/// first one describing an article wins.
pub fn article_from_json_ld(doc: &Html) -> Result<DetailFields, ExtractError> {
    let mut blocks = 0;
    let mut last_error = None;
    for script in doc.select(&LD_JSON) {
        blocks += 1;
        let raw: String = script.text().collect();
        // Some sites emit raw control characters inside string literals.
        let cleaned = raw.replace(['\n', '\t', '\r'], " ");
        match serde_json::from_str::<Value>(&cleaned) {
            Ok(value) => {
                if let Some(article) = find_article(&value) {
                    return Ok(to_detail(article));
                }
            }
            Err(e) => {
                debug!("Skipping undecodable ld+json block: {}", e);
                last_error = Some(e);
            }
        }
    }
    match (blocks, last_error) {
        (0, _) => Err(ExtractError::MissingField("application/ld+json")),
        (_, Some(e)) => Err(ExtractError::Json(e)),
        (_, None) => Err(ExtractError::MissingField("articleBody")),
    }
}

fn find_article(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_article),
        Value::Object(map) => {
            if is_article(value) {
                return Some(value);
            }
            map.get("@graph").and_then(find_article)
        }
        _ => None,
    }
}

fn is_article(value: &Value) -> bool {
    if value.get("articleBody").is_some() {
        return true;
    }
    match value.get("@type") {
        Some(Value::String(t)) => ARTICLE_TYPES.contains(&t.as_str()),
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| ARTICLE_TYPES.contains(&t)),
        _ => false,
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(squash_whitespace)
        .filter(|s| !s.is_empty())
}

fn to_detail(article: &Value) -> DetailFields {
    let author = match article.get("author") {
        Some(Value::Array(authors)) => authors.first().and_then(|a| string_field(a, "name")),
        Some(Value::String(name)) => Some(squash_whitespace(name)),
        Some(other) => string_field(other, "name"),
        None => None,
    };

    let keywords = match article.get("keywords") {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToString::to_string)
            .collect(),
        Some(Value::Array(ks)) => ks
            .iter()
            .filter_map(Value::as_str)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        _ => vec![],
    };

    DetailFields {
        title: string_field(article, "headline"),
        summary: string_field(article, "description"),
        body: string_field(article, "articleBody"),
        date_published: string_field(article, "datePublished"),
        author,
        keywords,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn picks_the_article_block() {
        let html = r#"<html><head>
            <script type="application/ld+json">{"@type": "Organization", "name": "ET"}</script>
            <script type="application/ld+json">{
                "@type": "NewsArticle",
                "headline": "Solar tariffs fall",
                "description": "Record low bids.",
                "articleBody": "Bids closed at   Rs 2.5 per unit.",
                "datePublished": "2024-07-01T10:00:00+05:30",
                "author": [{"@type": "Person", "name": "ETEnergyWorld"}],
                "keywords": "solar, tariff ,auction"
            }</script>
            </head><body></body></html>"#;
        let doc = Html::parse_document(html);
        let detail = article_from_json_ld(&doc).unwrap();
        assert_eq!(
            detail,
            DetailFields {
                title: Some("Solar tariffs fall".into()),
                summary: Some("Record low bids.".into()),
                body: Some("Bids closed at Rs 2.5 per unit.".into()),
                date_published: Some("2024-07-01T10:00:00+05:30".into()),
                author: Some("ETEnergyWorld".into()),
                keywords: vec!["solar".into(), "tariff".into(), "auction".into()],
            }
        );
    }

    #[test]
    fn raw_newlines_inside_strings_are_tolerated() {
        let html = "<script type=\"application/ld+json\">{\"@type\":\"NewsArticle\",\"articleBody\":\"line one\nline two\"}</script>";
        let doc = Html::parse_document(html);
        let detail = article_from_json_ld(&doc).unwrap();
        assert_eq!(detail.body.as_deref(), Some("line one line two"));
    }

    #[test]
    fn missing_block_is_an_error() {
        let doc = Html::parse_document("<html><body><p>nothing</p></body></html>");
        assert!(matches!(
            article_from_json_ld(&doc),
            Err(ExtractError::MissingField(_))
        ));
    }

    #[test]
    fn undecodable_block_is_an_error() {
        let doc = Html::parse_document(
            r#"<script type="application/ld+json">{"@type": "NewsArticle", </script>"#,
        );
        assert!(matches!(article_from_json_ld(&doc), Err(ExtractError::Json(_))));
    }
}
