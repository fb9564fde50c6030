use serde::{Deserialize, Serialize};
use std::fmt;

/// News site an article was discovered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Ec,
    Eec,
    Nleec,
    Mercom,
    Pvmag,
    PvmagUsa,
    PvmagGlobal,
    Saur,
}

impl Source {
    pub const ALL: [Source; 8] = [
        Source::Ec,
        Source::Eec,
        Source::Nleec,
        Source::Mercom,
        Source::Pvmag,
        Source::PvmagGlobal,
        Source::PvmagUsa,
        Source::Saur,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Ec => "ec",
            Source::Eec => "eec",
            Source::Nleec => "nleec",
            Source::Mercom => "mercom",
            Source::Pvmag => "pvmag",
            Source::PvmagUsa => "pvmag_usa",
            Source::PvmagGlobal => "pvmag_global",
            Source::Saur => "saur",
        }
    }

    pub fn parse(s: &str) -> Option<Source> {
        Source::ALL.into_iter().find(|source| source.as_str() == s)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One article of one source, keyed by `article_id` inside its collection.
///
/// The id is the map key in the persisted file, so it is not serialized
/// inside the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    #[serde(skip)]
    pub article_id: String,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    pub source: Source,
}

/// Fields only available from an article's own page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub body: Option<String>,
    pub date_published: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
}

impl ArticleRecord {
    pub fn new<I, U, T>(source: Source, article_id: I, url: U, title: T) -> ArticleRecord
    where
        I: Into<String>,
        U: Into<String>,
        T: Into<String>,
    {
        ArticleRecord {
            article_id: article_id.into(),
            url: url.into(),
            title: title.into(),
            summary: None,
            body: None,
            date_published: None,
            author: None,
            keywords: vec![],
            source,
        }
    }

    /// A record with a non-empty body needs no further detail-fetch.
    pub fn is_complete(&self) -> bool {
        self.body.as_deref().map_or(false, |b| !b.trim().is_empty())
    }

    /// Fills fields that are still empty from `other`; populated fields win.
    pub fn absorb(&mut self, other: ArticleRecord) {
        if self.url.is_empty() {
            self.url = other.url;
        }
        if self.title.is_empty() {
            self.title = other.title;
        }
        fill(&mut self.summary, other.summary);
        fill(&mut self.body, other.body);
        fill(&mut self.date_published, other.date_published);
        fill(&mut self.author, other.author);
        if self.keywords.is_empty() {
            self.keywords = other.keywords;
        }
    }

    /// Replaces every field `other` carries.
    pub fn overwrite(&mut self, other: ArticleRecord) {
        let ArticleRecord {
            url,
            title,
            summary,
            body,
            date_published,
            author,
            keywords,
            ..
        } = other;
        if !url.is_empty() {
            self.url = url;
        }
        if !title.is_empty() {
            self.title = title;
        }
        replace(&mut self.summary, summary);
        replace(&mut self.body, body);
        replace(&mut self.date_published, date_published);
        replace(&mut self.author, author);
        if !keywords.is_empty() {
            self.keywords = keywords;
        }
    }

    pub fn apply_detail(&mut self, detail: DetailFields) {
        let DetailFields {
            title,
            summary,
            body,
            date_published,
            author,
            keywords,
        } = detail;
        if self.title.is_empty() {
            if let Some(title) = title {
                self.title = title;
            }
        }
        fill(&mut self.summary, summary);
        fill(&mut self.body, body);
        fill(&mut self.date_published, date_published);
        fill(&mut self.author, author);
        if self.keywords.is_empty() {
            self.keywords = keywords;
        }
    }
}

/// Blank strings count as missing.
fn fill(slot: &mut Option<String>, value: Option<String>) {
    let missing = slot.as_deref().map_or(true, |s| s.trim().is_empty());
    if missing && value.is_some() {
        *slot = value;
    }
}

fn replace(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

impl fmt::Display for ArticleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Id              : {}", self.article_id)?;
        writeln!(f, "Source          : {}", self.source)?;
        writeln!(f, "Title           : {}", self.title)?;
        writeln!(f, "Url             : {}", self.url)?;
        writeln!(
            f,
            "Published Date  : {}",
            self.date_published.as_deref().unwrap_or("None")
        )?;
        writeln!(f, "Author          : {}", self.author.as_deref().unwrap_or("None"))?;
        writeln!(f, "Summary         : {}", self.summary.as_deref().unwrap_or("None"))?;
        writeln!(f, "Keywords        : {}", self.keywords.join(", "))?;
        match self.body.as_deref() {
            Some(body) => writeln!(f, "Body            : {} bytes", body.len()),
            None => writeln!(f, "Body            : None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record() -> ArticleRecord {
        ArticleRecord::new(Source::Saur, "post-1", "https://example.com/1", "Title")
    }

    #[test]
    fn detail_sets_missing_body() {
        let mut r = record();
        assert!(!r.is_complete());
        r.apply_detail(DetailFields {
            body: Some("Body text".into()),
            keywords: vec!["solar".into()],
            ..Default::default()
        });
        assert_eq!(r.body.as_deref(), Some("Body text"));
        assert_eq!(r.keywords, vec!["solar".to_string()]);
        assert!(r.is_complete());
    }

    #[test]
    fn detail_keeps_existing_body() {
        let mut r = record();
        r.body = Some("original".into());
        r.apply_detail(DetailFields {
            body: Some("replacement".into()),
            ..Default::default()
        });
        assert_eq!(r.body.as_deref(), Some("original"));
    }

    #[test]
    fn absorb_does_not_clobber() {
        let mut r = record();
        r.summary = Some("kept".into());
        let mut other = record();
        other.title = "Other".into();
        other.summary = Some("ignored".into());
        other.author = Some("Author".into());
        r.absorb(other);

        assert_eq!(r.title, "Title");
        assert_eq!(r.summary.as_deref(), Some("kept"));
        assert_eq!(r.author.as_deref(), Some("Author"));
    }

    #[test]
    fn overwrite_replaces_present_fields_only() {
        let mut r = record();
        r.summary = Some("old".into());
        r.author = Some("stays".into());
        let mut other = ArticleRecord::new(Source::Saur, "post-1", "", "");
        other.summary = Some("new".into());
        r.overwrite(other);

        assert_eq!(r.url, "https://example.com/1");
        assert_eq!(r.summary.as_deref(), Some("new"));
        assert_eq!(r.author.as_deref(), Some("stays"));
    }

    #[test]
    fn blank_body_is_incomplete() {
        let mut r = record();
        r.body = Some("   ".into());
        assert!(!r.is_complete());
    }

    #[test]
    fn detail_replaces_blank_body() {
        let mut r = record();
        r.body = Some("  \n ".into());
        r.apply_detail(DetailFields::default());
        assert_eq!(r.body.as_deref(), Some("  \n "));

        r.apply_detail(DetailFields {
            body: Some("Body text".into()),
            ..Default::default()
        });
        assert_eq!(r.body.as_deref(), Some("Body text"));
        assert!(r.is_complete());
    }

    #[test]
    fn source_names_round_trip() {
        for source in Source::ALL {
            assert_eq!(Source::parse(source.as_str()), Some(source));
        }
        assert_eq!(Source::parse("detik"), None);
    }
}
