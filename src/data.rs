use crate::{utils, CrawlerError};
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::{fmt::Display, path::Path};

#[async_trait::async_trait]
pub trait Table {
    type Record<'a>;

    fn get_name(&self) -> &str;
    fn get_pool(&self) -> &SqlitePool;

    async fn create(&self) -> Result<(), sqlx::Error>;
    async fn insert<'a>(&self, record: Self::Record<'a>) -> Result<(), sqlx::Error>;

    async fn is_exist<I: AsRef<str> + Display + Send + Sync>(
        &self,
        id: I,
    ) -> Result<bool, sqlx::Error> {
        let query = format!("SELECT id FROM {} WHERE id = ?", self.get_name());
        Ok(sqlx::query(&query)
            .bind(id.as_ref())
            .fetch_optional(self.get_pool())
            .await?
            .is_some())
    }

    async fn count(&self) -> Result<u32, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM {}", self.get_name());
        Ok(sqlx::query(&query)
            .fetch_one(self.get_pool())
            .await?
            .try_get(0)?)
    }
}

/// One exported article, flattened for tabular use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRow {
    /// `source:article_id`
    pub id: String,
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub body: Option<String>,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    /// `|`-separated
    pub keywords: String,
    pub source: String,
}

pub struct ArticleTable {
    name: String,
    pool: SqlitePool,
}

impl ArticleTable {
    /// Opens (creating if needed) the database file at `path` and its
    /// article table.
    pub async fn open(path: &Path, name: &str) -> Result<ArticleTable, CrawlerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CrawlerError::io(parent, e))?;
        }
        let opt = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;
        let table = ArticleTable {
            name: name.to_string(),
            pool,
        };
        if !utils::is_table_exists(&table.pool, &table.name).await? {
            tracing::debug!("Create table {}", table.name);
            table.create().await?;
        } else {
            tracing::debug!("Use table {}", table.name);
        }
        Ok(table)
    }

    /// Inserts `rows` in a single transaction. Rows with an existing id
    /// replace the old one.
    pub async fn insert_all(&self, rows: &[ArticleRow]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let query = self.insert_query();
        for row in rows {
            bind_row(sqlx::query(&query), row).execute(&mut tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn insert_query(&self) -> String {
        format!(
            r#"INSERT OR REPLACE INTO {} (
                id,
                url,
                title,
                summary,
                body,
                date,
                keywords,
                source,
                created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            self.name
        )
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn bind_row<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    row: &'q ArticleRow,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(row.id.as_str())
        .bind(row.url.as_str())
        .bind(row.title.as_str())
        .bind(row.summary.as_deref())
        .bind(row.body.as_deref())
        .bind(row.date.as_deref())
        .bind(row.keywords.as_str())
        .bind(row.source.as_str())
        .bind(utils::get_now())
}

#[async_trait::async_trait]
impl Table for ArticleTable {
    type Record<'a> = &'a ArticleRow;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                r#"
                    CREATE TABLE {} (
                        id TEXT PRIMARY KEY,
                        url TEXT,
                        title TEXT,
                        summary TEXT,
                        body TEXT,
                        date TEXT,
                        keywords TEXT,
                        source TEXT,
                        created_at DATETIME
                    )
                "#,
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert<'a>(&self, record: Self::Record<'a>) -> Result<(), sqlx::Error> {
        let mut tx = self.get_pool().begin().await?;
        let query = self.insert_query();
        bind_row(sqlx::query(&query), record)
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(id: &str) -> ArticleRow {
        ArticleRow {
            id: id.to_string(),
            url: format!("https://example.com/{}", id),
            title: "Title".into(),
            summary: None,
            body: Some("Body".into()),
            date: Some("2024-07-01".into()),
            keywords: "solar|wind".into(),
            source: "eec".into(),
        }
    }

    #[tokio::test]
    async fn insert_replaces_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let table = ArticleTable::open(&dir.path().join("articles.db"), "articles")
            .await
            .unwrap();

        table.insert(&row("eec:1")).await.unwrap();
        let mut changed = row("eec:1");
        changed.title = "Changed".into();
        table.insert_all(&[changed, row("eec:2")]).await.unwrap();

        assert_eq!(table.count().await.unwrap(), 2);
        assert!(table.is_exist("eec:2").await.unwrap());
        assert!(!table.is_exist("eec:3").await.unwrap());

        let title: String = sqlx::query("SELECT title FROM articles WHERE id = ?")
            .bind("eec:1")
            .fetch_one(table.get_pool())
            .await
            .unwrap()
            .try_get(0)
            .unwrap();
        assert_eq!(title, "Changed");
    }

    #[tokio::test]
    async fn reopening_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("articles.db");
        let table = ArticleTable::open(&path, "articles").await.unwrap();
        table.insert(&row("ec:1")).await.unwrap();
        table.close().await;

        let table = ArticleTable::open(&path, "articles").await.unwrap();
        assert_eq!(table.count().await.unwrap(), 1);
    }
}
