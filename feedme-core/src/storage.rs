use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::config::Sampling;
use crate::error::StoreError;
use crate::models::{Article, ArticleDraft, NewSource, Source};

#[derive(Debug, FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    url: String,
    pub_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    source_id: i64,
    s_country: String,
    s_language: String,
    s_category: String,
    s_url: String,
    s_editor: String,
    s_logo: String,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            url: row.url,
            pub_date: row.pub_date,
            created_at: row.created_at,
            source_id: row.source_id,
            source: Source {
                id: row.source_id,
                country: row.s_country,
                language: row.s_language,
                category: row.s_category,
                url: row.s_url,
                editor: row.s_editor,
                logo: row.s_logo,
            },
        }
    }
}

const ARTICLE_SELECT: &str = r#"
    SELECT a.id, a.title, a.url, a.pub_date, a.created_at, a.source_id,
           s.country AS s_country, s.language AS s_language, s.category AS s_category,
           s.url AS s_url, s.editor AS s_editor, s.logo AS s_logo
    FROM articles a
    JOIN sources s ON s.id = a.source_id
"#;

/// Typed access to the `sources` and `articles` tables.
///
/// Uniqueness of `sources.url`, `articles.title` and `articles.url` is
/// enforced by the schema; inserts that collide are ignored rather than
/// reported as errors.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if missing) the SQLite file and ensures the schema.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                country TEXT NOT NULL,
                language TEXT NOT NULL,
                category TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                editor TEXT NOT NULL,
                logo TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL UNIQUE,
                pub_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                source_id INTEGER NOT NULL REFERENCES sources(id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_pub_date ON articles(pub_date DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Inserts a source unless its url is already known. Returns whether a
    /// row was added.
    pub async fn insert_source(&self, source: &NewSource) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO sources (country, language, category, url, editor, logo)
            VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&source.country)
        .bind(&source.language)
        .bind(&source.category)
        .bind(&source.url)
        .bind(&source.editor)
        .bind(&source.logo)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        let sources = sqlx::query_as::<_, Source>(
            "SELECT id, country, language, category, url, editor, logo FROM sources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    /// Inserts an article for `source_id`. A title or url collision is the
    /// dedup path and yields `Ok(false)`.
    pub async fn insert_article(
        &self,
        source_id: i64,
        draft: &ArticleDraft,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles (title, url, pub_date, created_at, source_id)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(&draft.title)
        .bind(&draft.url)
        .bind(draft.published_at)
        .bind(Utc::now())
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!(url = %draft.url, "article already stored");
        }
        Ok(inserted)
    }

    pub async fn count_articles(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Selects at most `limit` articles joined with their source, optionally
    /// restricted to those published at or after `since`.
    pub async fn sample_articles(
        &self,
        sampling: Sampling,
        limit: u32,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Article>, StoreError> {
        let filter = if since.is_some() {
            "WHERE a.pub_date >= ?"
        } else {
            ""
        };
        let order = match sampling {
            Sampling::Random => "ORDER BY RANDOM()",
            Sampling::Recent => "ORDER BY a.pub_date DESC, a.id DESC",
        };
        let sql = format!("{ARTICLE_SELECT} {filter} {order} LIMIT ?");

        let mut query = sqlx::query_as::<_, ArticleRow>(&sql);
        if let Some(since) = since {
            query = query.bind(since);
        }
        let rows = query.bind(i64::from(limit)).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Article::from).collect())
    }
}
