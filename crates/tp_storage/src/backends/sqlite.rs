use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tp_core::config::StorageConfig;
use tp_core::query::{format_timestamp, like_pattern, ArticleQuery, BindValue, QueryPlan};
use tp_core::storage::{ArticleStorage, TopicStorage};
use tp_core::types::{
    normalize_major, Article, ArticleId, CategoryAssignment, MemberRow, NewArticle, Topic,
    TopicArticle, TopicId, TopicPayload, TopicRecord, TopicSummary,
};
use tp_core::{Error, Result, UNCATEGORIZED};

use crate::StorageBackend;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        url TEXT NOT NULL UNIQUE,
        source TEXT NOT NULL,
        summary TEXT,
        labels TEXT NOT NULL DEFAULT '[]',
        thumbnail_url TEXT,
        published TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_created_at ON articles (created_at DESC, id DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS topics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        monthly_summary TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS topic_articles (
        topic_id INTEGER NOT NULL REFERENCES topics (id) ON DELETE CASCADE,
        article_id INTEGER NOT NULL REFERENCES articles (id) ON DELETE CASCADE,
        display_order INTEGER NOT NULL,
        category_main TEXT NOT NULL DEFAULT '未分類',
        category_sub TEXT NOT NULL DEFAULT '[]',
        PRIMARY KEY (topic_id, article_id)
    )
    "#,
    // Add future migrations here
];

const TOPIC_COLUMNS: &str = "id, title, monthly_summary, created_at, updated_at";

fn db_error(context: &str, e: sqlx::Error) -> Error {
    Error::Storage(format!("{}: {}", context, e))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Failed to parse date {:?}: {}", value, e)))
}

fn parse_set(value: &str) -> Result<BTreeSet<String>> {
    if value.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    Ok(serde_json::from_str::<Option<BTreeSet<String>>>(value)?.unwrap_or_default())
}

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    let labels: String = row.get("labels");
    let published: Option<String> = row.get("published");
    Ok(Article {
        id: row.get("id"),
        title: row.get("title"),
        url: row.get("url"),
        source: row.get("source"),
        summary: row.get("summary"),
        labels: parse_set(&labels)?,
        thumbnail_url: row.get("thumbnail_url"),
        published: published.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn topic_from_row(row: &SqliteRow) -> Result<Topic> {
    Ok(Topic {
        id: row.get("id"),
        title: row.get("title"),
        monthly_summary: row.get("monthly_summary"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub struct SQLiteStorage {
    pool: Arc<SqlitePool>,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be writable at the configured storage.path"
    }

    async fn open(config: &StorageConfig) -> Result<Self> {
        Self::new_with_path(&config.path).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Failed to connect to database", e))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| db_error(&format!("Failed to run migration {}", i), e))?;
        }
        tracing::debug!(path = %db_path.display(), "sqlite storage ready");

        Ok(Self {
            pool: Arc::new(pool),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    async fn fetch_topic(&self, id: TopicId) -> Result<Option<Topic>> {
        let row = sqlx::query(&format!("SELECT {} FROM topics WHERE id = ?", TOPIC_COLUMNS))
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| db_error("Failed to load topic", e))?;
        row.as_ref().map(topic_from_row).transpose()
    }

    async fn insert_members(
        tx: &mut Transaction<'_, Sqlite>,
        topic_id: TopicId,
        rows: &[MemberRow],
    ) -> Result<()> {
        for row in rows {
            let category_main = normalize_major(Some(row.category_main.as_str()))
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            sqlx::query(
                r#"
                INSERT INTO topic_articles
                (topic_id, article_id, display_order, category_main, category_sub)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(topic_id)
            .bind(row.article_id)
            .bind(row.display_order as i64)
            .bind(category_main)
            .bind(serde_json::to_string(&row.category_sub)?)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_foreign_key_violation() {
                        return Error::not_found(format!("article {}", row.article_id));
                    }
                }
                db_error("Failed to store topic member", e)
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn store_article(&self, article: &NewArticle) -> Result<ArticleId> {
        let created_at = article.created_at.unwrap_or_else(Utc::now);
        let result = sqlx::query(
            r#"
            INSERT INTO articles
            (title, url, source, summary, labels, thumbnail_url, published, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.title)
        .bind(&article.url)
        .bind(article.source_or_default())
        .bind(article.summary.as_deref())
        .bind(serde_json::to_string(&article.labels)?)
        .bind(article.thumbnail_url.as_deref())
        .bind(article.published.as_ref().map(format_timestamp))
        .bind(format_timestamp(&created_at))
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return Error::Conflict(format!("url already stored: {}", article.url));
                }
            }
            db_error("Failed to store article", e)
        })?;

        Ok(result.last_insert_rowid())
    }

    async fn get_article(&self, id: ArticleId) -> Result<Option<Article>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM articles WHERE id = ?",
            tp_core::query::ARTICLE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| db_error("Failed to load article", e))?;
        row.as_ref().map(article_from_row).transpose()
    }

    async fn query_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let QueryPlan { sql, binds } = query.plan();
        let mut statement = sqlx::query(&sql);
        for bind in binds {
            statement = match bind {
                BindValue::Text(text) => statement.bind(text),
                BindValue::Integer(value) => statement.bind(value),
            };
        }
        let rows = statement
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| db_error("Failed to query articles", e))?;
        rows.iter().map(article_from_row).collect()
    }

    async fn delete_articles(&self, ids: &[ArticleId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM articles WHERE id IN ({})", placeholders(ids.len()));
        let mut statement = sqlx::query(&sql);
        for id in ids {
            statement = statement.bind(*id);
        }
        let result = statement
            .execute(&*self.pool)
            .await
            .map_err(|e| db_error("Failed to delete articles", e))?;
        Ok(result.rows_affected())
    }

    async fn labels(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT l.value AS label
            FROM articles, json_each(articles.labels) AS l
            WHERE l.type = 'text' AND TRIM(l.value) <> ''
            ORDER BY label
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| db_error("Failed to list labels", e))?;
        Ok(rows.iter().map(|row| row.get("label")).collect())
    }
}

#[async_trait]
impl TopicStorage for SQLiteStorage {
    async fn list_topics(&self, search: Option<&str>) -> Result<Vec<TopicSummary>> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let sql = format!(
            "SELECT {} FROM topics{} ORDER BY updated_at DESC, id DESC",
            TOPIC_COLUMNS,
            if search.is_some() { " WHERE title LIKE ? ESCAPE '\\'" } else { "" }
        );
        let mut statement = sqlx::query(&sql);
        if let Some(search) = search {
            statement = statement.bind(like_pattern(search));
        }
        let rows = statement
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| db_error("Failed to list topics", e))?;
        rows.iter()
            .map(|row| topic_from_row(row).map(|t| TopicSummary::from(&t)))
            .collect()
    }

    async fn get_topic(&self, id: TopicId) -> Result<Option<TopicRecord>> {
        let Some(topic) = self.fetch_topic(id).await? else {
            return Ok(None);
        };
        let rows = sqlx::query(
            r#"
            SELECT a.id AS id, a.title AS title, a.url AS url, a.source AS source,
                   a.summary AS summary, a.labels AS labels, a.thumbnail_url AS thumbnail_url,
                   a.published AS published, a.created_at AS created_at,
                   ta.display_order AS display_order, ta.category_main AS category_main,
                   ta.category_sub AS category_sub
            FROM topic_articles ta
            JOIN articles a ON a.id = ta.article_id
            WHERE ta.topic_id = ?
            ORDER BY ta.display_order, a.id
            "#,
        )
        .bind(id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| db_error("Failed to load topic members", e))?;

        let mut articles = Vec::with_capacity(rows.len());
        for row in &rows {
            let category_main: String = row.get("category_main");
            let category_sub: String = row.get("category_sub");
            articles.push(TopicArticle {
                article: article_from_row(row)?,
                display_order: row.get::<i64, _>("display_order").max(0) as usize,
                category_major: normalize_major(Some(category_main.as_str())),
                category_minor: parse_set(&category_sub)?,
            });
        }
        Ok(Some(TopicRecord { topic, articles }))
    }

    async fn create_topic(&self, payload: &TopicPayload) -> Result<Topic> {
        let now = format_timestamp(&Utc::now());
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let result = sqlx::query(
            "INSERT INTO topics (title, monthly_summary, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&payload.title)
        .bind(payload.monthly_summary.as_deref())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to create topic", e))?;
        let id = result.last_insert_rowid();

        Self::insert_members(&mut tx, id, &payload.articles).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit topic", e))?;

        self.fetch_topic(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("topic {}", id)))
    }

    async fn update_topic(&self, id: TopicId, payload: &TopicPayload) -> Result<Topic> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let result = sqlx::query(
            "UPDATE topics SET title = ?, monthly_summary = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&payload.title)
        .bind(payload.monthly_summary.as_deref())
        .bind(format_timestamp(&Utc::now()))
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update topic", e))?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("topic {}", id)));
        }

        sqlx::query("DELETE FROM topic_articles WHERE topic_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to clear topic members", e))?;
        Self::insert_members(&mut tx, id, &payload.articles).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit topic", e))?;

        self.fetch_topic(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("topic {}", id)))
    }

    async fn delete_topic(&self, id: TopicId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM topics WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| db_error("Failed to delete topic", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_member_category(
        &self,
        topic_id: TopicId,
        article_id: ArticleId,
        assignment: &CategoryAssignment,
    ) -> Result<()> {
        let category_main = assignment
            .major
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let result = sqlx::query(
            "UPDATE topic_articles SET category_main = ?, category_sub = ? WHERE topic_id = ? AND article_id = ?",
        )
        .bind(category_main)
        .bind(serde_json::to_string(&assignment.minor)?)
        .bind(topic_id)
        .bind(article_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update category", e))?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!(
                "article {} is not in topic {}",
                article_id, topic_id
            )));
        }

        sqlx::query("UPDATE topics SET updated_at = ? WHERE id = ?")
            .bind(format_timestamp(&Utc::now()))
            .bind(topic_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to touch topic", e))?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit category", e))
    }

    async fn set_monthly_summary(&self, topic_id: TopicId, summary: &str) -> Result<Topic> {
        let result =
            sqlx::query("UPDATE topics SET monthly_summary = ?, updated_at = ? WHERE id = ?")
                .bind(Some(summary).filter(|s| !s.is_empty()))
                .bind(format_timestamp(&Utc::now()))
                .bind(topic_id)
                .execute(&*self.pool)
                .await
                .map_err(|e| db_error("Failed to store monthly summary", e))?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("topic {}", topic_id)));
        }
        self.fetch_topic(topic_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("topic {}", topic_id)))
    }
}
