//! Compiles optional article filters into a parameterized query.
//!
//! Filter semantics:
//!
//! - `keyword` matches title, summary or source as an ASCII case-insensitive
//!   substring (the same folding SQLite's `LIKE` applies).
//! - `source` is an exact match.
//! - `labels` matches when the article carries ANY of the given labels.
//! - `date_from`/`date_to` are inclusive calendar dates applied to the
//!   published timestamp, or the creation timestamp when unpublished.
//!
//! Results are ordered by creation time descending with the id as a stable
//! tie breaker, so consecutive pages never overlap.

use std::collections::BTreeSet;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Article;
use crate::{Error, Result};

pub const DEFAULT_PAGE: u32 = 0;
pub const DEFAULT_LIMIT: u32 = 50;

pub const ARTICLE_COLUMNS: &str =
    "id, title, url, source, summary, labels, thumbnail_url, published, created_at";

/// Query-string form of the listing request. Every field is kept as text so
/// malformed numbers can fail closed instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArticleQuery {
    pub keyword: Option<String>,
    pub source: Option<String>,
    /// Comma separated.
    pub labels: Option<String>,
    /// Single-label spelling kept for older clients.
    pub tag: Option<String>,
    #[serde(alias = "dateFrom")]
    pub date_from: Option<String>,
    #[serde(alias = "dateTo")]
    pub date_to: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleQuery {
    pub keyword: Option<String>,
    pub source: Option<String>,
    pub labels: BTreeSet<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            keyword: None,
            source: None,
            labels: BTreeSet::new(),
            date_from: None,
            date_to: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Text(String),
    Integer(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(field: &str, value: Option<String>) -> Result<Option<NaiveDate>> {
    match non_empty(value) {
        None => Ok(None),
        Some(text) => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| Error::validation(format!("{} must be YYYY-MM-DD, got {:?}", field, text))),
    }
}

/// Storage format for timestamps. Fixed width, so text comparison orders
/// chronologically.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::default()).and_utc()
}

/// `%keyword%` with LIKE metacharacters escaped for `ESCAPE '\\'`.
pub fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl ArticleQuery {
    pub fn from_raw(raw: RawArticleQuery) -> Result<Self> {
        let page = raw
            .page
            .and_then(|p| p.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_PAGE);
        let limit = raw
            .limit
            .and_then(|l| l.trim().parse::<u32>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT);

        let mut labels: BTreeSet<String> = raw
            .labels
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(tag) = non_empty(raw.tag) {
            labels.insert(tag);
        }

        Ok(Self {
            keyword: non_empty(raw.keyword),
            source: non_empty(raw.source),
            labels,
            date_from: parse_date("date_from", raw.date_from)?,
            date_to: parse_date("date_to", raw.date_to)?,
            page,
            limit,
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.limit)
    }

    fn upper_bound(&self) -> Option<DateTime<Utc>> {
        self.date_to
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .map(day_start)
    }

    /// In-memory evaluation of the filters, equivalent to [`ArticleQuery::plan`].
    pub fn matches(&self, article: &Article) -> bool {
        if let Some(keyword) = &self.keyword {
            let needle = keyword.to_ascii_lowercase();
            let hit = |text: &str| text.to_ascii_lowercase().contains(&needle);
            if !(hit(&article.title)
                || article.summary.as_deref().map(hit).unwrap_or(false)
                || hit(&article.source))
            {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if &article.source != source {
                return false;
            }
        }
        if !self.labels.is_empty() && self.labels.is_disjoint(&article.labels) {
            return false;
        }
        let ts = article.effective_published();
        if let Some(from) = self.date_from {
            if ts < day_start(from) {
                return false;
            }
        }
        if let Some(upper) = self.upper_bound() {
            if ts >= upper {
                return false;
            }
        }
        true
    }

    /// Applies ordering and pagination to an already filtered set.
    pub fn paginate(&self, mut articles: Vec<Article>) -> Vec<Article> {
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        articles
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .collect()
    }

    pub fn plan(&self) -> QueryPlan {
        let mut clauses: Vec<String> = Vec::new();
        let mut binds = Vec::new();

        if let Some(keyword) = &self.keyword {
            let pattern = like_pattern(keyword);
            clauses.push(
                "(title LIKE ? ESCAPE '\\' OR IFNULL(summary, '') LIKE ? ESCAPE '\\' OR source LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            for _ in 0..3 {
                binds.push(BindValue::Text(pattern.clone()));
            }
        }
        if let Some(source) = &self.source {
            clauses.push("source = ?".to_string());
            binds.push(BindValue::Text(source.clone()));
        }
        if !self.labels.is_empty() {
            let placeholders = vec!["?"; self.labels.len()].join(", ");
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(articles.labels) AS l WHERE l.value IN ({}))",
                placeholders
            ));
            binds.extend(self.labels.iter().cloned().map(BindValue::Text));
        }
        if let Some(from) = self.date_from {
            clauses.push("COALESCE(published, created_at) >= ?".to_string());
            binds.push(BindValue::Text(format_timestamp(&day_start(from))));
        }
        if let Some(upper) = self.upper_bound() {
            clauses.push("COALESCE(published, created_at) < ?".to_string());
            binds.push(BindValue::Text(format_timestamp(&upper)));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM articles{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            ARTICLE_COLUMNS, where_clause
        );
        binds.push(BindValue::Integer(i64::from(self.limit)));
        binds.push(BindValue::Integer(self.offset() as i64));

        QueryPlan { sql, binds }
    }
}

/// One page of the article listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticlePage {
    pub items: Vec<Article>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArticlePage {
    pub fn from_items(query: &ArticleQuery, items: Vec<Article>) -> Self {
        Self {
            total: items.len(),
            items,
            page: query.page,
            limit: query.limit,
            error: None,
        }
    }

    /// Page returned when the query itself failed; `items` stays present.
    pub fn failed(query: &ArticleQuery, message: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: query.page,
            limit: query.limit,
            error: Some(message.into()),
        }
    }
}
