use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::category::{CategoryVocabulary, UNCATEGORIZED};
use crate::{Error, Result};

pub type ArticleId = i64;
pub type TopicId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub url: String,
    pub source: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(rename = "thumbnailUrl", alias = "thumbnail_url", default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: DateTime<Utc>,
}

impl Article {
    /// Timestamp used for date-range filtering.
    pub fn effective_published(&self) -> DateTime<Utc> {
        self.published.unwrap_or(self.created_at)
    }
}

/// An article as submitted by the crawler or the manual-insert form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default, alias = "thumbnailUrl")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    /// Only set by importers replaying history; the store assigns "now" otherwise.
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

pub const MANUAL_SOURCE: &str = "手動追加";

impl NewArticle {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn source_or_default(&self) -> &str {
        match self.source.as_deref() {
            Some(source) if !source.trim().is_empty() => source,
            _ => MANUAL_SOURCE,
        }
    }
}

/// Digest header as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub title: String,
    #[serde(default)]
    pub monthly_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub id: TopicId,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&Topic> for TopicSummary {
    fn from(topic: &Topic) -> Self {
        Self {
            id: topic.id,
            title: topic.title.clone(),
            updated_at: topic.updated_at,
        }
    }
}

/// An article as it participates in one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicArticle {
    #[serde(flatten)]
    pub article: Article,
    #[serde(rename = "displayOrder")]
    pub display_order: usize,
    #[serde(rename = "categoryMajor", default)]
    pub category_major: Option<String>,
    #[serde(rename = "categoryMinor", default, deserialize_with = "nullable_set")]
    pub category_minor: BTreeSet<String>,
}

impl TopicArticle {
    pub fn new(article: Article, display_order: usize) -> Self {
        Self {
            article,
            display_order,
            category_major: None,
            category_minor: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> ArticleId {
        self.article.id
    }
}

/// A topic header together with its ordered members, as returned by a load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    #[serde(flatten)]
    pub topic: Topic,
    pub articles: Vec<TopicArticle>,
}

/// Persistence payload for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicPayload {
    pub title: String,
    #[serde(default)]
    pub monthly_summary: Option<String>,
    #[serde(default, alias = "members")]
    pub articles: Vec<MemberRow>,
}

impl TopicPayload {
    /// Server-side check of a create/update body. Rows come back sorted by
    /// display order and renumbered densely from 0.
    pub fn validated(mut self, vocabulary: &CategoryVocabulary) -> Result<Self> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("title is required"));
        }
        let mut seen = BTreeSet::new();
        for row in &self.articles {
            if !seen.insert(row.article_id) {
                return Err(Error::validation(format!(
                    "article {} appears more than once",
                    row.article_id
                )));
            }
            vocabulary.validate(Some(row.category_main.as_str()), &row.category_sub)?;
        }
        let mut orders = BTreeSet::new();
        if let Some(row) = self.articles.iter().find(|row| !orders.insert(row.display_order)) {
            return Err(Error::validation(format!(
                "display_order {} is used twice",
                row.display_order
            )));
        }
        self.articles.sort_by_key(|row| row.display_order);
        for (order, row) in self.articles.iter_mut().enumerate() {
            row.display_order = order;
            row.category_main = row.major().unwrap_or_else(|| UNCATEGORIZED.to_string());
        }
        self.monthly_summary = self.monthly_summary.filter(|s| !s.is_empty());
        Ok(self)
    }
}

/// One join row between a topic and an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRow {
    pub article_id: ArticleId,
    pub display_order: usize,
    pub category_main: String,
    #[serde(default, deserialize_with = "nullable_set")]
    pub category_sub: BTreeSet<String>,
}

impl MemberRow {
    /// In-memory form of the major category: `未分類` and blanks become `None`.
    pub fn major(&self) -> Option<String> {
        normalize_major(Some(self.category_main.as_str()))
    }
}

/// A major/minor category pair, as patched by the operator or produced by the
/// pipeline classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    #[serde(
        rename = "category_main",
        alias = "main",
        alias = "categoryMajor",
        default,
        serialize_with = "major_or_uncategorized"
    )]
    pub major: Option<String>,
    #[serde(
        rename = "category_sub",
        alias = "sub",
        alias = "categoryMinor",
        default,
        deserialize_with = "nullable_set"
    )]
    pub minor: BTreeSet<String>,
}

impl CategoryAssignment {
    pub fn new<I, S>(major: Option<&str>, minor: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            major: normalize_major(major),
            minor: minor.into_iter().map(Into::into).collect(),
        }
    }

    pub fn uncategorized() -> Self {
        Self::default()
    }
}

pub fn normalize_major(major: Option<&str>) -> Option<String> {
    match major.map(str::trim) {
        None | Some("") => None,
        Some(value) if value == UNCATEGORIZED => None,
        Some(value) => Some(value.to_string()),
    }
}

fn major_or_uncategorized<S: Serializer>(
    major: &Option<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(major.as_deref().unwrap_or(UNCATEGORIZED))
}

fn nullable_set<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<BTreeSet<String>>::deserialize(deserializer)?.unwrap_or_default())
}
