use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tp_core::config::StorageConfig;
use tp_core::query::ArticleQuery;
use tp_core::storage::{ArticleStorage, TopicStorage};
use tp_core::types::{
    Article, ArticleId, CategoryAssignment, MemberRow, NewArticle, Topic, TopicArticle, TopicId,
    TopicPayload, TopicRecord, TopicSummary,
};
use tp_core::{Error, Result, UNCATEGORIZED};

use crate::StorageBackend;

#[derive(Default)]
pub struct MemoryStore {
    next_article_id: ArticleId,
    next_topic_id: TopicId,
    articles: BTreeMap<ArticleId, Article>,
    topics: BTreeMap<TopicId, Topic>,
    members: BTreeMap<TopicId, Vec<MemberRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn store_article(&mut self, article: &NewArticle) -> Result<ArticleId> {
        if self.articles.values().any(|a| a.url == article.url) {
            return Err(Error::Conflict(format!("url already stored: {}", article.url)));
        }
        self.next_article_id += 1;
        let id = self.next_article_id;
        self.articles.insert(
            id,
            Article {
                id,
                title: article.title.clone(),
                url: article.url.clone(),
                source: article.source_or_default().to_string(),
                summary: article.summary.clone(),
                labels: article.labels.clone(),
                thumbnail_url: article.thumbnail_url.clone(),
                published: article.published,
                created_at: article.created_at.unwrap_or_else(Utc::now),
            },
        );
        Ok(id)
    }

    fn query_articles(&self, query: &ArticleQuery) -> Vec<Article> {
        let matching = self
            .articles
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        query.paginate(matching)
    }

    fn delete_articles(&mut self, ids: &[ArticleId]) -> u64 {
        let mut removed = 0;
        for id in ids {
            if self.articles.remove(id).is_some() {
                removed += 1;
            }
        }
        for rows in self.members.values_mut() {
            rows.retain(|row| !ids.contains(&row.article_id));
        }
        removed
    }

    fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .articles
            .values()
            .flat_map(|a| a.labels.iter())
            .filter(|l| !l.trim().is_empty())
            .cloned()
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }

    fn check_members(&self, payload: &TopicPayload) -> Result<()> {
        match payload
            .articles
            .iter()
            .find(|row| !self.articles.contains_key(&row.article_id))
        {
            Some(row) => Err(Error::not_found(format!("article {}", row.article_id))),
            None => Ok(()),
        }
    }

    fn list_topics(&self, search: Option<&str>) -> Vec<TopicSummary> {
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_lowercase);
        let mut topics: Vec<TopicSummary> = self
            .topics
            .values()
            .filter(|t| match &needle {
                Some(needle) => t.title.to_ascii_lowercase().contains(needle),
                None => true,
            })
            .map(TopicSummary::from)
            .collect();
        topics.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        topics
    }

    fn get_topic(&self, id: TopicId) -> Option<TopicRecord> {
        let topic = self.topics.get(&id)?.clone();
        let mut rows: Vec<&MemberRow> = self
            .members
            .get(&id)
            .map(|rows| rows.iter().collect())
            .unwrap_or_default();
        rows.sort_by_key(|row| row.display_order);
        let articles = rows
            .into_iter()
            .filter_map(|row| {
                let article = self.articles.get(&row.article_id)?.clone();
                Some(TopicArticle {
                    article,
                    display_order: row.display_order,
                    category_major: row.major(),
                    category_minor: row.category_sub.clone(),
                })
            })
            .collect();
        Some(TopicRecord { topic, articles })
    }

    fn create_topic(&mut self, payload: &TopicPayload) -> Result<Topic> {
        self.check_members(payload)?;
        self.next_topic_id += 1;
        let now = Utc::now();
        let topic = Topic {
            id: self.next_topic_id,
            title: payload.title.clone(),
            monthly_summary: payload.monthly_summary.clone(),
            created_at: now,
            updated_at: now,
        };
        self.topics.insert(topic.id, topic.clone());
        self.members.insert(topic.id, payload.articles.clone());
        Ok(topic)
    }

    fn update_topic(&mut self, id: TopicId, payload: &TopicPayload) -> Result<Topic> {
        self.check_members(payload)?;
        let topic = self
            .topics
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("topic {}", id)))?;
        topic.title = payload.title.clone();
        topic.monthly_summary = payload.monthly_summary.clone();
        topic.updated_at = Utc::now();
        let updated = topic.clone();
        self.members.insert(id, payload.articles.clone());
        Ok(updated)
    }

    fn delete_topic(&mut self, id: TopicId) -> bool {
        self.members.remove(&id);
        self.topics.remove(&id).is_some()
    }

    fn update_member_category(
        &mut self,
        topic_id: TopicId,
        article_id: ArticleId,
        assignment: &CategoryAssignment,
    ) -> Result<()> {
        let row = self
            .members
            .get_mut(&topic_id)
            .and_then(|rows| rows.iter_mut().find(|row| row.article_id == article_id))
            .ok_or_else(|| {
                Error::not_found(format!("article {} is not in topic {}", article_id, topic_id))
            })?;
        row.category_main = assignment
            .major
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        row.category_sub = assignment.minor.clone();
        if let Some(topic) = self.topics.get_mut(&topic_id) {
            topic.updated_at = Utc::now();
        }
        Ok(())
    }

    fn set_monthly_summary(&mut self, topic_id: TopicId, summary: &str) -> Result<Topic> {
        let topic = self
            .topics
            .get_mut(&topic_id)
            .ok_or_else(|| Error::not_found(format!("topic {}", topic_id)))?;
        topic.monthly_summary = Some(summary.to_string()).filter(|s| !s.is_empty());
        topic.updated_at = Utc::now();
        Ok(topic.clone())
    }
}

/// Process-local storage. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn open(_config: &StorageConfig) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn store_article(&self, article: &NewArticle) -> Result<ArticleId> {
        let mut store = self.store.write().await;
        store.store_article(article)
    }

    async fn get_article(&self, id: ArticleId) -> Result<Option<Article>> {
        let store = self.store.read().await;
        Ok(store.articles.get(&id).cloned())
    }

    async fn query_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        Ok(store.query_articles(query))
    }

    async fn delete_articles(&self, ids: &[ArticleId]) -> Result<u64> {
        let mut store = self.store.write().await;
        Ok(store.delete_articles(ids))
    }

    async fn labels(&self) -> Result<Vec<String>> {
        let store = self.store.read().await;
        Ok(store.labels())
    }
}

#[async_trait]
impl TopicStorage for InMemoryStorage {
    async fn list_topics(&self, search: Option<&str>) -> Result<Vec<TopicSummary>> {
        let store = self.store.read().await;
        Ok(store.list_topics(search))
    }

    async fn get_topic(&self, id: TopicId) -> Result<Option<TopicRecord>> {
        let store = self.store.read().await;
        Ok(store.get_topic(id))
    }

    async fn create_topic(&self, payload: &TopicPayload) -> Result<Topic> {
        let mut store = self.store.write().await;
        store.create_topic(payload)
    }

    async fn update_topic(&self, id: TopicId, payload: &TopicPayload) -> Result<Topic> {
        let mut store = self.store.write().await;
        store.update_topic(id, payload)
    }

    async fn delete_topic(&self, id: TopicId) -> Result<bool> {
        let mut store = self.store.write().await;
        Ok(store.delete_topic(id))
    }

    async fn update_member_category(
        &self,
        topic_id: TopicId,
        article_id: ArticleId,
        assignment: &CategoryAssignment,
    ) -> Result<()> {
        let mut store = self.store.write().await;
        store.update_member_category(topic_id, article_id, assignment)
    }

    async fn set_monthly_summary(&self, topic_id: TopicId, summary: &str) -> Result<Topic> {
        let mut store = self.store.write().await;
        store.set_monthly_summary(topic_id, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn member(article_id: ArticleId, display_order: usize) -> MemberRow {
        MemberRow {
            article_id,
            display_order,
            category_main: UNCATEGORIZED.to_string(),
            category_sub: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_url_is_conflict() {
        let storage = InMemoryStorage::new();
        let article = NewArticle::new("Test Article", "http://test.com");
        storage.store_article(&article).await.unwrap();
        let err = storage.store_article(&article).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let outcome = storage
            .store_articles(&[article, NewArticle::new("Other", "http://test.com/2")])
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn test_deleting_article_drops_memberships() {
        let storage = InMemoryStorage::new();
        let a = storage.store_article(&NewArticle::new("a", "http://a")).await.unwrap();
        let b = storage.store_article(&NewArticle::new("b", "http://b")).await.unwrap();
        let topic = storage
            .create_topic(&TopicPayload {
                title: "5月号".into(),
                monthly_summary: None,
                articles: vec![member(a, 0), member(b, 1)],
            })
            .await
            .unwrap();

        assert_eq!(storage.delete_articles(&[a, 999]).await.unwrap(), 1);
        let record = storage.get_topic(topic.id).await.unwrap().unwrap();
        let ids: Vec<ArticleId> = record.articles.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec![b]);
    }

    #[tokio::test]
    async fn test_unknown_member_article_is_not_found() {
        let storage = InMemoryStorage::new();
        let err = storage
            .create_topic(&TopicPayload {
                title: "t".into(),
                monthly_summary: None,
                articles: vec![member(42, 0)],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(storage.list_topics(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_category_patch_requires_membership() {
        let storage = InMemoryStorage::new();
        let a = storage.store_article(&NewArticle::new("a", "http://a")).await.unwrap();
        let topic = storage
            .create_topic(&TopicPayload {
                title: "t".into(),
                monthly_summary: None,
                articles: vec![member(a, 0)],
            })
            .await
            .unwrap();

        let assignment = CategoryAssignment::new(Some("材料"), ["AI"]);
        storage
            .update_member_category(topic.id, a, &assignment)
            .await
            .unwrap();
        let record = storage.get_topic(topic.id).await.unwrap().unwrap();
        assert_eq!(record.articles[0].category_major.as_deref(), Some("材料"));

        let err = storage
            .update_member_category(topic.id, a + 1, &assignment)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
