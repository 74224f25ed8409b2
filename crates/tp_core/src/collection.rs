//! In-session model of one TOPICS digest.
//!
//! A [`TopicCollection`] owns the member articles of a digest, their display
//! order and their categories for the duration of one edit session. It is
//! constructed per session and never shared.
//!
//! Invariant: member `display_order` values are exactly `0..len()`, in the
//! order the members are held.
//!
//! Loading and saving come in two forms. [`TopicCollection::load`] and
//! [`TopicCollection::save`] drive a [`TopicStorage`] directly. Event-driven
//! callers use the split form (`begin_*` then `apply_loaded`/`finish_save`):
//! every request carries a [`SessionTicket`], and responses whose ticket
//! predates the last [`TopicCollection::reset`] or applied load are ignored.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::category::{CategoryVocabulary, UNCATEGORIZED};
use crate::storage::TopicStorage;
use crate::types::{
    normalize_major, Article, ArticleId, CategoryAssignment, MemberRow, Topic, TopicArticle,
    TopicId, TopicPayload, TopicRecord,
};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// New, unsaved and untouched.
    Empty,
    /// Matches the persisted copy.
    Loaded,
    /// Has unsaved edits.
    Dirty,
    Saving,
    /// The last save failed; edits are preserved.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub ticket: SessionTicket,
    /// `None` creates a new topic.
    pub id: Option<TopicId>,
    pub payload: TopicPayload,
}

#[derive(Debug, Clone)]
pub struct TopicCollection {
    vocabulary: Arc<CategoryVocabulary>,
    id: Option<TopicId>,
    title: String,
    summary: Option<String>,
    members: Vec<TopicArticle>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    state: SessionState,
    last_error: Option<String>,
    generation: u64,
}

impl Default for TopicCollection {
    fn default() -> Self {
        Self::new(Arc::new(CategoryVocabulary::default()))
    }
}

impl TopicCollection {
    pub fn new(vocabulary: Arc<CategoryVocabulary>) -> Self {
        Self {
            vocabulary,
            id: None,
            title: String::new(),
            summary: None,
            members: Vec::new(),
            created_at: None,
            updated_at: None,
            state: SessionState::Empty,
            last_error: None,
            generation: 0,
        }
    }

    pub fn id(&self) -> Option<TopicId> {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn members(&self) -> &[TopicArticle] {
        &self.members
    }

    pub fn member(&self, id: ArticleId) -> Option<&TopicArticle> {
        self.members.iter().find(|m| m.id() == id)
    }

    pub fn contains(&self, id: ArticleId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_dirty(&self) -> bool {
        matches!(
            self.state,
            SessionState::Dirty | SessionState::Saving | SessionState::Failed(_)
        )
    }

    /// Human-readable message of the last failed operation.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn position(&self, id: ArticleId) -> Option<usize> {
        self.members.iter().position(|m| m.id() == id)
    }

    fn touch(&mut self) {
        self.state = SessionState::Dirty;
    }

    fn renumber(&mut self) {
        for (order, member) in self.members.iter_mut().enumerate() {
            member.display_order = order;
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.last_error = Some(err.to_string());
        err
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    pub fn set_summary(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.summary = if text.is_empty() { None } else { Some(text) };
        self.touch();
    }

    /// Append the candidates that are not members yet, in the given order.
    /// Returns how many were added.
    pub fn add_articles<I>(&mut self, candidates: I) -> usize
    where
        I: IntoIterator<Item = Article>,
    {
        let mut seen: HashSet<ArticleId> = self.members.iter().map(TopicArticle::id).collect();
        let before = self.members.len();
        for article in candidates {
            if seen.insert(article.id) {
                let order = self.members.len();
                self.members.push(TopicArticle::new(article, order));
            }
        }
        let added = self.members.len() - before;
        if added > 0 {
            self.touch();
        }
        added
    }

    /// Drop a member and close the gap. Unknown ids are ignored.
    pub fn remove_article(&mut self, id: ArticleId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.members.remove(index);
                self.renumber();
                self.touch();
                true
            }
            None => false,
        }
    }

    pub fn move_up(&mut self, id: ArticleId) -> bool {
        match self.position(id) {
            Some(index) if index > 0 => {
                self.members.swap(index, index - 1);
                self.renumber();
                self.touch();
                true
            }
            _ => false,
        }
    }

    pub fn move_down(&mut self, id: ArticleId) -> bool {
        match self.position(id) {
            Some(index) if index + 1 < self.members.len() => {
                self.members.swap(index, index + 1);
                self.renumber();
                self.touch();
                true
            }
            _ => false,
        }
    }

    /// Move a member to an absolute position, shifting the members in
    /// between. Positions past the end clamp to the last slot.
    pub fn move_to(&mut self, id: ArticleId, new_order: usize) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let target = new_order.min(self.members.len() - 1);
        if target == index {
            return false;
        }
        let member = self.members.remove(index);
        self.members.insert(target, member);
        self.renumber();
        self.touch();
        true
    }

    /// Set both category levels of a member. Values outside the vocabulary
    /// are rejected and leave the member untouched.
    pub fn set_category(
        &mut self,
        id: ArticleId,
        major: Option<&str>,
        minor: &BTreeSet<String>,
    ) -> Result<()> {
        let assignment = self.vocabulary.validate(major, minor).map_err(|e| self.fail(e))?;
        let index = self
            .position(id)
            .ok_or_else(|| Error::not_found(format!("article {} is not in this topic", id)))
            .map_err(|e| self.fail(e))?;
        let member = &mut self.members[index];
        member.category_major = assignment.major;
        member.category_minor = assignment.minor;
        self.touch();
        Ok(())
    }

    /// Write back a classifier result. Values outside the vocabulary are dropped.
    pub fn apply_categorization(&mut self, id: ArticleId, assignment: CategoryAssignment) -> Result<()> {
        let clean = self.vocabulary.sanitize(assignment.clone());
        if clean != assignment {
            warn!(
                "Dropped categories outside the vocabulary for article {}: {:?}",
                id, assignment
            );
        }
        self.set_category(id, clean.major.as_deref(), &clean.minor)
    }

    /// Persistence payload: header plus one row per member in display order.
    pub fn serialize(&self) -> TopicPayload {
        TopicPayload {
            title: self.title.clone(),
            monthly_summary: self.summary.clone(),
            articles: self
                .members
                .iter()
                .map(|member| MemberRow {
                    article_id: member.id(),
                    display_order: member.display_order,
                    category_main: member
                        .category_major
                        .clone()
                        .unwrap_or_else(|| UNCATEGORIZED.to_string()),
                    category_sub: member.category_minor.clone(),
                })
                .collect(),
        }
    }

    pub fn begin_load(&self) -> SessionTicket {
        SessionTicket {
            generation: self.generation,
        }
    }

    /// Replace all state, unsaved edits included, with a persisted topic.
    /// Returns `false` when the ticket predates a reset or another load.
    /// Tickets issued before this call go stale.
    pub fn apply_loaded(&mut self, ticket: SessionTicket, record: TopicRecord) -> bool {
        if ticket.generation != self.generation {
            debug!("Ignoring topic {} loaded for a closed session", record.topic.id);
            return false;
        }
        self.generation += 1;
        let TopicRecord { topic, mut articles } = record;
        articles.sort_by_key(|m| m.display_order);
        for member in &mut articles {
            member.category_major = normalize_major(member.category_major.as_deref());
        }
        self.id = Some(topic.id);
        self.title = topic.title;
        self.summary = topic.monthly_summary.filter(|s| !s.is_empty());
        self.created_at = Some(topic.created_at);
        self.updated_at = Some(topic.updated_at);
        self.members = articles;
        self.renumber();
        self.state = SessionState::Loaded;
        self.last_error = None;
        true
    }

    pub async fn load<S>(&mut self, topic_id: TopicId, store: &S) -> Result<()>
    where
        S: TopicStorage + ?Sized,
    {
        let ticket = self.begin_load();
        match store.get_topic(topic_id).await {
            Ok(Some(record)) => {
                if self.apply_loaded(ticket, record) {
                    info!("Loaded topic {} with {} articles", topic_id, self.members.len());
                }
                Ok(())
            }
            Ok(None) => Err(self.fail(Error::not_found(format!("topic {} does not exist", topic_id)))),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Validate and snapshot the session for persistence. An empty title
    /// fails here, before any store is contacted.
    pub fn begin_save(&mut self) -> Result<SaveRequest> {
        if self.title.trim().is_empty() {
            return Err(self.fail(Error::validation("タイトルは必須です。")));
        }
        self.state = SessionState::Saving;
        self.last_error = None;
        Ok(SaveRequest {
            ticket: SessionTicket {
                generation: self.generation,
            },
            id: self.id,
            payload: self.serialize(),
        })
    }

    /// Apply the store's answer to a [`SaveRequest`]. Edits made while the
    /// save was in flight keep the session dirty.
    pub fn finish_save(&mut self, ticket: SessionTicket, outcome: Result<Topic>) -> Result<()> {
        if ticket.generation != self.generation {
            debug!("Ignoring save response for a closed session");
            return Ok(());
        }
        let in_flight = self.state == SessionState::Saving;
        match outcome {
            Ok(topic) => {
                self.id = Some(topic.id);
                self.created_at = Some(topic.created_at);
                self.updated_at = Some(topic.updated_at);
                if in_flight {
                    self.state = SessionState::Loaded;
                }
                info!("Saved topic {} ({} articles)", topic.id, self.members.len());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to save topic: {}", e);
                if in_flight {
                    self.state = SessionState::Failed(e.to_string());
                }
                Err(self.fail(e))
            }
        }
    }

    /// Create or update the persisted topic and adopt its identity.
    pub async fn save<S>(&mut self, store: &S) -> Result<TopicId>
    where
        S: TopicStorage + ?Sized,
    {
        let request = self.begin_save()?;
        let outcome = match request.id {
            None => store.create_topic(&request.payload).await,
            Some(id) => store.update_topic(id, &request.payload).await,
        };
        self.finish_save(request.ticket, outcome)?;
        self.id
            .ok_or_else(|| Error::Storage("store returned no topic id".to_string()))
    }

    /// Back to the new, unsaved, empty baseline. In-flight responses for the
    /// previous session are ignored afterwards.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self::new(self.vocabulary.clone());
        self.generation = generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TopicStorage;
    use crate::types::TopicSummary;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn article(id: ArticleId) -> Article {
        Article {
            id,
            title: format!("記事 {}", id),
            url: format!("https://example.com/{}", id),
            source: "EE Times Japan".to_string(),
            summary: Some("要約".to_string()),
            labels: ["半導体".to_string()].into_iter().collect(),
            thumbnail_url: None,
            published: None,
            created_at: Utc::now(),
        }
    }

    fn orders(collection: &TopicCollection) -> Vec<usize> {
        collection.members().iter().map(|m| m.display_order).collect()
    }

    fn ids(collection: &TopicCollection) -> Vec<ArticleId> {
        collection.members().iter().map(|m| m.id()).collect()
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    /// Keeps topics in a map and counts calls.
    #[derive(Default)]
    struct RecordingStore {
        articles: HashMap<ArticleId, Article>,
        topics: Mutex<HashMap<TopicId, (Topic, TopicPayload)>>,
        calls: Mutex<usize>,
        fail_writes: bool,
    }

    impl RecordingStore {
        fn with_articles(ids: &[ArticleId]) -> Self {
            Self {
                articles: ids.iter().map(|id| (*id, article(*id))).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn write(&self, id: Option<TopicId>, payload: &TopicPayload) -> Result<Topic> {
            *self.calls.lock().unwrap() += 1;
            if self.fail_writes {
                return Err(Error::Transport("connection refused".to_string()));
            }
            let mut topics = self.topics.lock().unwrap();
            let id = id.unwrap_or(topics.len() as TopicId + 1);
            let now = Utc::now();
            let topic = Topic {
                id,
                title: payload.title.clone(),
                monthly_summary: payload.monthly_summary.clone(),
                created_at: now,
                updated_at: now,
            };
            topics.insert(id, (topic.clone(), payload.clone()));
            Ok(topic)
        }
    }

    #[async_trait]
    impl TopicStorage for RecordingStore {
        async fn list_topics(&self, _search: Option<&str>) -> Result<Vec<TopicSummary>> {
            Ok(Vec::new())
        }

        async fn get_topic(&self, id: TopicId) -> Result<Option<TopicRecord>> {
            *self.calls.lock().unwrap() += 1;
            let topics = self.topics.lock().unwrap();
            Ok(topics.get(&id).map(|(topic, payload)| TopicRecord {
                topic: topic.clone(),
                articles: payload
                    .articles
                    .iter()
                    .rev()
                    .map(|row| TopicArticle {
                        article: self.articles[&row.article_id].clone(),
                        display_order: row.display_order,
                        category_major: Some(row.category_main.clone()),
                        category_minor: row.category_sub.clone(),
                    })
                    .collect(),
            }))
        }

        async fn create_topic(&self, payload: &TopicPayload) -> Result<Topic> {
            self.write(None, payload)
        }

        async fn update_topic(&self, id: TopicId, payload: &TopicPayload) -> Result<Topic> {
            self.write(Some(id), payload)
        }

        async fn delete_topic(&self, _id: TopicId) -> Result<bool> {
            Ok(false)
        }

        async fn update_member_category(
            &self,
            _topic_id: TopicId,
            _article_id: ArticleId,
            _assignment: &CategoryAssignment,
        ) -> Result<()> {
            Ok(())
        }

        async fn set_monthly_summary(&self, _topic_id: TopicId, _summary: &str) -> Result<Topic> {
            Err(Error::not_found("unused"))
        }
    }

    #[test]
    fn test_add_skips_existing_and_duplicate_candidates() {
        let mut collection = TopicCollection::default();
        collection.add_articles([article(1)]);
        collection
            .set_category(1, Some("市場動向"), &set(&["AI"]))
            .unwrap();

        let added = collection.add_articles([article(1), article(1), article(2)]);

        assert_eq!(added, 1);
        assert_eq!(ids(&collection), vec![1, 2]);
        let first = collection.member(1).unwrap();
        assert_eq!(first.display_order, 0);
        assert_eq!(first.category_major.as_deref(), Some("市場動向"));
        let second = collection.member(2).unwrap();
        assert_eq!(second.display_order, 1);
        assert_eq!(second.category_major, None);
        assert!(second.category_minor.is_empty());
    }

    #[test]
    fn test_remove_renumbers_preserving_sequence() {
        let mut collection = TopicCollection::default();
        collection.add_articles((1..=4).map(article));

        assert!(collection.remove_article(2));
        assert_eq!(ids(&collection), vec![1, 3, 4]);
        assert_eq!(orders(&collection), vec![0, 1, 2]);

        assert!(!collection.remove_article(99));
        assert_eq!(orders(&collection), vec![0, 1, 2]);
    }

    #[test]
    fn test_move_boundaries_are_no_ops() {
        let mut collection = TopicCollection::default();
        collection.add_articles((1..=3).map(article));
        let before = collection.members().to_vec();

        assert!(!collection.move_up(1));
        assert!(!collection.move_down(3));
        assert!(!collection.move_up(42));
        assert_eq!(collection.members(), before.as_slice());
    }

    #[test]
    fn test_move_swaps_adjacent_members() {
        let mut collection = TopicCollection::default();
        collection.add_articles((1..=3).map(article));

        assert!(collection.move_down(1));
        assert_eq!(ids(&collection), vec![2, 1, 3]);
        assert!(collection.move_up(3));
        assert_eq!(ids(&collection), vec![2, 3, 1]);
        assert_eq!(orders(&collection), vec![0, 1, 2]);
    }

    #[test]
    fn test_move_to_shifts_members_in_between() {
        let mut collection = TopicCollection::default();
        collection.add_articles((1..=5).map(article));

        assert!(collection.move_to(5, 1));
        assert_eq!(ids(&collection), vec![1, 5, 2, 3, 4]);
        assert!(collection.move_to(1, 100));
        assert_eq!(ids(&collection), vec![5, 2, 3, 4, 1]);
        assert_eq!(orders(&collection), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_order_stays_dense_under_mixed_operations() {
        let mut collection = TopicCollection::default();
        collection.add_articles((1..=6).map(article));
        collection.remove_article(3);
        collection.move_down(1);
        collection.add_articles([article(7), article(2)]);
        collection.move_to(7, 0);
        collection.remove_article(6);
        collection.move_up(4);

        let n = collection.len();
        assert_eq!(orders(&collection), (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn test_set_category_validates_values_and_membership() {
        let mut collection = TopicCollection::default();
        collection.add_articles([article(1)]);

        let err = collection.set_category(1, Some("スポーツ"), &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(collection.member(1).unwrap().category_major, None);
        assert!(collection.last_error().is_some());

        let err = collection.set_category(9, None, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        collection.set_category(1, Some("未分類"), &set(&["メモリ"])).unwrap();
        let member = collection.member(1).unwrap();
        assert_eq!(member.category_major, None);
        assert_eq!(member.category_minor, set(&["メモリ"]));
    }

    #[test]
    fn test_apply_categorization_drops_unknown_values() {
        let mut collection = TopicCollection::default();
        collection.add_articles([article(1)]);
        collection
            .apply_categorization(1, CategoryAssignment::new(Some("ダミー大カテゴリ"), ["決算", "謎"]))
            .unwrap();
        let member = collection.member(1).unwrap();
        assert_eq!(member.category_major, None);
        assert_eq!(member.category_minor, set(&["決算"]));
    }

    #[test]
    fn test_serialize_defaults_missing_major() {
        let mut collection = TopicCollection::default();
        collection.set_title("2025年5月 半導体TOPICS");
        collection.add_articles([article(10), article(11)]);
        collection.set_category(11, Some("材料"), &set(&["プロセス"])).unwrap();
        collection.move_up(11);

        let payload = collection.serialize();
        assert_eq!(payload.title, "2025年5月 半導体TOPICS");
        assert_eq!(payload.articles.len(), 2);
        assert_eq!(payload.articles[0].article_id, 11);
        assert_eq!(payload.articles[0].display_order, 0);
        assert_eq!(payload.articles[0].category_main, "材料");
        assert_eq!(payload.articles[1].category_main, "未分類");
        assert!(payload.articles[1].category_sub.is_empty());
    }

    #[test]
    fn test_state_transitions() {
        let mut collection = TopicCollection::default();
        assert_eq!(collection.state(), &SessionState::Empty);
        collection.move_up(1);
        assert_eq!(collection.state(), &SessionState::Empty);
        collection.add_articles([article(1)]);
        assert_eq!(collection.state(), &SessionState::Dirty);
    }

    #[tokio::test]
    async fn test_empty_title_blocks_the_store() {
        let store = RecordingStore::with_articles(&[1]);
        let mut collection = TopicCollection::default();
        collection.add_articles([article(1)]);
        collection.set_title("   ");

        let err = collection.save(&store).await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.calls(), 0);
        assert_eq!(collection.state(), &SessionState::Dirty);
        assert_eq!(collection.id(), None);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let store = RecordingStore::with_articles(&[1, 2, 3]);
        let mut collection = TopicCollection::default();
        collection.set_title("5月号");
        collection.set_summary("今月は需要回復が鮮明になった。");
        collection.add_articles((1..=3).map(article));
        collection.set_category(2, Some("市場動向"), &set(&["メモリ", "決算"])).unwrap();
        collection.move_to(3, 0);

        let id = collection.save(&store).await.unwrap();
        assert_eq!(collection.state(), &SessionState::Loaded);
        assert_eq!(collection.id(), Some(id));

        let mut reloaded = TopicCollection::default();
        reloaded.load(id, &store).await.unwrap();

        assert_eq!(reloaded.title(), "5月号");
        assert_eq!(reloaded.summary(), collection.summary());
        assert_eq!(ids(&reloaded), ids(&collection));
        assert_eq!(orders(&reloaded), vec![0, 1, 2]);
        for member in collection.members() {
            let other = reloaded.member(member.id()).unwrap();
            assert_eq!(other.category_major, member.category_major);
            assert_eq!(other.category_minor, member.category_minor);
        }

        reloaded.set_title("5月号 改訂");
        assert_eq!(reloaded.save(&store).await.unwrap(), id);
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_save_preserves_edits() {
        let store = RecordingStore {
            fail_writes: true,
            ..RecordingStore::with_articles(&[1])
        };
        let mut collection = TopicCollection::default();
        collection.set_title("6月号");
        collection.add_articles([article(1)]);

        let err = collection.save(&store).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(matches!(collection.state(), SessionState::Failed(_)));
        assert!(collection.is_dirty());
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.title(), "6月号");
        assert!(collection.last_error().is_some());
    }

    #[tokio::test]
    async fn test_load_missing_topic_keeps_state() {
        let store = RecordingStore::default();
        let mut collection = TopicCollection::default();
        collection.add_articles([article(1)]);

        let err = collection.load(77, &store).await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.state(), &SessionState::Dirty);
    }

    #[test]
    fn test_late_responses_after_reset_are_ignored() {
        let mut collection = TopicCollection::default();
        collection.set_title("7月号");
        let request = collection.begin_save().unwrap();
        let load_ticket = collection.begin_load();

        collection.reset();

        let now = Utc::now();
        let topic = Topic {
            id: 5,
            title: "7月号".to_string(),
            monthly_summary: None,
            created_at: now,
            updated_at: now,
        };
        collection.finish_save(request.ticket, Ok(topic.clone())).unwrap();
        assert!(!collection.apply_loaded(
            load_ticket,
            TopicRecord {
                topic,
                articles: Vec::new()
            }
        ));
        assert_eq!(collection.id(), None);
        assert_eq!(collection.title(), "");
        assert_eq!(collection.state(), &SessionState::Empty);
    }

    #[test]
    fn test_save_reply_after_load_is_ignored() {
        let mut collection = TopicCollection::default();
        collection.set_title("新規");
        let request = collection.begin_save().unwrap();

        let now = Utc::now();
        let ticket = collection.begin_load();
        assert!(collection.apply_loaded(
            ticket,
            TopicRecord {
                topic: Topic {
                    id: 7,
                    title: "既存7".to_string(),
                    monthly_summary: None,
                    created_at: now,
                    updated_at: now,
                },
                articles: vec![TopicArticle::new(article(1), 0)],
            }
        ));

        collection
            .finish_save(
                request.ticket,
                Ok(Topic {
                    id: 12,
                    title: "新規".to_string(),
                    monthly_summary: None,
                    created_at: now,
                    updated_at: now,
                }),
            )
            .unwrap();
        assert_eq!(collection.id(), Some(7));
        assert_eq!(collection.title(), "既存7");
        assert_eq!(collection.state(), &SessionState::Loaded);

        // A second reply for the same load is stale too.
        assert!(!collection.apply_loaded(
            ticket,
            TopicRecord {
                topic: Topic {
                    id: 8,
                    title: "既存8".to_string(),
                    monthly_summary: None,
                    created_at: now,
                    updated_at: now,
                },
                articles: Vec::new(),
            }
        ));
        assert_eq!(collection.id(), Some(7));
    }

    #[test]
    fn test_edits_during_save_keep_session_dirty() {
        let mut collection = TopicCollection::default();
        collection.set_title("8月号");
        let request = collection.begin_save().unwrap();
        collection.add_articles([article(1)]);

        let now = Utc::now();
        collection
            .finish_save(
                request.ticket,
                Ok(Topic {
                    id: 1,
                    title: "8月号".to_string(),
                    monthly_summary: None,
                    created_at: now,
                    updated_at: now,
                }),
            )
            .unwrap();

        assert_eq!(collection.id(), Some(1));
        assert_eq!(collection.state(), &SessionState::Dirty);
    }
}
