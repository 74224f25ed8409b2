use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use tp_core::models::{CategorizeRequest, CrawlRequest, MonthlySummaryRequest};
use tp_core::query::{ArticleQuery, RawArticleQuery};
use tp_core::{
    ArticleId, ArticleStorage, NewArticle, Pipeline, Storage, TopicCollection, TopicId, TopicStorage,
};

use crate::logging::Logger;

/// `ID=MAJOR[:MINOR,MINOR..]`, e.g. `12=市場動向:AI,決算`.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryArg {
    pub article_id: ArticleId,
    pub major: String,
    pub minor: BTreeSet<String>,
}

pub fn parse_category(value: &str) -> std::result::Result<CategoryArg, String> {
    let (id, rest) = value
        .split_once('=')
        .ok_or_else(|| format!("expected ID=MAJOR[:MINOR,..], got {:?}", value))?;
    let article_id = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid article id {:?}", id))?;
    let (major, minor) = rest.split_once(':').unwrap_or((rest, ""));
    Ok(CategoryArg {
        article_id,
        major: major.trim().to_string(),
        minor: minor
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

/// `ID:POSITION`, e.g. `12:0`.
pub fn parse_move(value: &str) -> std::result::Result<(ArticleId, usize), String> {
    let (id, position) = value
        .split_once(':')
        .ok_or_else(|| format!("expected ID:POSITION, got {:?}", value))?;
    let id = id.trim().parse().map_err(|_| format!("invalid article id {:?}", id))?;
    let position = position
        .trim()
        .parse()
        .map_err(|_| format!("invalid position {:?}", position))?;
    Ok((id, position))
}

/// Edits applied to a loaded collection, in field order.
#[derive(Debug, Clone, Default)]
pub struct TopicEdits {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub add: Vec<ArticleId>,
    pub remove: Vec<ArticleId>,
    pub up: Vec<ArticleId>,
    pub down: Vec<ArticleId>,
    pub moves: Vec<(ArticleId, usize)>,
    pub categories: Vec<CategoryArg>,
}

pub async fn apply_edits(
    collection: &mut TopicCollection,
    edits: &TopicEdits,
    storage: &dyn Storage,
) -> Result<()> {
    if let Some(title) = &edits.title {
        collection.set_title(title.clone());
    }
    if let Some(summary) = &edits.summary {
        collection.set_summary(summary.clone());
    }
    let mut candidates = Vec::with_capacity(edits.add.len());
    for id in &edits.add {
        let article = storage
            .get_article(*id)
            .await?
            .with_context(|| format!("article {} does not exist", id))?;
        candidates.push(article);
    }
    collection.add_articles(candidates);
    for id in &edits.remove {
        collection.remove_article(*id);
    }
    for id in &edits.up {
        collection.move_up(*id);
    }
    for id in &edits.down {
        collection.move_down(*id);
    }
    for (id, position) in &edits.moves {
        collection.move_to(*id, *position);
    }
    for category in &edits.categories {
        collection.set_category(category.article_id, Some(category.major.as_str()), &category.minor)?;
    }
    Ok(())
}

pub async fn list_articles(storage: &dyn Storage, raw: RawArticleQuery) -> Result<()> {
    let query = ArticleQuery::from_raw(raw)?;
    let items = storage.query_articles(&query).await?;
    for article in &items {
        let labels = article.labels.iter().cloned().collect::<Vec<_>>().join(",");
        println!(
            "{:>6}  {}  {:<16}  {}  [{}]",
            article.id,
            article.effective_published().format("%Y-%m-%d"),
            article.source,
            article.title,
            labels
        );
    }
    println!("-- page {} ({} items, limit {})", query.page, items.len(), query.limit);
    Ok(())
}

pub async fn import_articles(storage: &dyn Storage, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let articles: Vec<NewArticle> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of articles", path.display()))?;
    let outcome = storage.store_articles(&articles).await?;
    let logger = Logger::new().with_prefix("[import]");
    logger.info(&format!("{} inserted, {} skipped", outcome.inserted, outcome.skipped));
    if outcome.skipped > 0 {
        logger.warn("Skipped articles whose url is already stored");
    }
    Ok(())
}

pub async fn show_topic(storage: &dyn Storage, mut collection: TopicCollection, id: TopicId) -> Result<()> {
    collection.load(id, storage).await?;
    println!("#{} {}", id, collection.title());
    if let Some(summary) = collection.summary() {
        println!("{}", summary);
    }
    for member in collection.members() {
        let minor = member
            .category_minor
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:>3}. [{}] {{{}}} {} ({})",
            member.display_order,
            member.category_major.as_deref().unwrap_or(tp_core::UNCATEGORIZED),
            minor,
            member.article.title,
            member.id()
        );
    }
    Ok(())
}

/// Loads `id` (or starts a new topic), applies the edits and saves.
pub async fn edit_topic(
    storage: &dyn Storage,
    mut collection: TopicCollection,
    id: Option<TopicId>,
    edits: &TopicEdits,
) -> Result<TopicId> {
    if let Some(id) = id {
        collection.load(id, storage).await?;
    }
    apply_edits(&mut collection, edits, storage).await?;
    if !collection.is_dirty() {
        if let Some(id) = collection.id() {
            Logger::new().with_prefix("[topics]").info("Nothing to save");
            return Ok(id);
        }
    }
    let saved = collection.save(storage).await?;
    Logger::new()
        .with_prefix("[topics]")
        .info(&format!("Saved topic {} ({} articles)", saved, collection.len()));
    Ok(saved)
}

pub async fn categorize_member(
    storage: &dyn Storage,
    pipeline: &dyn Pipeline,
    mut collection: TopicCollection,
    topic_id: TopicId,
    article_id: ArticleId,
) -> Result<()> {
    collection.load(topic_id, storage).await?;
    let Some(member) = collection.member(article_id) else {
        bail!("article {} is not in topic {}", article_id, topic_id);
    };
    let assignment = pipeline
        .categorize(&CategorizeRequest::from(&member.article))
        .await?;
    collection.apply_categorization(article_id, assignment)?;
    collection.save(storage).await?;
    if let Some(member) = collection.member(article_id) {
        println!(
            "{} -> {}",
            article_id,
            member.category_major.as_deref().unwrap_or(tp_core::UNCATEGORIZED)
        );
    }
    Ok(())
}

pub async fn summarize_topic(
    storage: &dyn Storage,
    pipeline: &dyn Pipeline,
    mut collection: TopicCollection,
    topic_id: TopicId,
) -> Result<()> {
    let record = storage
        .get_topic(topic_id)
        .await?
        .with_context(|| format!("topic {} does not exist", topic_id))?;
    let summary = pipeline
        .monthly_summary(&MonthlySummaryRequest::from(&record))
        .await?;
    collection.load(topic_id, storage).await?;
    collection.set_summary(summary.clone());
    collection.save(storage).await?;
    println!("{}", summary);
    Ok(())
}

pub async fn export_topic(storage: &dyn Storage, topic_id: TopicId, output: Option<&Path>) -> Result<()> {
    let record = storage
        .get_topic(topic_id)
        .await?
        .with_context(|| format!("topic {} does not exist", topic_id))?;
    let html = tp_core::export::render_topic_html(&record, chrono::Local::now().date_naive());
    match output {
        Some(path) => {
            std::fs::write(path, html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Logger::new()
                .with_prefix("[export]")
                .info(&format!("Wrote {}", path.display()));
        }
        None => print!("{}", html),
    }
    Ok(())
}

pub async fn crawl(pipeline: &dyn Pipeline, request: CrawlRequest) -> Result<()> {
    if request.end_date.is_some_and(|end| end < request.start_date) {
        bail!("--end-date must not precede --start-date");
    }
    let result = pipeline.crawl(&request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn summarize_batch(pipeline: &dyn Pipeline, limit: u32) -> Result<()> {
    let result = pipeline.summarize_batch(limit).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
