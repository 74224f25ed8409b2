pub mod category;
pub mod collection;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod query;
pub mod storage;
pub mod types;

pub use category::{CategoryVocabulary, UNCATEGORIZED};
pub use collection::{SessionState, TopicCollection};
pub use error::{Error, Result};
pub use models::Pipeline;
pub use query::{ArticlePage, ArticleQuery, RawArticleQuery};
pub use storage::{ArticleStorage, Storage, TopicStorage};
pub use types::{
    Article, ArticleId, CategoryAssignment, MemberRow, NewArticle, Topic, TopicArticle, TopicId,
    TopicPayload, TopicRecord, TopicSummary,
};
