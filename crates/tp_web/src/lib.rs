use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/articles",
            get(handlers::list_articles)
                .post(handlers::create_article)
                .delete(handlers::delete_articles),
        )
        .route("/api/articles/labels", get(handlers::list_labels))
        .route(
            "/api/articles/:id",
            get(handlers::get_article).delete(handlers::delete_article),
        )
        .route(
            "/api/topics",
            get(handlers::list_topics).post(handlers::create_topic),
        )
        .route(
            "/api/topics/:id",
            get(handlers::get_topic)
                .put(handlers::update_topic)
                .delete(handlers::delete_topic),
        )
        .route(
            "/api/topics/:id/article/:article_id/category",
            patch(handlers::update_category),
        )
        .route(
            "/api/topics/:id/article/:article_id/categorize",
            post(handlers::categorize_article),
        )
        .route("/api/topics/:id/summary", post(handlers::generate_summary))
        .route("/api/topics/:id/export", post(handlers::export_topic))
        .route("/api/crawl", post(handlers::crawl))
        .route("/api/summarize", post(handlers::summarize))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(Arc::new(state))
}

/// Serves `app` on `bind` until ctrl-c.
pub async fn serve(app: Router, bind: &str) -> tp_core::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

pub mod prelude {
    pub use crate::{create_app, serve, AppState};
    pub use tp_core::{Error, Result};
}
