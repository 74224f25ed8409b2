use async_trait::async_trait;
use std::sync::Arc;
use tp_core::config::StorageConfig;
use tp_core::{Error, Result, Storage};

pub mod backends;

pub use backends::*;

#[async_trait]
pub trait StorageBackend: Storage + Sized + 'static {
    fn get_error_message() -> &'static str;
    async fn open(config: &StorageConfig) -> Result<Self>;
}

async fn open_backend<B: StorageBackend>(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    match B::open(config).await {
        Ok(backend) => {
            tracing::info!(backend = %config.backend, "storage opened");
            Ok(Arc::new(backend))
        }
        Err(e) => {
            tracing::error!(backend = %config.backend, error = %e, "{}", B::get_error_message());
            Err(e)
        }
    }
}

/// Opens the backend named by `storage.backend`.
pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    match config.backend.as_str() {
        "memory" => open_backend::<InMemoryStorage>(config).await,
        #[cfg(feature = "sqlite")]
        "sqlite" => open_backend::<SQLiteStorage>(config).await,
        other => Err(Error::Config(format!(
            "Storage backend '{}' is not available in this build",
            other
        ))),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageBackend};
}
