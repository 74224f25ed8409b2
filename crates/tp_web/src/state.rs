use std::sync::Arc;
use tp_core::{CategoryVocabulary, Pipeline, Storage};

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub pipeline: Arc<dyn Pipeline>,
    pub vocabulary: Arc<CategoryVocabulary>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        pipeline: Arc<dyn Pipeline>,
        vocabulary: Arc<CategoryVocabulary>,
    ) -> Self {
        Self {
            storage,
            pipeline,
            vocabulary,
        }
    }
}
