//! Shared application state for the HTTP surface.

use std::sync::Arc;

use garden_core::Config;
use garden_db::DbPool;
use garden_search::{AdvancedSearch, EmbeddingClient, EmbeddingProvider, LlmClient, UnifiedSearch};
use garden_sync::{CliGit, LogseqSync};

pub struct AppState {
    pub search: UnifiedSearch,
    pub advanced: AdvancedSearch,
    pub sync: LogseqSync,
}

impl AppState {
    pub fn new(config: &Config, db: &DbPool) -> Arc<Self> {
        let settings = &config.settings;
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(EmbeddingClient::new(&settings.providers));
        let model = Arc::new(LlmClient::new(&settings.providers));

        let search = UnifiedSearch::new(db, settings.search.clone(), Some(embedder.clone()));
        let advanced = AdvancedSearch::new(
            db,
            embedder,
            model,
            &settings.search.default_strategy,
        );
        let git = Arc::new(CliGit::new(
            &settings.logseq.root,
            settings.logseq.push_enabled,
        ));
        let sync = LogseqSync::new(db, settings.logseq.clone(), git);

        Arc::new(Self {
            search,
            advanced,
            sync,
        })
    }
}
