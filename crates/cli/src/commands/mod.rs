//! Subcommand implementations and the shared pipeline wiring.

pub mod analyze;
pub mod config_cmd;
pub mod prompt;

use anyhow::Context;
use querylens_analysis::ContextAnalyzer;
use querylens_config::AppConfig;
use querylens_core::{GuardedModel, MetadataService, SchemaLinker};
use querylens_memory::{InMemoryCatalog, InMemoryFeedbackRepository, MokaCache};
use querylens_prompt::PromptService;
use querylens_providers::build_from_config;
use querylens_telemetry::PerformanceCounters;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// The analyzer and prompt service built from one configuration, sharing
/// a catalog and a set of counters.
pub struct Pipeline {
    pub config: AppConfig,
    pub analyzer: ContextAnalyzer,
    pub prompts: PromptService,
    pub counters: Arc<PerformanceCounters>,
}

impl Pipeline {
    pub fn load(catalog: Option<&Path>) -> anyhow::Result<Self> {
        let config = AppConfig::load().context("failed to load config")?;
        Self::from_config(config, catalog)
    }

    pub fn from_config(config: AppConfig, catalog: Option<&Path>) -> anyhow::Result<Self> {
        let knowledge = config.knowledge().context("failed to load knowledge base")?;
        let catalog_source = match catalog {
            Some(path) => path.display().to_string(),
            None => "sample".to_string(),
        };
        let catalog = Arc::new(match catalog {
            Some(path) => InMemoryCatalog::load_from(path)
                .with_context(|| format!("failed to load catalog {}", path.display()))?,
            None => InMemoryCatalog::sample(),
        });
        let metadata: Arc<dyn MetadataService> = catalog.clone();
        let linker: Arc<dyn SchemaLinker> = catalog;

        let stack = build_from_config(&config.model);
        let counters = Arc::new(PerformanceCounters::new());
        let cache = Arc::new(MokaCache::new(config.analysis.cache_capacity));

        let analyzer = ContextAnalyzer::builder(knowledge, &config)
            .with_model(GuardedModel::new(stack.language.clone(), stack.timeout))
            .with_metadata(metadata.clone())
            .with_linker(linker)
            .with_cache(cache)
            .with_feedback(Arc::new(InMemoryFeedbackRepository::default()))
            .with_counters(counters.clone())
            .build()
            .context("invalid knowledge base")?;

        let mut prompts = PromptService::new(&config)
            .with_metadata(metadata)
            .with_counters(counters.clone());
        if let Some(embeddings) = stack.embeddings {
            prompts = prompts.with_embeddings(embeddings);
        }

        debug!(
            model = %stack.language.name(),
            catalog = %catalog_source,
            "Pipeline ready"
        );

        Ok(Self {
            config,
            analyzer,
            prompts,
            counters,
        })
    }
}
