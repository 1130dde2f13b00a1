use std::sync::Arc;

use crate::config::ServerConfig;
use crate::generation::{CommandEngine, Orchestrator, ReportEngine};
use crate::retention::RetentionManager;

/// Shared state handed to every handler through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub retention: Arc<RetentionManager>,
    pub max_upload_bytes: usize,
    pub retention_days: u64,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        max_upload_bytes: usize,
        retention_days: u64,
    ) -> Self {
        let retention = RetentionManager::new(&orchestrator.config().output_dir);
        Self {
            orchestrator: Arc::new(orchestrator),
            retention: Arc::new(retention),
            max_upload_bytes,
            retention_days,
        }
    }

    /// State for the given configuration, backed by `engine`.
    pub fn with_engine(config: &ServerConfig, engine: impl ReportEngine + 'static) -> Self {
        let orchestrator = Orchestrator::new(engine, config.orchestrator_config());
        Self::new(orchestrator, config.max_upload_bytes, config.cleanup_days)
    }

    /// Production state driving the external report runner.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::with_engine(config, CommandEngine::new(config.command_engine_config()))
    }
}
