//! Generation orchestrator.
//!
//! The rendering engine has process-wide startup and shutdown, so every
//! generation goes through one gate: the gate is taken before the session
//! starts and released only after the session has been shut down, on every
//! exit path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use uuid::Uuid;

use super::engine::{EngineConfig, RenderOptions, ReportEngine};
use super::{
    resolver, DesignInput, GenerationError, GenerationRequest, OutputFormat, RenderedArtifact,
};

/// Upper bound for the upload name embedded in a staged temp file name.
const MAX_STAGED_NAME_BYTES: usize = 64;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Scratch directory for request-scoped design uploads.
    pub upload_dir: PathBuf,
    /// Where rendered artifacts are written and later swept.
    pub output_dir: PathBuf,
    pub engine: EngineConfig,
    /// How long a request waits for the engine gate. `None` waits forever.
    pub gate_timeout: Option<Duration>,
}

pub struct Orchestrator {
    gate: Mutex<Box<dyn ReportEngine>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(engine: impl ReportEngine + 'static, config: OrchestratorConfig) -> Self {
        Self {
            gate: Mutex::new(Box::new(engine)),
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Renders one report. Blocks while another generation holds the engine.
    pub fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<RenderedArtifact, GenerationError> {
        let request_id = Uuid::new_v4();
        let GenerationRequest {
            design,
            json_source,
            format,
        } = request;
        info!(
            "[{}] Generating {} report from '{}' ({} JSON source)",
            request_id,
            format,
            design.file_name(),
            json_source.mode()
        );

        let mut session =
            EngineSession::start(self.acquire_gate()?, &self.config.engine, request_id)?;

        let staged = self.stage_design(&design)?;
        let opened = session.engine().open_design(staged.path());
        staged.remove(request_id);
        let design_handle = opened?;

        let mut task = session.engine().create_render_task(&design_handle)?;
        let bound = resolver::resolve(session.engine(), &design_handle, &json_source, &mut task)?;
        debug!("[{}] {} parameter(s) bound", request_id, bound);

        std::fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| GenerationError::io("failed to create output directory", e))?;
        let created_at = Local::now();
        let output_path = self.output_path(format, created_at);
        let options = RenderOptions::new(format, &output_path);

        let rendered = session.engine().render(&task, &options);
        session.engine().close_task(task);
        rendered?;
        session.destroy();
        drop(session);

        info!("[{}] Report generated: {}", request_id, output_path.display());
        Ok(RenderedArtifact {
            path: output_path,
            format,
            created_at,
        })
    }

    fn acquire_gate(&self) -> Result<MutexGuard<'_, Box<dyn ReportEngine>>, GenerationError> {
        match self.config.gate_timeout {
            Some(timeout) => self.gate.try_lock_for(timeout).ok_or_else(|| {
                error!("Report engine gate not acquired within {:?}", timeout);
                GenerationError::EngineBusy(timeout)
            }),
            None => Ok(self.gate.lock()),
        }
    }

    fn stage_design(&self, design: &DesignInput) -> Result<StagedDesign, GenerationError> {
        match design {
            DesignInput::Upload { bytes, file_name } => {
                let safe_name = staged_name(file_name);
                let mut file = tempfile::Builder::new()
                    .prefix(&format!("{}_", Local::now().timestamp_millis()))
                    .suffix(&format!("_{}", safe_name))
                    .tempfile_in(&self.config.upload_dir)
                    .map_err(|e| GenerationError::io("failed to create temporary design file", e))?;
                file.write_all(bytes)
                    .and_then(|_| file.flush())
                    .map_err(|e| GenerationError::io("failed to write temporary design file", e))?;
                Ok(StagedDesign::Temp(file))
            }
            DesignInput::Path(path) => Ok(StagedDesign::Existing(path.clone())),
        }
    }

    /// `report<HHmmss>.<ext>`, with `_<n>` appended when that name is taken.
    /// Only called with the gate held, so no other generation races the check.
    fn output_path(&self, format: OutputFormat, now: DateTime<Local>) -> PathBuf {
        let stem = format!("report{}", now.format("%H%M%S"));
        let extension = format.extension();

        let mut candidate = self.config.output_dir.join(format!("{}.{}", stem, extension));
        let mut suffix = 1;
        while candidate.exists() {
            candidate = self
                .config
                .output_dir
                .join(format!("{}_{}.{}", stem, suffix, extension));
            suffix += 1;
        }
        candidate
    }
}

/// Sanitized upload name, short enough to sit inside a temp file name.
/// Long names keep their extension and lose the end of the stem.
fn staged_name(file_name: &str) -> String {
    let safe_name = sanitize_filename::sanitize(file_name);
    if safe_name.len() <= MAX_STAGED_NAME_BYTES {
        return safe_name;
    }

    let extension = Path::new(&safe_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() < MAX_STAGED_NAME_BYTES / 2)
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    let mut stem_len = MAX_STAGED_NAME_BYTES - extension.len();
    while !safe_name.is_char_boundary(stem_len) {
        stem_len -= 1;
    }
    format!("{}{}", &safe_name[..stem_len], extension)
}

/// Design file handed to the engine. Uploads are deleted once opened.
enum StagedDesign {
    Temp(NamedTempFile),
    Existing(PathBuf),
}

impl StagedDesign {
    fn path(&self) -> &Path {
        match self {
            Self::Temp(file) => file.path(),
            Self::Existing(path) => path,
        }
    }

    fn remove(self, request_id: Uuid) {
        if let Self::Temp(file) = self {
            let path = file.path().to_path_buf();
            match file.close() {
                Ok(()) => debug!("[{}] Temporary design deleted: {}", request_id, path.display()),
                Err(e) => warn!(
                    "[{}] Failed to delete temporary design {}: {}",
                    request_id,
                    path.display(),
                    e
                ),
            }
        }
    }
}

/// Started engine session holding the gate. Dropping it destroys the engine
/// instance if still needed, shuts the session down, then releases the gate.
struct EngineSession<'a> {
    engine: MutexGuard<'a, Box<dyn ReportEngine>>,
    destroyed: bool,
    request_id: Uuid,
}

impl<'a> EngineSession<'a> {
    fn start(
        mut engine: MutexGuard<'a, Box<dyn ReportEngine>>,
        config: &EngineConfig,
        request_id: Uuid,
    ) -> Result<Self, GenerationError> {
        engine.start_session(config)?;
        debug!("[{}] Engine session started", request_id);
        Ok(Self {
            engine,
            destroyed: false,
            request_id,
        })
    }

    fn engine(&mut self) -> &mut dyn ReportEngine {
        &mut **self.engine
    }

    fn destroy(&mut self) {
        self.engine.destroy_engine();
        self.destroyed = true;
    }
}

impl Drop for EngineSession<'_> {
    fn drop(&mut self) {
        if !self.destroyed {
            self.engine.destroy_engine();
        }
        match self.engine.shutdown_session() {
            Ok(()) => debug!("[{}] Engine session shut down", self.request_id),
            Err(e) => error!(
                "[{}] Engine session shutdown failed: {}",
                self.request_id, e
            ),
        }
    }
}
