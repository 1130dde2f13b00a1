//! Rendering engine collaborator interface.
//!
//! The engine is a process-wide, stateful resource: one session is started,
//! a design is opened, a render task is filled with parameter values and run,
//! and the session is shut down again. Implementations are only ever driven
//! through the orchestrator's gate, one generation at a time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::LevelFilter;
use thiserror::Error;

use super::OutputFormat;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("an engine session is already active")]
    SessionActive,
    #[error("no engine session is active")]
    NoSession,
    #[error("failed to open design {path}: {reason}")]
    OpenDesign { path: PathBuf, reason: String },
    #[error("unknown design handle {0}")]
    UnknownDesign(u64),
    #[error("render failed: {0}")]
    Render(String),
    #[error("render did not finish within {0:?}")]
    Timeout(Duration),
    #[error("report runner exited with status {0}")]
    Exit(i32),
    #[error("report runner execution failed: {0}")]
    Io(#[source] std::io::Error),
}

/// Settings handed to the engine when a session starts.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub home_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: LevelFilter,
}

/// Opaque reference to a design opened in the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignHandle {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Other,
}

/// A parameter declared by a design, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDefinition {
    pub name: String,
    pub data_type: ParameterType,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, data_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn is_string(&self) -> bool {
        self.data_type == ParameterType::String
    }
}

/// One design plus the parameter values it will be rendered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTask {
    design: DesignHandle,
    parameters: BTreeMap<String, String>,
}

impl RenderTask {
    pub fn new(design: DesignHandle) -> Self {
        Self {
            design,
            parameters: BTreeMap::new(),
        }
    }

    pub fn design(&self) -> &DesignHandle {
        &self.design
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(name.into(), value.into());
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }
}

/// Output format tag and target file for a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub output_path: PathBuf,
}

impl RenderOptions {
    pub fn new(format: OutputFormat, output_path: impl Into<PathBuf>) -> Self {
        Self {
            format,
            output_path: output_path.into(),
        }
    }

    pub fn format_tag(&self) -> &'static str {
        self.format.engine_tag()
    }
}

pub trait ReportEngine: Send {
    /// Global startup. Must not be called while a session is active.
    fn start_session(&mut self, config: &EngineConfig) -> Result<(), EngineError>;

    fn open_design(&mut self, path: &Path) -> Result<DesignHandle, EngineError>;

    /// Parameters declared on an opened design.
    fn parameter_definitions(
        &mut self,
        design: &DesignHandle,
    ) -> Result<Vec<ParameterDefinition>, EngineError>;

    fn create_render_task(&mut self, design: &DesignHandle) -> Result<RenderTask, EngineError>;

    /// Runs the task and writes the output file named in `options`.
    fn render(&mut self, task: &RenderTask, options: &RenderOptions) -> Result<(), EngineError>;

    fn close_task(&mut self, task: RenderTask);

    /// Drops every design and task held by the engine instance.
    fn destroy_engine(&mut self);

    /// Global shutdown. After this a new session may be started.
    fn shutdown_session(&mut self) -> Result<(), EngineError>;
}
