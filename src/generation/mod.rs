//! Report generation pipeline.
//!
//! This module contains everything between a decoded request and a rendered
//! file on disk:
//! - `engine` - the rendering engine collaborator interface
//! - `command_engine` - engine backed by an external report runner process
//! - `resolver` - JSON source injection into render task parameters
//! - `orchestrator` - serialized engine lifecycle around one generation
//! - `validation` - request field validation errors

pub mod command_engine;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod validation;

pub use command_engine::{CommandEngine, CommandEngineConfig};
pub use engine::{
    DesignHandle, EngineConfig, EngineError, ParameterDefinition, ParameterType, RenderOptions,
    RenderTask, ReportEngine,
};
pub use error::GenerationError;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use validation::ValidationError;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Supported output formats, in the order they are advertised.
pub const SUPPORTED_FORMATS: [OutputFormat; 4] = [
    OutputFormat::Pdf,
    OutputFormat::Xlsx,
    OutputFormat::Html,
    OutputFormat::Doc,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    Pdf,
    Doc,
    Xlsx,
    Html,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Doc => "DOC",
            Self::Xlsx => "XLSX",
            Self::Html => "HTML",
        }
    }

    /// Format tag understood by the rendering engine.
    pub fn engine_tag(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Xlsx => "xlsx",
            Self::Html => "html",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.engine_tag()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Doc => "application/msword",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Html => "text/html",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Pdf
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = GenerationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PDF" => Ok(Self::Pdf),
            "DOC" => Ok(Self::Doc),
            "XLSX" => Ok(Self::Xlsx),
            "HTML" => Ok(Self::Html),
            _ => Err(GenerationError::UnsupportedFormat(value.trim().to_string())),
        }
    }
}

/// Where the JSON data for a report comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonSource {
    /// The engine fetches the data itself at render time.
    RemoteUrl(String),
    /// Raw JSON uploaded or read from disk by the transport.
    LocalBytes(Vec<u8>),
}

impl JsonSource {
    /// Interprets a command-line style source argument: anything starting with
    /// `http` is a remote URL, everything else is a local file read eagerly.
    pub fn from_argument(argument: &str) -> Result<Self, GenerationError> {
        if argument.starts_with("http") {
            return Ok(Self::RemoteUrl(argument.to_string()));
        }

        std::fs::read(argument)
            .map(Self::LocalBytes)
            .map_err(|e| GenerationError::SourceRead(format!("{}: {}", argument, e)))
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::RemoteUrl(_) => "remote",
            Self::LocalBytes(_) => "local",
        }
    }
}

/// The design template as delivered by a transport.
#[derive(Debug, Clone)]
pub enum DesignInput {
    /// Uploaded bytes, staged to a request-scoped temp file before opening.
    Upload { bytes: Vec<u8>, file_name: String },
    /// A design already on disk, opened in place.
    Path(PathBuf),
}

impl DesignInput {
    pub fn file_name(&self) -> String {
        match self {
            Self::Upload { file_name, .. } => file_name.clone(),
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

/// One generation request. Built per request and consumed by the orchestrator.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub design: DesignInput,
    pub json_source: JsonSource,
    pub format: OutputFormat,
}

impl GenerationRequest {
    pub fn new(design: DesignInput, json_source: JsonSource, format: OutputFormat) -> Self {
        Self {
            design,
            json_source,
            format,
        }
    }
}

/// A rendered file in the output directory. The filesystem owns its lifetime.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub created_at: DateTime<Local>,
}

impl RenderedArtifact {
    /// Suggested download name, the artifact's own file name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("report.{}", self.format.extension()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
