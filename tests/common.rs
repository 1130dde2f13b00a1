#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use report_generation_server::generation::{
    DesignHandle, EngineConfig, EngineError, Orchestrator, OrchestratorConfig,
    ParameterDefinition, ParameterType, RenderOptions, RenderTask, ReportEngine,
};

/// Everything the fake engine saw, shared with the test through an `Arc`.
#[derive(Debug, Default)]
pub struct Recording {
    pub calls: Vec<String>,
    pub opened_paths: Vec<PathBuf>,
    pub opened_contents: Vec<Vec<u8>>,
    pub rendered: Vec<(RenderTask, RenderOptions)>,
    pub sessions_started: usize,
    pub sessions_shut_down: usize,
    pub discovery_calls: usize,
    pub active: bool,
    /// Set when a session was started while another was still active.
    pub overlapped: bool,
}

/// Failures the next calls should report. Cleared by the test, not the engine.
#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub open_design: bool,
    pub render: bool,
}

/// Mock implementation of ReportEngine for testing
#[derive(Clone)]
pub struct FakeEngine {
    pub recording: Arc<Mutex<Recording>>,
    pub failures: Arc<Mutex<Failures>>,
    definitions: Vec<ParameterDefinition>,
    render_delay: Duration,
    next_id: u64,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            recording: Arc::new(Mutex::new(Recording::default())),
            failures: Arc::new(Mutex::new(Failures::default())),
            definitions: vec![ParameterDefinition::new("JsonSource", ParameterType::String)],
            render_delay: Duration::ZERO,
            next_id: 0,
        }
    }

    pub fn with_definitions(mut self, definitions: Vec<ParameterDefinition>) -> Self {
        self.definitions = definitions;
        self
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    fn record(&self, call: &str) {
        self.recording.lock().calls.push(call.to_string());
    }
}

impl ReportEngine for FakeEngine {
    fn start_session(&mut self, _config: &EngineConfig) -> Result<(), EngineError> {
        self.record("start_session");
        let mut recording = self.recording.lock();
        if recording.active {
            recording.overlapped = true;
            return Err(EngineError::SessionActive);
        }
        recording.active = true;
        recording.sessions_started += 1;
        Ok(())
    }

    fn open_design(&mut self, path: &Path) -> Result<DesignHandle, EngineError> {
        self.record("open_design");
        let contents = std::fs::read(path).map_err(|e| EngineError::OpenDesign {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        {
            let mut recording = self.recording.lock();
            recording.opened_paths.push(path.to_path_buf());
            recording.opened_contents.push(contents);
        }
        if self.failures.lock().open_design {
            return Err(EngineError::OpenDesign {
                path: path.to_path_buf(),
                reason: "injected failure".to_string(),
            });
        }
        self.next_id += 1;
        Ok(DesignHandle {
            id: self.next_id,
            name: "fake.rptdesign".to_string(),
        })
    }

    fn parameter_definitions(
        &mut self,
        _design: &DesignHandle,
    ) -> Result<Vec<ParameterDefinition>, EngineError> {
        self.record("parameter_definitions");
        self.recording.lock().discovery_calls += 1;
        Ok(self.definitions.clone())
    }

    fn create_render_task(&mut self, design: &DesignHandle) -> Result<RenderTask, EngineError> {
        self.record("create_render_task");
        Ok(RenderTask::new(design.clone()))
    }

    fn render(&mut self, task: &RenderTask, options: &RenderOptions) -> Result<(), EngineError> {
        self.record("render");
        if !self.render_delay.is_zero() {
            std::thread::sleep(self.render_delay);
        }
        if self.failures.lock().render {
            return Err(EngineError::Render("injected failure".to_string()));
        }
        std::fs::write(&options.output_path, b"%PDF-fake").map_err(EngineError::Io)?;
        self.recording
            .lock()
            .rendered
            .push((task.clone(), options.clone()));
        Ok(())
    }

    fn close_task(&mut self, _task: RenderTask) {
        self.record("close_task");
    }

    fn destroy_engine(&mut self) {
        self.record("destroy_engine");
    }

    fn shutdown_session(&mut self) -> Result<(), EngineError> {
        self.record("shutdown_session");
        let mut recording = self.recording.lock();
        recording.active = false;
        recording.sessions_shut_down += 1;
        Ok(())
    }
}

/// Upload, output and engine directories inside one temp dir.
pub fn orchestrator_config(root: &Path) -> OrchestratorConfig {
    let upload_dir = root.join("uploads");
    std::fs::create_dir_all(&upload_dir).unwrap();
    OrchestratorConfig {
        upload_dir,
        output_dir: root.join("output"),
        engine: EngineConfig {
            home_dir: root.join("birt"),
            log_dir: root.join("logs"),
            log_level: log::LevelFilter::Warn,
        },
        gate_timeout: None,
    }
}

pub fn orchestrator(root: &Path, engine: FakeEngine) -> Orchestrator {
    Orchestrator::new(engine, orchestrator_config(root))
}

/// Entries left in a directory, for temp-file leak checks.
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
