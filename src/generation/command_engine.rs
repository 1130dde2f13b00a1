//! Report engine backed by an external report runner.
//!
//! Handles the low-level details of keeping a session workspace, discovering
//! design parameters, invoking the runner, and checking its output.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use log::{debug, LevelFilter};
use regex::Regex;
use tempfile::TempDir;

use super::engine::{
    DesignHandle, EngineConfig, EngineError, ParameterDefinition, ParameterType, RenderOptions,
    RenderTask, ReportEngine,
};

const DEFAULT_RUNNER: &str = "genReport.sh";
const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const ENGINE_LOG_FILE: &str = "engine.log";
/// Environment variable carrying the engine log level to the runner.
pub const LOG_LEVEL_VAR: &str = "BIRT_LOG_LEVEL";

lazy_static! {
    static ref SCALAR_PARAMETER: Regex =
        Regex::new(r"(?s)<scalar-parameter\b([^>]*?)(?:/>|>(.*?)</scalar-parameter>)")
            .expect("scalar parameter pattern");
    static ref NAME_ATTRIBUTE: Regex =
        Regex::new(r#"\bname\s*=\s*"([^"]*)""#).expect("name attribute pattern");
    static ref DATA_TYPE_PROPERTY: Regex =
        Regex::new(r#"<property\s+name\s*=\s*"dataType"\s*>\s*([^<\s]+)\s*</property>"#)
            .expect("dataType property pattern");
}

#[derive(Debug, Clone)]
pub struct CommandEngineConfig {
    pub program: PathBuf,
    /// Arguments placed before the render arguments, e.g. a launcher script.
    pub args: Vec<String>,
    pub render_timeout: Duration,
}

impl CommandEngineConfig {
    /// Runner shipped inside the engine home.
    pub fn for_engine_home(engine_home: &Path) -> Self {
        Self {
            program: engine_home.join(DEFAULT_RUNNER),
            args: Vec::new(),
            render_timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    /// Parses a whitespace separated command line such as
    /// `java -cp bin:lib/* com.example.Runner`.
    pub fn from_command_line(command_line: &str, render_timeout: Duration) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: PathBuf::from(program),
            args: parts.map(str::to_string).collect(),
            render_timeout,
        })
    }
}

struct OpenedDesign {
    path: PathBuf,
    parameters: Vec<ParameterDefinition>,
}

struct ActiveSession {
    config: EngineConfig,
    workspace: TempDir,
    designs: HashMap<u64, OpenedDesign>,
    next_id: u64,
}

pub struct CommandEngine {
    config: CommandEngineConfig,
    session: Option<ActiveSession>,
}

impl CommandEngine {
    pub fn new(config: CommandEngineConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn active(&self) -> Result<&ActiveSession, EngineError> {
        self.session.as_ref().ok_or(EngineError::NoSession)
    }

    fn design(&self, handle: &DesignHandle) -> Result<&OpenedDesign, EngineError> {
        self.active()?
            .designs
            .get(&handle.id)
            .ok_or(EngineError::UnknownDesign(handle.id))
    }
}

impl ReportEngine for CommandEngine {
    fn start_session(&mut self, config: &EngineConfig) -> Result<(), EngineError> {
        if self.session.is_some() {
            return Err(EngineError::SessionActive);
        }

        fs::create_dir_all(&config.home_dir).map_err(EngineError::Io)?;
        fs::create_dir_all(&config.log_dir).map_err(EngineError::Io)?;
        let workspace = tempfile::Builder::new()
            .prefix("session-")
            .tempdir_in(&config.home_dir)
            .map_err(EngineError::Io)?;

        debug!("Engine workspace created at {}", workspace.path().display());
        self.session = Some(ActiveSession {
            config: config.clone(),
            workspace,
            designs: HashMap::new(),
            next_id: 1,
        });
        Ok(())
    }

    fn open_design(&mut self, path: &Path) -> Result<DesignHandle, EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NoSession)?;
        let open_error = |reason: String| EngineError::OpenDesign {
            path: path.to_path_buf(),
            reason,
        };

        let source = fs::read_to_string(path).map_err(|e| open_error(e.to_string()))?;
        if !source.contains("<report") {
            return Err(open_error("not a report design document".to_string()));
        }

        let id = session.next_id;
        session.next_id += 1;
        let staged = session.workspace.path().join(format!("design-{}.rptdesign", id));
        fs::write(&staged, source.as_bytes()).map_err(EngineError::Io)?;

        let parameters = parse_parameters(&source);
        debug!(
            "Design {} opened with {} declared parameter(s)",
            path.display(),
            parameters.len()
        );
        session.designs.insert(
            id,
            OpenedDesign {
                path: staged,
                parameters,
            },
        );

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("design-{}", id));
        Ok(DesignHandle { id, name })
    }

    fn parameter_definitions(
        &mut self,
        design: &DesignHandle,
    ) -> Result<Vec<ParameterDefinition>, EngineError> {
        Ok(self.design(design)?.parameters.clone())
    }

    fn create_render_task(&mut self, design: &DesignHandle) -> Result<RenderTask, EngineError> {
        self.design(design)?;
        Ok(RenderTask::new(design.clone()))
    }

    fn render(&mut self, task: &RenderTask, options: &RenderOptions) -> Result<(), EngineError> {
        let session = self.active()?;
        let design = self.design(task.design())?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg("-f")
            .arg(options.format_tag())
            .arg("-o")
            .arg(&options.output_path);
        for (name, value) in task.parameters() {
            command.arg("-p").arg(format!("{}={}", name, value));
        }
        command
            .arg(&design.path)
            .env("BIRT_HOME", &session.config.home_dir)
            .env(LOG_LEVEL_VAR, session.config.log_level.as_str())
            .current_dir(&session.config.home_dir)
            .stdin(Stdio::null());

        if session.config.log_level == LevelFilter::Off {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        } else {
            let log = open_engine_log(&session.config.log_dir)?;
            let log_err = log.try_clone().map_err(EngineError::Io)?;
            command.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
        }

        debug!(
            "Running report runner {} for {}",
            self.config.program.display(),
            options.output_path.display()
        );
        let mut child = command.spawn().map_err(EngineError::Io)?;
        let status = wait_with_timeout(&mut child, self.config.render_timeout)?;

        if !status.success() {
            return Err(EngineError::Exit(status.code().unwrap_or(-1)));
        }
        if !options.output_path.is_file() {
            return Err(EngineError::Render(format!(
                "runner finished without producing {}",
                options.output_path.display()
            )));
        }
        Ok(())
    }

    fn close_task(&mut self, task: RenderTask) {
        debug!("Render task for design {} closed", task.design().id);
    }

    fn destroy_engine(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.designs.clear();
        }
    }

    fn shutdown_session(&mut self) -> Result<(), EngineError> {
        match self.session.take() {
            Some(session) => session.workspace.close().map_err(EngineError::Io),
            None => Ok(()),
        }
    }
}

/// Scalar parameters declared in a design document. A parameter without a
/// `dataType` property is a string parameter.
pub fn parse_parameters(design: &str) -> Vec<ParameterDefinition> {
    SCALAR_PARAMETER
        .captures_iter(design)
        .filter_map(|captures| {
            let attributes = captures.get(1)?.as_str();
            let name = NAME_ATTRIBUTE.captures(attributes)?.get(1)?.as_str();
            let data_type = captures
                .get(2)
                .and_then(|body| DATA_TYPE_PROPERTY.captures(body.as_str()))
                .and_then(|dt| dt.get(1))
                .map(|dt| dt.as_str());

            let data_type = match data_type {
                None => ParameterType::String,
                Some(dt) if dt.eq_ignore_ascii_case("string") => ParameterType::String,
                Some(_) => ParameterType::Other,
            };
            Some(ParameterDefinition::new(name, data_type))
        })
        .collect()
}

fn open_engine_log(log_dir: &Path) -> Result<File, EngineError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(ENGINE_LOG_FILE))
        .map_err(EngineError::Io)
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, EngineError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(EngineError::Io)? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            // The runner may already be gone; either way it is reaped below.
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::generation::OutputFormat;

    const DESIGN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<report xmlns="http://www.eclipse.org/birt/2005/design" version="3.2.23">
    <parameters>
        <scalar-parameter name="JsonSource" id="7">
            <property name="valueType">static</property>
            <property name="dataType">string</property>
        </scalar-parameter>
        <scalar-parameter name="rowLimit" id="8">
            <property name="dataType">integer</property>
        </scalar-parameter>
        <scalar-parameter name="title" id="9"/>
    </parameters>
</report>"#;

    const RUNNER: &str = r#"all="$*"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf '%s' "$all" > "$out"
"#;

    const LEVEL_RUNNER: &str = r#"while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf '%s' "$BIRT_LOG_LEVEL" > "$out"
echo rendered
"#;

    fn engine_config(dir: &Path) -> EngineConfig {
        EngineConfig {
            home_dir: dir.join("engine"),
            log_dir: dir.join("logs"),
            log_level: LevelFilter::Warn,
        }
    }

    fn shell_engine(dir: &Path, script: &str, timeout: Duration) -> CommandEngine {
        let script_path = dir.join("runner.sh");
        fs::write(&script_path, script).unwrap();
        CommandEngine::new(CommandEngineConfig {
            program: PathBuf::from("/bin/sh"),
            args: vec![script_path.to_string_lossy().into_owned()],
            render_timeout: timeout,
        })
    }

    #[test]
    fn test_parse_parameters() {
        let parameters = parse_parameters(DESIGN);
        assert_eq!(
            parameters,
            vec![
                ParameterDefinition::new("JsonSource", ParameterType::String),
                ParameterDefinition::new("rowLimit", ParameterType::Other),
                ParameterDefinition::new("title", ParameterType::String),
            ]
        );
    }

    #[test]
    fn test_from_command_line() {
        let config = CommandEngineConfig::from_command_line(
            "java -cp bin:lib/* com.example.Runner",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(config.program, PathBuf::from("java"));
        assert_eq!(config.args, vec!["-cp", "bin:lib/*", "com.example.Runner"]);
        assert!(CommandEngineConfig::from_command_line("   ", Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = shell_engine(dir.path(), RUNNER, Duration::from_secs(10));
        let config = engine_config(dir.path());

        assert!(matches!(
            engine.open_design(Path::new("missing")),
            Err(EngineError::NoSession)
        ));
        engine.start_session(&config).unwrap();
        assert!(matches!(
            engine.start_session(&config),
            Err(EngineError::SessionActive)
        ));
        engine.shutdown_session().unwrap();
        engine.start_session(&config).unwrap();
        engine.shutdown_session().unwrap();
    }

    #[test]
    fn test_open_design_rejects_non_design() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = shell_engine(dir.path(), RUNNER, Duration::from_secs(10));
        engine.start_session(&engine_config(dir.path())).unwrap();

        let bogus = dir.path().join("bogus.rptdesign");
        fs::write(&bogus, "hello").unwrap();
        assert!(matches!(
            engine.open_design(&bogus),
            Err(EngineError::OpenDesign { .. })
        ));
        engine.shutdown_session().unwrap();
    }

    #[test]
    fn test_render_passes_format_and_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = shell_engine(dir.path(), RUNNER, Duration::from_secs(10));
        engine.start_session(&engine_config(dir.path())).unwrap();

        let design_path = dir.path().join("sales.rptdesign");
        fs::write(&design_path, DESIGN).unwrap();
        let design = engine.open_design(&design_path).unwrap();
        // The engine works from its own copy once the design is open.
        fs::remove_file(&design_path).unwrap();

        let mut task = engine.create_render_task(&design).unwrap();
        task.set_parameter("json", "http://x/data");
        let output = dir.path().join("report.pdf");
        engine
            .render(&task, &RenderOptions::new(OutputFormat::Pdf, &output))
            .unwrap();

        let args = fs::read_to_string(&output).unwrap();
        assert!(args.contains("-f pdf"));
        assert!(args.contains("-p json=http://x/data"));
        assert!(args.ends_with("design-1.rptdesign"));

        engine.close_task(task);
        engine.destroy_engine();
        assert!(matches!(
            engine.parameter_definitions(&design),
            Err(EngineError::UnknownDesign(1))
        ));
        engine.shutdown_session().unwrap();
    }

    #[test]
    fn test_render_passes_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let design_path = dir.path().join("sales.rptdesign");
        fs::write(&design_path, DESIGN).unwrap();

        for (level, expected, logged) in [
            (LevelFilter::Warn, "WARN", true),
            (LevelFilter::Off, "OFF", false),
        ] {
            let run = tempfile::tempdir().unwrap();
            let mut engine = shell_engine(run.path(), LEVEL_RUNNER, Duration::from_secs(10));
            let mut config = engine_config(run.path());
            config.log_level = level;
            engine.start_session(&config).unwrap();
            let design = engine.open_design(&design_path).unwrap();
            let task = engine.create_render_task(&design).unwrap();
            let output = run.path().join("out.pdf");
            engine
                .render(&task, &RenderOptions::new(OutputFormat::Pdf, &output))
                .unwrap();
            engine.shutdown_session().unwrap();

            assert_eq!(fs::read_to_string(&output).unwrap(), expected);
            let log = fs::read_to_string(config.log_dir.join(ENGINE_LOG_FILE))
                .unwrap_or_default();
            assert_eq!(log.contains("rendered"), logged);
        }
    }

    #[test]
    fn test_render_failures() {
        let dir = tempfile::tempdir().unwrap();
        let design_path = dir.path().join("sales.rptdesign");
        fs::write(&design_path, DESIGN).unwrap();

        let mut failing = shell_engine(dir.path(), "exit 3\n", Duration::from_secs(10));
        failing.start_session(&engine_config(dir.path())).unwrap();
        let design = failing.open_design(&design_path).unwrap();
        let task = failing.create_render_task(&design).unwrap();
        let options = RenderOptions::new(OutputFormat::Html, dir.path().join("out.html"));
        assert!(matches!(
            failing.render(&task, &options),
            Err(EngineError::Exit(3))
        ));
        failing.shutdown_session().unwrap();

        let mut silent = shell_engine(dir.path(), "exit 0\n", Duration::from_secs(10));
        silent.start_session(&engine_config(dir.path())).unwrap();
        let design = silent.open_design(&design_path).unwrap();
        let task = silent.create_render_task(&design).unwrap();
        assert!(matches!(
            silent.render(&task, &options),
            Err(EngineError::Render(_))
        ));
        silent.shutdown_session().unwrap();
    }

    #[test]
    fn test_render_timeout_kills_runner() {
        let dir = tempfile::tempdir().unwrap();
        let design_path = dir.path().join("sales.rptdesign");
        fs::write(&design_path, DESIGN).unwrap();

        let mut engine = shell_engine(dir.path(), "sleep 5\n", Duration::from_millis(200));
        engine.start_session(&engine_config(dir.path())).unwrap();
        let design = engine.open_design(&design_path).unwrap();
        let task = engine.create_render_task(&design).unwrap();

        let started = Instant::now();
        let result = engine.render(
            &task,
            &RenderOptions::new(OutputFormat::Pdf, dir.path().join("out.pdf")),
        );
        assert!(matches!(result, Err(EngineError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
        engine.shutdown_session().unwrap();
    }
}
