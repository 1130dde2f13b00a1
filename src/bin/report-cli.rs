use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use log::LevelFilter;

use report_generation_server::generation::{
    CommandEngine, CommandEngineConfig, DesignInput, EngineConfig, GenerationRequest, JsonSource,
    Orchestrator, OrchestratorConfig, OutputFormat,
};

/// Renders one report and prints the path of the generated file.
#[derive(Debug, Parser)]
#[command(
    name = "report-cli",
    version,
    about = "Generate a report from a design and a JSON source"
)]
struct CliArgs {
    /// Report design file (.rptdesign).
    #[arg(value_name = "DESIGN", value_hint = ValueHint::FilePath)]
    design: PathBuf,

    /// JSON API URL (http...) or path to a local JSON file.
    #[arg(value_name = "JSON_SOURCE")]
    json_source: String,

    /// Directory the report is written to.
    #[arg(value_name = "OUTPUT_DIR", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,

    /// Report engine home directory.
    #[arg(value_name = "ENGINE_HOME", value_hint = ValueHint::DirPath)]
    engine_home: PathBuf,

    /// PDF, XLSX, HTML or DOC.
    #[arg(value_name = "FORMAT")]
    format: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match generate(CliArgs::parse()) {
        Ok(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn generate(args: CliArgs) -> Result<PathBuf> {
    let format: OutputFormat = args.format.parse()?;
    let json_source = JsonSource::from_argument(&args.json_source)?;

    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            args.output_dir.display()
        )
    })?;

    let engine = CommandEngine::new(CommandEngineConfig::for_engine_home(&args.engine_home));
    let orchestrator = Orchestrator::new(
        engine,
        OrchestratorConfig {
            upload_dir: std::env::temp_dir(),
            output_dir: args.output_dir.clone(),
            engine: EngineConfig {
                log_dir: args.engine_home.join("logs"),
                home_dir: args.engine_home,
                log_level: LevelFilter::Warn,
            },
            gate_timeout: None,
        },
    );

    let artifact = orchestrator
        .generate(GenerationRequest::new(
            DesignInput::Path(args.design.clone()),
            json_source,
            format,
        ))
        .with_context(|| format!("failed to generate report from {}", args.design.display()))?;
    Ok(artifact.path)
}
