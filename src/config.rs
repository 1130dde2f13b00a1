//! Environment-driven server configuration.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use thiserror::Error;

use crate::generation::{CommandEngineConfig, EngineConfig, OrchestratorConfig};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CLEANUP_DAYS: u64 = 7;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to create directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub engine_home: PathBuf,
    pub log_dir: PathBuf,
    pub cleanup_days: u64,
    pub max_upload_bytes: usize,
    pub gate_timeout: Option<Duration>,
    pub render_timeout: Duration,
    pub engine_command: Option<String>,
    pub engine_log_level: LevelFilter,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_dir = env::var("REPORTS_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_base_dir());

        let gate_timeout = match parse_var::<u64>("REPORT_GATE_TIMEOUT_SECS")? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: "REPORT_GATE_TIMEOUT_SECS",
                    value: "0".to_string(),
                    reason: "must be greater than zero, or unset to wait forever".to_string(),
                })
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let engine_home = dir_var("REPORTS_ENGINE_HOME", &base_dir, "birt");
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: parse_var("SERVER_PORT")?.unwrap_or(DEFAULT_PORT),
            upload_dir: dir_var("REPORTS_UPLOAD_DIR", &base_dir, "uploads"),
            output_dir: dir_var("REPORTS_OUTPUT_DIR", &base_dir, "output"),
            log_dir: dir_var("REPORTS_LOG_DIR", &base_dir, "logs"),
            engine_home,
            cleanup_days: parse_var("REPORT_CLEANUP_DAYS")?.unwrap_or(DEFAULT_CLEANUP_DAYS),
            max_upload_bytes: parse_var("REPORT_MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            gate_timeout,
            render_timeout: Duration::from_secs(
                parse_var("REPORT_RENDER_TIMEOUT_SECS")?.unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS),
            ),
            engine_command: env::var("REPORT_ENGINE_COMMAND")
                .ok()
                .filter(|command| !command.trim().is_empty()),
            engine_log_level: parse_var("REPORT_ENGINE_LOG_LEVEL")?.unwrap_or(LevelFilter::Warn),
        })
    }

    /// Creates every directory the service writes to.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [
            &self.upload_dir,
            &self.output_dir,
            &self.engine_home,
            &self.log_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Directory {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            home_dir: self.engine_home.clone(),
            log_dir: self.log_dir.clone(),
            log_level: self.engine_log_level,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            upload_dir: self.upload_dir.clone(),
            output_dir: self.output_dir.clone(),
            engine: self.engine_config(),
            gate_timeout: self.gate_timeout,
        }
    }

    pub fn command_engine_config(&self) -> CommandEngineConfig {
        self.engine_command
            .as_deref()
            .and_then(|command| {
                CommandEngineConfig::from_command_line(command, self.render_timeout)
            })
            .unwrap_or_else(|| CommandEngineConfig {
                render_timeout: self.render_timeout,
                ..CommandEngineConfig::for_engine_home(&self.engine_home)
            })
    }
}

fn default_base_dir() -> PathBuf {
    match env::var("HOME") {
        Ok(home) => Path::new(&home).join("reports"),
        Err(_) => {
            log::warn!("HOME not set, using ./reports as base directory");
            PathBuf::from("reports")
        }
    }
}

fn dir_var(name: &str, base_dir: &Path, default_child: &str) -> PathBuf {
    env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| base_dir.join(default_child))
}

fn parse_var<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::Invalid {
                    name,
                    value: value.clone(),
                    reason: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    // Environment variables are process-global.
    static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

    const VARS: [&str; 13] = [
        "REPORTS_BASE_DIR",
        "REPORTS_UPLOAD_DIR",
        "REPORTS_OUTPUT_DIR",
        "REPORTS_ENGINE_HOME",
        "REPORTS_LOG_DIR",
        "SERVER_HOST",
        "SERVER_PORT",
        "REPORT_CLEANUP_DAYS",
        "REPORT_MAX_UPLOAD_BYTES",
        "REPORT_GATE_TIMEOUT_SECS",
        "REPORT_RENDER_TIMEOUT_SECS",
        "REPORT_ENGINE_COMMAND",
        "REPORT_ENGINE_LOG_LEVEL",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    fn test_defaults() {
        let _guard = ENV_LOCK.lock();
        clear_env();
        unsafe { env::set_var("REPORTS_BASE_DIR", "/srv/reports") };

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.upload_dir, PathBuf::from("/srv/reports/uploads"));
        assert_eq!(config.output_dir, PathBuf::from("/srv/reports/output"));
        assert_eq!(config.engine_home, PathBuf::from("/srv/reports/birt"));
        assert_eq!(config.log_dir, PathBuf::from("/srv/reports/logs"));
        assert_eq!(config.cleanup_days, 7);
        assert_eq!(config.max_upload_bytes, 52_428_800);
        assert_eq!(config.gate_timeout, None);
        assert_eq!(config.render_timeout, Duration::from_secs(300));
        assert_eq!(config.engine_log_level, LevelFilter::Warn);

        let engine = config.command_engine_config();
        assert_eq!(engine.program, PathBuf::from("/srv/reports/birt/genReport.sh"));
        assert!(engine.args.is_empty());
        clear_env();
    }

    #[test]
    fn test_overrides() {
        let _guard = ENV_LOCK.lock();
        clear_env();
        unsafe {
            env::set_var("REPORTS_BASE_DIR", "/srv/reports");
            env::set_var("REPORTS_OUTPUT_DIR", "/var/out");
            env::set_var("SERVER_PORT", "9090");
            env::set_var("REPORT_GATE_TIMEOUT_SECS", "30");
            env::set_var("REPORT_ENGINE_COMMAND", "java -jar runner.jar");
            env::set_var("REPORT_ENGINE_LOG_LEVEL", "off");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/var/out"));
        assert_eq!(config.port, 9090);
        assert_eq!(config.gate_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.engine_log_level, LevelFilter::Off);

        let engine = config.command_engine_config();
        assert_eq!(engine.program, PathBuf::from("java"));
        assert_eq!(engine.args, vec!["-jar", "runner.jar"]);
        assert_eq!(config.orchestrator_config().output_dir, PathBuf::from("/var/out"));
        clear_env();
    }

    #[test]
    fn test_invalid_values() {
        let _guard = ENV_LOCK.lock();
        clear_env();

        unsafe { env::set_var("SERVER_PORT", "eighty") };
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::Invalid { name: "SERVER_PORT", .. })
        ));
        clear_env();

        unsafe { env::set_var("REPORT_GATE_TIMEOUT_SECS", "0") };
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::Invalid {
                name: "REPORT_GATE_TIMEOUT_SECS",
                ..
            })
        ));
        clear_env();
    }

    #[test]
    fn test_ensure_directories() {
        let _guard = ENV_LOCK.lock();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        unsafe { env::set_var("REPORTS_BASE_DIR", dir.path()) };

        let config = ServerConfig::from_env().unwrap();
        config.ensure_directories().unwrap();
        assert!(config.upload_dir.is_dir());
        assert!(config.output_dir.is_dir());
        assert!(config.engine_home.is_dir());
        assert!(config.log_dir.is_dir());
        clear_env();
    }
}
