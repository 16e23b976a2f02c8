//! Tracing setup for the CLI. Stdout carries answers, so logs go to stderr
//! or to a JSONL file named by `CORTEX_JSON_LOG_PATH`.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "warn,cortex_chat=info";
const VERBOSE_FILTER: &str = "info,cortex_chat=debug";
const DEFAULT_LOG_FILE: &str = "cortex-chat.logs.jsonl";

#[derive(Debug, PartialEq, Eq)]
enum LogOutput {
    Off,
    Stderr,
    JsonFile { dir: PathBuf, file_name: String },
}

impl LogOutput {
    fn json_file(path: &Path) -> Self {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_LOG_FILE);
        Self::JsonFile {
            dir: dir.to_path_buf(),
            file_name: file_name.to_string(),
        }
    }
}

#[derive(Debug)]
struct LogSettings {
    output: LogOutput,
    /// Explicit filter; `None` defers to `RUST_LOG`, then `DEFAULT_FILTER`.
    filter: Option<String>,
}

impl LogSettings {
    /// `--verbose` forces logging on and raises the crate to `debug` unless
    /// `CORTEX_LOG_LEVEL` names a valid filter.
    fn from_lookup(verbose: bool, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = verbose
            || lookup("CORTEX_OBSERVABILITY")
                .and_then(|v| parse_bool_env(&v))
                .unwrap_or(true);
        let output = match lookup("CORTEX_JSON_LOG_PATH") {
            _ if !enabled => LogOutput::Off,
            Some(path) => LogOutput::json_file(Path::new(&path)),
            None => LogOutput::Stderr,
        };
        let filter = lookup("CORTEX_LOG_LEVEL")
            .filter(|level| EnvFilter::try_new(level).is_ok())
            .or_else(|| verbose.then(|| VERBOSE_FILTER.to_string()));
        Self { output, filter }
    }

    fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(filter) => EnvFilter::new(filter),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        }
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Installs the global subscriber; later calls do nothing.
pub fn init_observability(verbose: bool) {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_lookup(verbose, |key| std::env::var(key).ok());
        let env_filter = settings.env_filter();
        match settings.output {
            LogOutput::Off => {}
            LogOutput::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(&dir);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            LogOutput::Stderr => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}
