use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "warn";
const DEFAULT_LOG_FILE: &str = "commit2test.logs.jsonl";

/// Where log records go once logging is initialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSink {
    /// Nothing is installed.
    Disabled,
    /// Compact lines on stderr; stdout is left to command output.
    Stderr,
    /// One JSON object per line in this file.
    JsonFile(PathBuf),
}

/// Resolved logging settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub sink: LogSink,
    /// `EnvFilter` directive, such as `warn` or `commit2test_core=debug`.
    pub filter: String,
}

impl LogSettings {
    /// Reads `COMMIT2TEST_OBSERVABILITY_ENABLED`, `COMMIT2TEST_LOG_LEVEL`,
    /// `COMMIT2TEST_JSON_LOG_PATH` and `RUST_LOG`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LogSettings::from_env`] but reads values through `lookup`.
    ///
    /// `COMMIT2TEST_LOG_LEVEL` wins over `RUST_LOG`; an unknown enable flag
    /// leaves logging on.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let enabled = read("COMMIT2TEST_OBSERVABILITY_ENABLED")
            .and_then(|v| parse_bool_env(&v))
            .unwrap_or(true);
        let filter = read("COMMIT2TEST_LOG_LEVEL")
            .or_else(|| read("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let sink = match (enabled, read("COMMIT2TEST_JSON_LOG_PATH")) {
            (false, _) => LogSink::Disabled,
            (true, Some(path)) => LogSink::JsonFile(PathBuf::from(path)),
            (true, None) => LogSink::Stderr,
        };
        Self { sink, filter }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        tracing_subscriber::EnvFilter::try_new(&self.filter)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Initialize logging once per process from the environment.
///
/// See [`LogSettings::from_env`] for the variables read. Later calls are no-ops.
pub fn init_observability() {
    init_with(LogSettings::from_env());
}

/// Initialize logging once per process from explicit settings.
pub fn init_with(settings: LogSettings) {
    INIT.get_or_init(|| {
        let env_filter = settings.env_filter();
        match settings.sink {
            LogSink::Disabled => {}
            LogSink::JsonFile(path) => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| PathBuf::from("."));
                let _ = std::fs::create_dir_all(&dir);
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
                let writer = tracing_appender::rolling::never(&dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            LogSink::Stderr => {
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
