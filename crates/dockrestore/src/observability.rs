use std::borrow::Cow;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use librestore_cli::GlobalOpts;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const LOG_FORMAT_TEXT: &str = "text";
const LOG_FORMAT_JSON: &str = "json";
const DEFAULT_LOG_LEVEL: &str = "info";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Default)]
pub struct ObservabilityConfig {
    pub log_debug_flag: bool,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub log_format: Option<String>,
}

impl From<&GlobalOpts> for ObservabilityConfig {
    fn from(opts: &GlobalOpts) -> Self {
        Self {
            log_debug_flag: opts.debug,
            log_level: opts.log_level.to_owned(),
            log_file: Some(opts.log.to_owned()),
            log_format: opts.log_format.to_owned(),
        }
    }
}

fn detect_log_level(input: Option<String>, is_debug: bool) -> Result<Level> {
    // `--log-level` wins over `--debug` when both are given
    let log_level: Cow<str> = match input {
        None if is_debug => "debug".into(),
        None => DEFAULT_LOG_LEVEL.into(),
        Some(level) => level.into(),
    };
    Ok(Level::from_str(log_level.as_ref())?)
}

fn is_json(log_format: Option<&str>) -> Result<bool> {
    match log_format {
        None | Some(LOG_FORMAT_TEXT) => Ok(false),
        Some(LOG_FORMAT_JSON) => Ok(true),
        Some(unknown) => bail!("unknown log format: {}", unknown),
    }
}

fn stdout_layer(json: bool) -> BoxedLayer {
    if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    }
}

/// Appends to `path`, creating it if needed. Every record is timestamped by
/// the formatter, the same as on stdout.
fn file_layer(path: &Path, json: bool) -> Result<BoxedLayer> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {path:?}"))?;
    let writer = Arc::new(file);
    let layer = if json {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer().with_ansi(false).with_writer(writer).boxed()
    };
    Ok(layer)
}

pub fn init<T>(config: T) -> Result<()>
where
    T: Into<ObservabilityConfig>,
{
    let config = config.into();
    let level = detect_log_level(config.log_level, config.log_debug_flag)
        .with_context(|| "failed to parse log level")?;
    let json = is_json(config.log_format.as_deref())?;

    let mut layers = vec![stdout_layer(json)];
    if let Some(path) = config.log_file.as_deref() {
        layers.push(file_layer(path, json)?);
    }

    // RUST_LOG, when set, refines the level chosen on the command line
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize the tracing subscriber: {err}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_log_level_is_debug() {
        let test = vec![
            (None, true, Level::DEBUG),
            (Some("warn".to_owned()), true, Level::WARN),
            (None, false, Level::INFO),
            (Some("error".to_owned()), false, Level::ERROR),
        ];
        for (input, is_debug, expected) in test {
            assert_eq!(detect_log_level(input, is_debug).unwrap(), expected);
        }
        assert!(detect_log_level(Some("loud".to_owned()), false).is_err());
    }

    #[test]
    fn test_log_format() {
        assert!(!is_json(None).unwrap());
        assert!(!is_json(Some("text")).unwrap());
        assert!(is_json(Some("json")).unwrap());
        assert!(is_json(Some("yaml")).is_err());
    }

    #[test]
    fn test_file_layer_creates_log_file() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("restore.log");
        file_layer(&path, false)?;
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_file_layer_unwritable_location() {
        assert!(file_layer(Path::new("/nonexistent/dir/restore.log"), true).is_err());
    }
}
