use std::path::Path;

use tracing::Subscriber;
use tracing_appender::rolling;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILE: &str = "bix.log";

/// Initialize the tracing/logging system.
///
/// Console layer (human or JSON) plus an optional daily-rolling file layer.
/// `RUST_LOG`, when set, wins over `log_level`.
pub fn init_logging(log_level: &str, log_file: Option<&Path>, json: bool) {
    if let Err(e) = build_subscriber(log_level, log_file, json).try_init() {
        eprintln!("Logging already initialised: {e}");
    }
}

/// Build the layered subscriber without installing it.
pub fn build_subscriber(
    log_level: &str,
    log_file: Option<&Path>,
    json: bool,
) -> Box<dyn Subscriber + Send + Sync> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let file_appender = log_file.map(|log_path| {
        let dir = log_path.parent().unwrap_or(Path::new("."));
        let filename = log_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());
        rolling::daily(dir, filename)
    });

    if json {
        let console = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr);
        let file = file_appender.map(|appender| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(appender)
                .with_target(true)
                .with_ansi(false)
        });
        Box::new(
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(file),
        )
    } else {
        let console = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(true)
            .with_writer(std::io::stderr);
        let file = file_appender.map(|appender| {
            tracing_subscriber::fmt::layer()
                .with_writer(appender)
                .with_target(true)
                .with_ansi(false)
        });
        Box::new(
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(file),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_contents(dir: &Path) -> String {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy().starts_with("bix.log"))
                    .unwrap_or(false)
            })
            .map(|path| std::fs::read_to_string(path).unwrap())
            .collect()
    }

    #[test]
    fn file_layer_writes_events() {
        let tmp = tempfile::tempdir().unwrap();
        let subscriber = build_subscriber("info", Some(&tmp.path().join("bix.log")), false);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(rows = 3, "Extract fetched");
            tracing::debug!("below the configured level");
        });

        let contents = log_contents(tmp.path());
        assert!(contents.contains("Extract fetched"));
        assert!(contents.contains("rows=3"));
        assert!(!contents.contains("below the configured level"));
    }

    #[test]
    fn json_file_layer_writes_one_object_per_event() {
        let tmp = tempfile::tempdir().unwrap();
        let subscriber = build_subscriber("info", Some(&tmp.path().join("bix.log")), true);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(count = 2, "Stray files found");
        });

        let contents = log_contents(tmp.path());
        let line = contents.lines().next().unwrap();
        let event: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(event["level"], "WARN");
        assert_eq!(event["fields"]["message"], "Stray files found");
        assert_eq!(event["fields"]["count"], 2);
    }
}
