use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;

use super::{RegistryError, RegistryResult};

/// Directive used when `RUST_LOG` is unset or unparsable.
const DEFAULT_DIRECTIVE: &str = "info";

/// Install the subscriber for one validation run.
///
/// Events pass the `RUST_LOG` filter and land in `path` as one JSON object
/// per line. Warnings and errors are echoed to stderr as well.
pub fn init_run_logging(path: &Path) -> RegistryResult<()> {
    let log_file = open_log(path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_names(true)
        .with_writer(Mutex::new(log_file));
    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_target(false)
        .with_writer(io::stderr)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(run_filter())
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| RegistryError::Logging(err.to_string()))
}

fn run_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn open_log(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn run_log_is_appended_to() {
        let path =
            std::env::temp_dir().join(format!("intake_log_{}.ndjson", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{\"event\":\"run_started\"}\n").expect("seed");

        let mut file = open_log(&path).expect("open");
        file.write_all(b"{\"event\":\"run_finished\"}\n").expect("write");

        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.starts_with("{\"event\":\"run_started\"}"));
    }
}
