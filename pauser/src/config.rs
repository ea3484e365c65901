use crate::gate::WaitPolicy;
use crate::log_source::LogSource;
use rcon::connection::DEFAULT_IO_TIMEOUT;
use rcon::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the pauser needs to run, already validated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: String,
    pub password: String,
    pub log_source: LogSource,
    pub wait: WaitPolicy,
    pub io_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Settings {
    pub fn new(server: impl Into<String>, password: impl Into<String>, log_source: LogSource) -> Self {
        Self {
            server: server.into(),
            password: password.into(),
            log_source,
            wait: WaitPolicy::default(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// A timeout of zero seconds means "wait forever".
pub fn startup_deadline(timeout_secs: u64) -> Option<Duration> {
    (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs))
}

/// Picks the log source: an explicit file (`-` for stdin) wins over the container.
pub fn select_log_source(container: Option<String>, log_file: Option<PathBuf>) -> Option<LogSource> {
    match (log_file, container) {
        (Some(path), _) if path.as_os_str() == "-" => Some(LogSource::Stdin),
        (Some(path), _) => Some(LogSource::File(path)),
        (None, Some(container)) if !container.is_empty() => Some(LogSource::Docker { container }),
        _ => None,
    }
}
