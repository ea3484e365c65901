use clap::Parser;
use log::{error, info};
use pauser::config::{select_log_source, startup_deadline, Settings};
use pauser::coordinator::StopReason;
use pauser::gate::WaitPolicy;
use rcon::connection::DEFAULT_ADDR;
use rcon::RetryPolicy;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause the game server while players are downloading the map.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RCON server address as host:port
    #[arg(short = 's', long, env = "RCON_SERVER", default_value = DEFAULT_ADDR)]
    server: String,

    /// RCON password
    #[arg(short = 'p', long, env = "RCON_PASSWORD", default_value = "")]
    password: String,

    /// Container whose log is followed
    #[arg(short = 'c', long, env = "FACTORIO_CONTAINER")]
    container: Option<String>,

    /// Read the server log from a file instead (`-` for stdin)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Timeout in seconds for waiting the RCON server (0 waits forever)
    #[arg(short = 't', long, default_value = "0")]
    timeout: u64,

    /// Give up after this many refused connection attempts
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Seconds between connection attempts
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u64).range(1..))]
    retry_interval: u64,

    /// Attempts per console command before giving up
    #[arg(long, default_value = "3")]
    command_retries: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let Some(log_source) = select_log_source(args.container, args.log_file) else {
        error!("Either --container or --log-file is required");
        return ExitCode::FAILURE;
    };

    let mut settings = Settings::new(args.server, args.password, log_source);
    settings.wait = WaitPolicy {
        interval: Duration::from_secs(args.retry_interval),
        deadline: startup_deadline(args.timeout),
        max_attempts: args.max_attempts,
        ..WaitPolicy::default()
    };
    settings.retry = RetryPolicy::with_attempts(args.command_retries);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
                cancel.cancel();
            }
        });
    }

    match pauser::run(&settings, cancel).await {
        Ok(StopReason::LogEnded) => {
            info!("Server log ended");
            ExitCode::SUCCESS
        }
        Ok(StopReason::Cancelled) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["joinpause", "--container", "factorio"]).unwrap();
        assert_eq!(args.server, DEFAULT_ADDR);
        assert_eq!(args.retry_interval, 2);
        assert_eq!(args.timeout, 0);
    }

    #[test]
    fn test_zero_retry_interval_rejected() {
        let result = Args::try_parse_from(["joinpause", "--log-file", "-", "--retry-interval", "0"]);
        assert!(result.is_err());
    }
}
