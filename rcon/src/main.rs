use clap::Parser;
use log::info;
use rcon::connection::{DEFAULT_ADDR, DEFAULT_IO_TIMEOUT};
use rcon::{Console, RconConnection};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a single remote console command", long_about = None)]
struct Args {
    /// Console address as host:port
    #[arg(short = 's', long, env = "RCON_SERVER", default_value = DEFAULT_ADDR)]
    server: String,

    /// Console password
    #[arg(short = 'p', long, env = "RCON_PASSWORD", default_value = "")]
    password: String,

    /// Seconds to wait for each reply
    #[arg(long, default_value_t = DEFAULT_IO_TIMEOUT.as_secs())]
    io_timeout: u64,

    /// Command to run, e.g. `/help pause`
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let command = args.command.join(" ");

    info!("Connecting to: {}", args.server);
    let mut connection = RconConnection::connect(
        &args.server,
        &args.password,
        Duration::from_secs(args.io_timeout),
    )
    .await?;

    let response = connection.execute(&command).await?;
    println!("{}", response.trim_end());

    Ok(())
}
