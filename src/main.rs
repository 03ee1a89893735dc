use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use sessionkeep::cli::{parse_args, run_command, USAGE};
use sessionkeep::config::SessionConfig;

const DEFAULT_LOG_FILTER: &str = "sessionkeep=info";

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let command = match parse_args(std::env::args()) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    init_logging();
    let config = SessionConfig::from_env()?;
    run_command(command, config).await
}
