use std::process::ExitCode;

use clap::Parser;
use courier::{
    cli::{Cli, Command},
    config::{AppConfig, find_config_file},
    deliver,
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    courier_common::logging::init();

    let cli = Cli::parse();
    let config_path = find_config_file(cli.config.as_deref())?;
    let config = AppConfig::load(&config_path)?;
    tracing::debug!(path = %config_path.display(), "Loaded configuration");

    match cli.command {
        Command::Send(args) => {
            let message = args.into_message(config.sender.as_ref())?;
            let completion = deliver(config.server, message).await?;

            if completion.is_success() {
                println!("{completion}");
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("{completion}");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
