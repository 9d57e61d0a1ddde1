//! `pgdata` command-line tool

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod logging;
mod settings;

use cli::Cli;
use logging::LoggingConfig;
use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let level = cli
        .log_level
        .as_deref()
        .or(settings.logging.level.as_deref());
    logging::init(
        LoggingConfig::default()
            .with_level(level)
            .with_json_log_dir(settings.logging.json_log_dir.clone()),
    )?;

    commands::run(cli, &settings).await
}
