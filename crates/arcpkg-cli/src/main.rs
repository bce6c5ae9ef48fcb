//! arcpkg - Main entry point

use arcpkg_cli::{Cli, Commands, Config, ConfigCommand};
use arcpkg_common::logging::{init_logging, LogConfig, LogLevel, LogOutput, LoggingGuard};
use clap::Parser;
use std::process;
use tracing::{error, warn};

fn main() {
    let _ = dotenvy::dotenv();

    // Parse command-line arguments
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        },
    };

    let _guard = setup_logging(&cli, &config);

    // Execute command
    if let Err(e) = execute_command(&cli, &config) {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Console logging for every command; packaging runs also write a rolling
/// file named after the package so later runs can preserve it in the AIP.
fn setup_logging(cli: &Cli, config: &Config) -> Option<LoggingGuard> {
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let mut builder = LogConfig::builder().level(level).output(LogOutput::Console);
    if let Commands::Package { package, .. } = &cli.command {
        builder = builder
            .output(LogOutput::Both)
            .log_dir(&config.log_dir)
            .log_file_prefix(format!("arcpkg-{package}"));
    }
    let defaults = builder.build();

    // Environment variables take precedence
    let log_config = defaults.clone().merge_env().unwrap_or(defaults);

    match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) if log_config.output != LogOutput::Console => {
            let console = LogConfig {
                output: LogOutput::Console,
                ..log_config
            };
            let guard = init_logging(&console).ok();
            warn!(error = %e, "File logging unavailable; logging to console only");
            guard
        },
        Err(e) => {
            eprintln!("Warning: logging disabled: {e}");
            None
        },
    }
}

/// Execute the CLI command
fn execute_command(cli: &Cli, config: &Config) -> arcpkg_cli::Result<()> {
    match &cli.command {
        Commands::Package {
            package,
            update,
            no_derivatives,
        } => arcpkg_cli::commands::package::run(config, package, *update, *no_derivatives),

        Commands::Accession { collection, source } => {
            arcpkg_cli::commands::accession::run(config, collection, source)
        },

        Commands::RemoveSip { package } => arcpkg_cli::commands::remove_sip::run(config, package),

        Commands::Status {
            package,
            verify,
            json,
        } => arcpkg_cli::commands::status::run(config, package, *verify, *json),

        Commands::Validate { path, json } => arcpkg_cli::commands::validate::run(path, *json),

        Commands::Config { command } => match command {
            ConfigCommand::Show => arcpkg_cli::commands::config::show(config),
        },
    }
}
