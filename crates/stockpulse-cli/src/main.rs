//! StockPulse CLI
//!
//! Command-line interface for StockPulse - live inventory and model retraining.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stockpulse_core::Config;

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "stockpulse")]
#[command(about = "StockPulse - live inventory sync and forecast retraining")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log verbosity on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default location
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow live inventory updates until Ctrl-C
    Watch {
        /// Room to join (defaults to the configured topic)
        #[arg(short, long)]
        topic: Option<String>,
    },
    /// Retrain the forecast model from a CSV dataset
    Retrain {
        /// Dataset to upload
        file: PathBuf,
    },
    /// Query or change stock
    Stock {
        #[command(subcommand)]
        command: StockCommands,
    },
    /// Show service health and inventory summary
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum StockCommands {
    /// Add units to a product
    Add {
        /// Product ID
        product_id: String,
        /// Units to add
        quantity: u64,
    },
    /// Sell units of a product
    Sell {
        /// Product ID
        product_id: String,
        /// Units to sell
        quantity: u64,
    },
    /// Create a product
    Create {
        /// Product ID
        product_id: String,
        /// Starting quantity
        #[arg(default_value_t = 0)]
        initial_quantity: u64,
    },
    /// Remove a product
    #[command(alias = "rm")]
    Remove {
        /// Product ID
        product_id: String,
    },
    /// List the whole inventory
    #[command(alias = "ls")]
    List,
    /// Show one product
    Show {
        /// Product ID
        product_id: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_url, push_url, forecast_url, topic, max_retries, ...)
        key: String,
        /// Configuration value ("none" clears optional values)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config_file.as_ref();

    // Config commands work even when the file is broken
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config = Config::load_with_cli_override(config_path)?;

    match cli.command {
        Commands::Watch { topic } => commands::watch::watch(&config, topic, &output).await,
        Commands::Retrain { file } => commands::retrain::retrain(&config, &file, &output).await,
        Commands::Stock { command } => handle_stock_command(command, &config, &output).await,
        Commands::Status => commands::status::show(&config, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

async fn handle_stock_command(
    command: StockCommands,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        StockCommands::Add {
            product_id,
            quantity,
        } => commands::stock::add(config, &product_id, quantity, output).await,
        StockCommands::Sell {
            product_id,
            quantity,
        } => commands::stock::sell(config, &product_id, quantity, output).await,
        StockCommands::Create {
            product_id,
            initial_quantity,
        } => commands::stock::create(config, &product_id, initial_quantity, output).await,
        StockCommands::Remove { product_id } => {
            commands::stock::remove(config, &product_id, output).await
        }
        StockCommands::List => commands::stock::list(config, output).await,
        StockCommands::Show { product_id } => {
            commands::stock::show(config, &product_id, output).await
        }
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Log to stderr so stdout stays clean for --json
///
/// RUST_LOG overrides the level picked by -v.
fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "stockpulse_core={},stockpulse_cli={}",
            log_level, log_level
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stock_sell() {
        let cli = Cli::parse_from(["stockpulse", "--json", "stock", "sell", "P001", "5"]);
        assert!(cli.json);
        match cli.command {
            Commands::Stock {
                command:
                    StockCommands::Sell {
                        product_id,
                        quantity,
                    },
            } => {
                assert_eq!(product_id, "P001");
                assert_eq!(quantity, 5);
            }
            _ => panic!("Expected stock sell"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "stockpulse",
            "retrain",
            "sales.csv",
            "-vv",
            "--config",
            "/tmp/c.toml",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config_file, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Retrain { .. }));
    }
}
