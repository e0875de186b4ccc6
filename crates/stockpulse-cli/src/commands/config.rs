//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use stockpulse_core::Config;

use crate::output::{Output, OutputFormat};

fn display_optional<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&config)?);
        }
        OutputFormat::Quiet => {
            println!("{}", config.api_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  api_url:                    {}", config.api_url);
            println!("  push_url:                   {}", config.push_url);
            println!("  forecast_url:               {}", config.forecast_url);
            println!("  topic:                      {}", config.topic);
            println!(
                "  reconnect_base_delay_ms:    {}",
                config.reconnect_base_delay_ms
            );
            println!(
                "  reconnect_max_delay_ms:     {}",
                config.reconnect_max_delay_ms
            );
            println!(
                "  max_retries:                {}",
                display_optional(config.max_retries)
            );
            println!("  join_timeout_secs:          {}", config.join_timeout_secs);
            println!(
                "  idle_timeout_secs:          {}",
                display_optional(config.idle_timeout_secs)
            );
            println!(
                "  job_idle_timeout_secs:      {}",
                display_optional(config.job_idle_timeout_secs)
            );
            println!(
                "  notification_lifetime_secs: {}",
                config.notification_lifetime_secs
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    config.set(&key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        set(
            "topic".to_string(),
            "warehouse".to_string(),
            Some(&path),
            &output,
        )
        .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("topic = \"warehouse\""));
    }

    #[test]
    fn test_set_unknown_key_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        let err = set("colour".to_string(), "red".to_string(), Some(&path), &output).unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(!path.exists());
    }

    #[test]
    fn test_display_optional() {
        assert_eq!(display_optional(Some(3)), "3");
        assert_eq!(display_optional(None::<u32>), "(not set)");
    }
}
