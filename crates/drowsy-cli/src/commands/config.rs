use std::path::Path;

use crate::cli::ConfigCommands;
use crate::config_file;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, config_path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            subject_id,
            member_id,
            fetch_schema,
            threshold,
            cooldown_ms,
            periodic_interval_ms,
        } => {
            let mut config = config_file::load_from_path(config_path).map_err(CliError::Config)?;
            if api_base_url.is_some() {
                config.api_base_url = api_base_url;
            }
            if subject_id.is_some() {
                config.subject_id = subject_id;
            }
            if member_id.is_some() {
                config.member_id = member_id;
            }
            if let Some(schema) = fetch_schema {
                config.fetch_schema = schema.into();
            }
            if let Some(threshold) = threshold {
                config.capture.threshold = threshold;
            }
            if let Some(cooldown_ms) = cooldown_ms {
                config.capture.cooldown_ms = cooldown_ms;
            }
            if let Some(interval_ms) = periodic_interval_ms {
                config.capture.periodic_interval_ms = interval_ms;
            }

            config
                .validate()
                .map_err(|error| CliError::Config(error.to_string()))?;
            config_file::save_to_path(&config, config_path).map_err(CliError::Config)?;
            println!("Saved config to {}", config_path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let config = config_file::load_effective(config_path).map_err(CliError::Config)?;
            eprintln!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
