use drowsy_core::util::normalize_text_option;

use crate::cli::AuthCommands;
use crate::commands::common::read_piped_lines;
use crate::error::CliError;
use crate::token_store::{TokenOrigin, TokenStore, TOKEN_ENV_VAR};

pub fn run_auth(command: AuthCommands) -> Result<(), CliError> {
    let store = TokenStore::default();
    match command {
        AuthCommands::SetToken { token } => {
            let token = match token {
                Some(token) => Some(token),
                None => read_piped_lines()?.into_iter().next(),
            };
            let token = normalize_text_option(token)
                .ok_or_else(|| CliError::Auth("Token must not be empty".to_string()))?;
            store.save(&token).map_err(CliError::Auth)?;
            println!("Token stored in keychain");
        }
        AuthCommands::Status => {
            let resolved = store
                .resolve(std::env::var(TOKEN_ENV_VAR).ok())
                .map_err(CliError::Auth)?;
            match resolved {
                Some((_, TokenOrigin::Environment)) => {
                    println!("Using token from {TOKEN_ENV_VAR}");
                }
                Some((_, TokenOrigin::Keychain)) => println!("Using token from keychain"),
                None => println!("No token configured; requests are sent unauthenticated"),
            }
        }
        AuthCommands::Clear => {
            store.clear().map_err(CliError::Auth)?;
            println!("Stored token removed");
        }
    }
    Ok(())
}
