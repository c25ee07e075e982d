//! Bearer token persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use drowsy_core::remote::StaticToken;
use drowsy_core::util::normalize_text_option;

pub const TOKEN_ENV_VAR: &str = "DROWSY_TOKEN";

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "drowsy-cli";
const KEYRING_USERNAME: &str = "bearer_token";

/// Where the active token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    Environment,
    Keychain,
}

pub struct TokenStore {
    username: String,
    #[cfg(test)]
    unavailable: bool,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(KEYRING_USERNAME)
    }
}

impl TokenStore {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            #[cfg(test)]
            unavailable: false,
        }
    }

    /// Store whose backend refuses every call, like a desktop without a
    /// secret service.
    #[cfg(test)]
    pub fn unavailable(username: &str) -> Self {
        Self {
            username: username.to_string(),
            unavailable: true,
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, String> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username).map_err(|error| error.to_string())
    }

    #[cfg(not(test))]
    pub fn load(&self) -> Result<Option<String>, String> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(normalize_text_option(Some(token))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(error.to_string()),
        }
    }

    #[cfg(test)]
    pub fn load(&self) -> Result<Option<String>, String> {
        if self.unavailable {
            return Err("secret service unavailable".to_string());
        }
        let guard = Self::test_store()
            .lock()
            .map_err(|error| error.to_string())?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    pub fn save(&self, token: &str) -> Result<(), String> {
        self.entry()?
            .set_password(token)
            .map_err(|error| error.to_string())
    }

    #[cfg(test)]
    pub fn save(&self, token: &str) -> Result<(), String> {
        if self.unavailable {
            return Err("secret service unavailable".to_string());
        }
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| error.to_string())?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    pub fn clear(&self) -> Result<(), String> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(error.to_string()),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> Result<(), String> {
        if self.unavailable {
            return Err("secret service unavailable".to_string());
        }
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| error.to_string())?;
        guard.remove(&self.username);
        Ok(())
    }

    /// Environment token if set, otherwise the stored one.
    pub fn resolve(
        &self,
        env_token: Option<String>,
    ) -> Result<Option<(String, TokenOrigin)>, String> {
        if let Some(token) = normalize_text_option(env_token) {
            return Ok(Some((token, TokenOrigin::Environment)));
        }
        Ok(self.load()?.map(|token| (token, TokenOrigin::Keychain)))
    }
}

/// Token source for remote requests.
///
/// An unreachable keychain is not fatal: requests go out unauthenticated and
/// only the `auth` commands surface the keychain error.
pub fn resolve_token_source(store: &TokenStore) -> StaticToken {
    match store.resolve(std::env::var(TOKEN_ENV_VAR).ok()) {
        Ok(resolved) => StaticToken::new(resolved.map(|(token, _)| token)),
        Err(error) => {
            tracing::warn!("Keychain unavailable, sending requests without a token: {}", error);
            StaticToken::none()
        }
    }
}
