//! Helpers shared by the integration tests.

use crate::config::SessionConfig;

/// Loads a `.env` file from the current directory or its parents, if one
/// exists. Variables already set in the environment win.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            log::warn!("Failed to load .env: {}", e);
        }
    }
}

/// Session configuration for end-to-end tests, `None` when no DSN is set.
pub fn e2e_config() -> Option<SessionConfig> {
    load_dotenv();
    let config = SessionConfig::from_env();
    config.connection_string.as_ref()?;
    Some(config)
}
