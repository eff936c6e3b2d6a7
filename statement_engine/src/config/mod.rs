use std::env;

pub const ENV_DSN: &str = "STATEMENT_ENGINE_DSN";
pub const ENV_LOGIN_TIMEOUT: &str = "STATEMENT_ENGINE_LOGIN_TIMEOUT";
pub const ENV_LOG_STATEMENTS: &str = "STATEMENT_ENGINE_LOG_STATEMENTS";

/// Settings of a database session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// ODBC connection string. Only needed by the ODBC native layer.
    pub connection_string: Option<String>,
    pub login_timeout_secs: Option<u32>,
    /// Log every prepared statement at debug level.
    pub log_statements: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            login_timeout_secs: None,
            log_statements: true,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl SessionConfig {
    /// Reads the configuration from the process environment. Unset or
    /// unparsable variables keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let connection_string = lookup(ENV_DSN).filter(|s| !s.trim().is_empty());
        let login_timeout_secs = match lookup(ENV_LOGIN_TIMEOUT) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    log::warn!("Ignoring invalid {}={}", ENV_LOGIN_TIMEOUT, raw);
                    defaults.login_timeout_secs
                }
            },
            None => defaults.login_timeout_secs,
        };
        let log_statements = lookup(ENV_LOG_STATEMENTS)
            .and_then(|raw| parse_flag(&raw))
            .unwrap_or(defaults.log_statements);

        Self {
            connection_string,
            login_timeout_secs,
            log_statements,
        }
    }

    pub fn with_connection_string(mut self, conn_str: impl Into<String>) -> Self {
        self.connection_string = Some(conn_str.into());
        self
    }
}
