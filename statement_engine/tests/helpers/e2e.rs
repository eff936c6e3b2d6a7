/// Helpers deciding whether the ODBC end-to-end tests can run.
use statement_engine::test_helpers::e2e_config;
use statement_engine::{OdbcEnvironment, Session};
use std::sync::{Arc, OnceLock};

static ENVIRONMENT: OnceLock<Option<OdbcEnvironment>> = OnceLock::new();

fn environment() -> Option<&'static OdbcEnvironment> {
    ENVIRONMENT
        .get_or_init(|| {
            let mut env = OdbcEnvironment::new();
            match env.init() {
                Ok(()) => Some(env),
                Err(e) => {
                    eprintln!("[ERROR] ODBC environment unavailable: {}", e);
                    None
                }
            }
        })
        .as_ref()
}

/// Opens a session on the configured DSN, `None` when it is not set or the
/// connection fails.
#[allow(dead_code)]
pub fn open_odbc_session() -> Option<Arc<Session>> {
    let config = e2e_config()?;
    let env = environment()?;
    match env.connect(&config) {
        Ok(native) => Some(Arc::new(Session::with_config(native, config))),
        Err(e) => {
            eprintln!("[ERROR] Connection failed: {}", e);
            None
        }
    }
}
