use crate::error::Diagnostic;
use log::Level;
use std::collections::HashMap;

pub struct StructuredLogger {
    enabled: bool,
}

impl StructuredLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Logs a statement-level operation such as `Prepare(<sql>)`.
    pub fn log_statement(&self, level: Level, operation: &str, sql: &str) {
        if !self.enabled {
            return;
        }

        log::log!(level, "{}({})", operation, sql);
    }

    pub fn log_native_failure(&self, diagnostic: &Diagnostic, metadata: &HashMap<String, String>) {
        if !self.enabled {
            return;
        }

        let mut message = format!("Native call failed: {}", diagnostic);
        if let Some(state) = diagnostic.sqlstate_str() {
            message.push_str(&format!(", sqlstate={}", state));
        }
        for (key, value) in metadata {
            message.push_str(&format!(", {}={}", key, value));
        }

        log::error!("{}", message);
    }

    pub fn log_metric(&self, name: &str, value: f64, unit: &str) {
        if !self.enabled {
            return;
        }

        log::info!("Metric: {}={}{}", name, value, unit);
    }
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeError;
    use crate::native::NativeStatus;

    #[test]
    fn test_structured_logger_default() {
        let logger = StructuredLogger::default();
        assert!(logger.is_enabled());
    }

    #[test]
    fn test_structured_logger_disabled() {
        let logger = StructuredLogger::new(false);
        assert!(!logger.is_enabled());
        logger.log_statement(Level::Debug, "Prepare", "SELECT 1 FROM dual");
        logger.log_metric("rows_fetched", 3.0, "");
    }

    #[test]
    fn test_log_statement_levels() {
        let logger = StructuredLogger::new(true);
        logger.log_statement(Level::Debug, "Prepare", "SELECT A, B FROM T");
        logger.log_statement(Level::Trace, "Execute", "UPDATE T SET A = 1");
    }

    #[test]
    fn test_log_native_failure() {
        let logger = StructuredLogger::new(true);
        let diagnostic = Diagnostic::from_native(
            "SELECT * FROM missing",
            NativeStatus::Error,
            Some(NativeError::new(942, "table or view does not exist").with_sqlstate(*b"42S02")),
        );
        let mut metadata = HashMap::new();
        metadata.insert("statement".to_string(), "1".to_string());
        logger.log_native_failure(&diagnostic, &metadata);
    }
}
