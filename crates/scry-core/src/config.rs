//! REPL configuration shared across sessions.

use std::{fmt, sync::Arc};

use serde_json::Value;

use crate::eval::Evaluator;

/// Configuration for one REPL launch.
///
/// Constructed once, then shared read-only across every session via
/// `Arc`. Sessions look the evaluator up here instead of holding their
/// own copy.
#[derive(Clone)]
pub struct ReplConfig {
    /// Terminal window title.
    pub title: String,

    /// Value returned for blank input lines, bypassing evaluation.
    pub default_value: Option<Value>,

    /// Caller-supplied line evaluator. Mandatory: there is no ambient
    /// expression interpreter to fall back on.
    pub evaluator: Arc<dyn Evaluator>,

    /// Pre-shared secret for the handshake. `None` means sessions run
    /// unauthenticated; `launch` fills it with a generated one-time
    /// token instead of leaving it empty.
    pub secret: Option<String>,
}

impl ReplConfig {
    /// Window title used when the caller does not set one.
    pub const DEFAULT_TITLE: &'static str = "Windows Debugger";

    /// Create a configuration with the mandatory evaluator and default
    /// everything else.
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            title: Self::DEFAULT_TITLE.to_string(),
            default_value: None,
            evaluator,
            secret: None,
        }
    }

    /// Set the terminal window title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the value returned for blank input lines.
    #[must_use]
    pub fn with_default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Set the pre-shared secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

impl fmt::Debug for ReplConfig {
    // Redacts the secret so config logging cannot leak credentials.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplConfig")
            .field("title", &self.title)
            .field("default_value", &self.default_value)
            .field("secret", &self.secret.as_ref().map(|s| format!("<redacted {} bytes>", s.len())))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::eval::EvalError;

    fn echo() -> Arc<dyn Evaluator> {
        Arc::new(|line: &str| -> Result<Value, EvalError> { Ok(Value::from(line)) })
    }

    #[test]
    fn defaults() {
        let config = ReplConfig::new(echo());
        assert_eq!(config.title, ReplConfig::DEFAULT_TITLE);
        assert_eq!(config.default_value, None);
        assert_eq!(config.secret, None);
    }

    #[test]
    fn builder_setters() {
        let config = ReplConfig::new(echo())
            .with_title("inspector")
            .with_default_value(json!("ready"))
            .with_secret("hunter2");

        assert_eq!(config.title, "inspector");
        assert_eq!(config.default_value, Some(json!("ready")));
        assert_eq!(config.secret.as_deref(), Some("hunter2"));
    }

    #[test]
    fn debug_redacts_secret() {
        let config = ReplConfig::new(echo()).with_secret("hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("redacted"));
    }
}
