//! Shared application state for API handlers.

use std::sync::Arc;
use weir_core::datasource::{CollectContext, Registry};
use weir_core::{Config, ScrollBuffer};

/// Shared application state passed to all handlers.
pub struct AppState {
    /// The loaded configuration.
    pub config: Arc<Config>,
    /// Datasource registry resolving collection types.
    pub registry: Registry,
    /// The stdin scroll buffer, present only in `--stdin` mode.
    pub stdin: Option<ScrollBuffer>,
}

impl AppState {
    /// Create application state over a config with the builtin datasources.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            registry: Registry::builtin(),
            stdin: None,
        }
    }

    /// Create application state for `--stdin` mode.
    pub fn with_stdin(config: Arc<Config>, stdin: ScrollBuffer) -> Self {
        Self {
            config,
            registry: Registry::builtin(),
            stdin: Some(stdin),
        }
    }

    /// The context datasources collect under.
    pub fn collect_context(&self) -> CollectContext {
        CollectContext {
            config: Arc::clone(&self.config),
            stdin: self.stdin.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_over_empty_config() {
        let state = AppState::new(Arc::new(Config::parse("", "config.toml").unwrap()));
        assert!(state.stdin.is_none());
        assert!(state.config.collections.is_empty());
    }

    #[test]
    fn collect_context_shares_config() {
        let state = AppState::new(Arc::new(Config::stdin_default()));
        let cx = state.collect_context();
        assert_eq!(cx.config.collections.len(), 1);
    }
}
