//! Application configuration
//!
//! Design Decision: `.env`-then-environment-variable layering, loaded once at startup
//!
//! Rationale: the secrets a server spec needs (e.g. `NODIT_API_KEY`) are the
//! same class of data the original config layer kept out of git - read from
//! the environment, with an optional `.env` file for local development. This
//! mirrors that layering instead of inventing a new one for the service
//! binary: `dotenvy::dotenv()` is attempted first (ignored if absent), then
//! `std::env::var` reads take over as the source of truth.
//!
//! Trade-offs:
//! - A config file format (TOML/JSON) for server specs vs. environment
//!   variables plus the in-code default registry: the design notes describe
//!   a small, fixed default registry (filesystem, nodit, etherscan, dune)
//!   rather than an open-ended config file, so there's no parser to write
//!   yet. Secrets still flow through the environment, never through argv or
//!   a committed file.

use std::collections::HashMap;
use std::env;

/// Environment variables that are passed through into a default registry
/// spec's `env` overlay at registration time, keyed by the spec name they
/// feed. `NODIT_API_KEY` is the one the design notes call out by name;
/// `ETHERSCAN_API_KEY`/`DUNE_API_KEY` follow the same convention for the
/// other default blockchain-analytics specs.
const SERVER_API_KEY_ENV_VARS: &[(&str, &str)] = &[
    ("nodit", "NODIT_API_KEY"),
    ("etherscan", "ETHERSCAN_API_KEY"),
    ("dune", "DUNE_API_KEY"),
];

/// Resolved application configuration, read once at process startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// `development` (default) or `production`; controls the log formatter.
    pub app_env: String,
    /// Explicit log level/filter directive, e.g. `debug` or `mcp_railway_service=trace`.
    /// When unset, [`crate::logging::init`] falls back to `RUST_LOG`, then `info`.
    pub log_level: Option<String>,
    /// Default-registry spec name -> API key, for every per-server key
    /// present in the environment. Absent keys are simply missing from the
    /// map rather than carrying an empty string.
    pub server_api_keys: HashMap<String, String>,
}

impl Settings {
    /// Load from `.env` (if present) and the process environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        let server_api_keys = SERVER_API_KEY_ENV_VARS
            .iter()
            .filter_map(|(server, var)| env::var(var).ok().map(|v| (server.to_string(), v)))
            .collect();

        Self {
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").ok(),
            server_api_keys,
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_defaults_app_env_to_development_when_unset() {
        if env::var("APP_ENV").is_err() {
            let settings = Settings::load();
            assert_eq!(settings.app_env, "development");
            assert!(!settings.is_production());
        }
    }

    #[test]
    fn server_api_key_env_vars_pass_through_when_set() {
        env::set_var("NODIT_API_KEY", "test-nodit-key");
        let settings = Settings::load();
        assert_eq!(
            settings.server_api_keys.get("nodit").map(String::as_str),
            Some("test-nodit-key")
        );
        env::remove_var("NODIT_API_KEY");
    }

    #[test]
    fn unset_server_api_key_is_absent_not_empty() {
        env::remove_var("DUNE_API_KEY");
        let settings = Settings::load();
        assert!(!settings.server_api_keys.contains_key("dune"));
    }
}
