//! Server specifications
//!
//! Design Decision: specs are plain, immutable-once-registered data
//!
//! Rationale: a Server Specification only describes *how* to spawn a child;
//! it never carries runtime state (that lives on [`crate::mcp::connection::ChildConnection`]).
//! Keeping it a bare serializable struct lets the Manager hand copies across
//! the registry/connect boundary without worrying about shared mutability.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Declarative description of how to spawn and configure one child.
///
/// Registering a name that already exists overwrites it; specs are never
/// mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auto_start: bool,
}

impl ServerSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            description: String::new(),
            auto_start: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }
}

/// Per-call overrides supplied to `connectServer`. Never persisted - the
/// registered [`ServerSpec`] is unaffected by a one-off override.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectOverrides {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// The spec actually used to spawn a process: the registered [`ServerSpec`]
/// with any [`ConnectOverrides`] overlaid, command/args/cwd replaced
/// wholesale when present, `env` merged key-wise with the override winning.
#[derive(Debug, Clone)]
pub struct EffectiveSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl EffectiveSpec {
    pub fn compose(spec: &ServerSpec, overrides: Option<&ConnectOverrides>) -> Self {
        let mut env = spec.env.clone();
        let mut command = spec.command.clone();
        let mut args = spec.args.clone();
        let mut cwd = spec.cwd.clone();

        if let Some(overrides) = overrides {
            if let Some(c) = &overrides.command {
                command = c.clone();
            }
            if let Some(a) = &overrides.args {
                args = a.clone();
            }
            if let Some(d) = &overrides.cwd {
                cwd = Some(d.clone());
            }
            for (k, v) in &overrides.env {
                env.insert(k.clone(), v.clone());
            }
        }

        Self {
            name: spec.name.clone(),
            command,
            args,
            env,
            cwd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_with_no_overrides_matches_spec() {
        let spec = ServerSpec::new("fs", "npx").with_args(["-y", "server-filesystem"]);
        let effective = EffectiveSpec::compose(&spec, None);
        assert_eq!(effective.command, "npx");
        assert_eq!(effective.args, vec!["-y", "server-filesystem"]);
    }

    #[test]
    fn override_env_wins_key_wise() {
        let spec = ServerSpec::new("nodit", "nodit-mcp").with_env("NODIT_API_KEY", "registered");
        let overrides = ConnectOverrides {
            env: HashMap::from([("NODIT_API_KEY".to_string(), "override".to_string())]),
            ..Default::default()
        };
        let effective = EffectiveSpec::compose(&spec, Some(&overrides));
        assert_eq!(effective.env.get("NODIT_API_KEY").unwrap(), "override");
    }

    #[test]
    fn override_env_is_merged_not_replaced() {
        let spec = ServerSpec::new("nodit", "nodit-mcp").with_env("A", "1");
        let overrides = ConnectOverrides {
            env: HashMap::from([("B".to_string(), "2".to_string())]),
            ..Default::default()
        };
        let effective = EffectiveSpec::compose(&spec, Some(&overrides));
        assert_eq!(effective.env.get("A").unwrap(), "1");
        assert_eq!(effective.env.get("B").unwrap(), "2");
    }

    #[test]
    fn override_command_replaces_wholesale() {
        let spec = ServerSpec::new("fs", "npx").with_args(["a", "b"]);
        let overrides = ConnectOverrides {
            command: Some("node".to_string()),
            args: Some(vec!["server.js".to_string()]),
            ..Default::default()
        };
        let effective = EffectiveSpec::compose(&spec, Some(&overrides));
        assert_eq!(effective.command, "node");
        assert_eq!(effective.args, vec!["server.js"]);
    }
}
