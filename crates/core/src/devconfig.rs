// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The devcontainer configuration document.
//!
//! The build CLI's `read-configuration` verb returns an open-ended key/value
//! document. Unknown keys must survive a round trip untouched, so the
//! document is an order-preserving map with typed accessors only for the
//! keys this agent inspects or rewrites: the runtime source, the lifecycle
//! hooks, the workspace mount, and the container user.

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::shell::quote_word;

/// Lifecycle hooks the build CLI's `up` verb accepts in singular form.
const LIFECYCLE_HOOKS: [&str; 6] = [
    "initializeCommand",
    "onCreateCommand",
    "updateContentCommand",
    "postCreateCommand",
    "postStartCommand",
    "postAttachCommand",
];

#[derive(Debug, Error)]
pub enum DevconfigError {
    #[error("devcontainer configuration is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("devcontainer configuration must be a JSON object")]
    NotAnObject,
}

/// An ordered, type-erased devcontainer configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevcontainerConfig(IndexMap<String, Value>);

impl DevcontainerConfig {
    pub fn from_value(value: Value) -> Result<Self, DevconfigError> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            _ => Err(DevconfigError::NotAnObject),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, DevconfigError> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    pub fn to_json_pretty(&self) -> String {
        let map: serde_json::Map<String, Value> =
            self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        serde_json::to_string_pretty(&Value::Object(map)).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Whether the document names something the build CLI can actually run.
    ///
    /// A merged configuration without any of these keys cannot produce a
    /// container; the caller falls back instead of attempting a build.
    pub fn has_runtime_source(&self) -> bool {
        if self.get("image").and_then(Value::as_str).is_some_and(|s| !s.is_empty()) {
            return true;
        }
        if self.get("dockerFile").and_then(Value::as_str).is_some_and(|s| !s.is_empty()) {
            return true;
        }
        if self
            .get("build")
            .and_then(|b| b.get("dockerfile"))
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
        {
            return true;
        }
        match self.get("dockerComposeFile") {
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            _ => false,
        }
    }

    /// Rewrite lifecycle hooks from the read-back plural form to the
    /// singular string form `up` expects.
    ///
    /// `read-configuration --include-merged-configuration` reports hooks as
    /// arrays under plural keys (`postCreateCommands`, ...), one entry per
    /// contributing layer. Each entry is a shell string, an argv array, or a
    /// named-command object. Entries are joined with ` && `. A singular key
    /// that is already present is never overwritten.
    pub fn normalize_lifecycle_hooks(&mut self) {
        for hook in LIFECYCLE_HOOKS {
            let plural = format!("{hook}s");
            let Some(value) = self.0.shift_remove(&plural) else {
                continue;
            };
            if self.0.contains_key(hook) {
                continue;
            }
            if let Some(joined) = join_command_entries(&value) {
                self.0.insert(hook.to_string(), Value::String(joined));
            }
        }
    }

    /// Point the workspace at a named volume instead of the default bind
    /// mount. Only these two keys can replace the default mount — the CLI's
    /// generic mount flag can only *add* mounts.
    pub fn set_workspace_volume(&mut self, volume: &str, folder: &str) {
        self.0.insert(
            "workspaceMount".to_string(),
            Value::String(format!("source={volume},target={folder},type=volume")),
        );
        self.0.insert("workspaceFolder".to_string(), Value::String(folder.to_string()));
    }

    /// The user the configuration declares for the workspace, if any.
    pub fn remote_user(&self) -> Option<&str> {
        self.get("remoteUser")
            .and_then(Value::as_str)
            .or_else(|| self.get("containerUser").and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    }
}

/// Join an array of lifecycle command entries into one shell string.
fn join_command_entries(value: &Value) -> Option<String> {
    let entries: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(command_to_shell).collect(),
        other => command_to_shell(other).into_iter().collect(),
    };
    if entries.is_empty() {
        None
    } else {
        Some(entries.join(" && "))
    }
}

/// Render one command entry (string, argv array, or named-command object)
/// as a shell string.
fn command_to_shell(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(tokens) => {
            let words: Vec<String> =
                tokens.iter().filter_map(Value::as_str).map(quote_word).collect();
            if words.is_empty() {
                None
            } else {
                Some(words.join(" "))
            }
        }
        Value::Object(named) => {
            let parts: Vec<String> = named.values().filter_map(command_to_shell).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" && "))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "devconfig_tests.rs"]
mod tests;
