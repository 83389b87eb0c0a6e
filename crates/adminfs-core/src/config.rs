//! Runtime configuration shared by the helper and the worker.
//!
//! Loaded from TOML, then overridden by `ADMINFS_*` environment variables,
//! then validated. Every field has a default so an empty file is valid.

use crate::errors::{AdminError, Result};
use crate::request::CallerId;
use crate::{DEFAULT_ACTION_ID, MAX_MESSAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What the static authority answers for callers it has no rule for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    /// Unknown callers are refused
    #[default]
    Deny,
    /// Unknown callers are allowed
    Allow,
}

/// Rules for the static policy authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Answer for callers matched by neither list
    pub default: DefaultPolicy,
    /// Callers that are allowed
    pub allow: Vec<CallerId>,
    /// Callers that are refused; wins over `allow`
    pub deny: Vec<CallerId>,
}

/// adminfs configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Capability identifier checked by the policy authority
    pub action_id: String,
    /// How long a read authorization decision is honored, in milliseconds
    pub honor_window_ms: u64,
    /// How often the worker checks for cancellation, in milliseconds
    pub kill_poll_interval_ms: u64,
    /// Largest payload of a single control-channel message
    pub max_message_size: usize,
    /// Read size the helper uses when streaming a file out
    pub transfer_chunk_size: usize,
    /// Directory entries per `entries` event
    pub list_batch_size: usize,
    /// Static authority rules
    pub authority: AuthorityConfig,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            action_id: DEFAULT_ACTION_ID.to_string(),
            honor_window_ms: 5_000,
            kill_poll_interval_ms: 200,
            max_message_size: MAX_MESSAGE_SIZE,
            transfer_chunk_size: 64 * 1024,
            list_batch_size: 200,
            authority: AuthorityConfig::default(),
        }
    }
}

impl AdminConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AdminError::invalid(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from `ADMINFS_*` environment variables
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Override fields from an explicit set of variables
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if key.starts_with("ADMINFS_") {
                tracing::debug!(key = %key, "configuration overridden from environment");
            }
            match key.as_str() {
                "ADMINFS_ACTION_ID" => self.action_id = value,
                "ADMINFS_HONOR_WINDOW_MS" => self.honor_window_ms = parse_number(&key, &value)?,
                "ADMINFS_KILL_POLL_INTERVAL_MS" => {
                    self.kill_poll_interval_ms = parse_number(&key, &value)?;
                }
                "ADMINFS_MAX_MESSAGE_SIZE" => self.max_message_size = parse_number(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.action_id.trim().is_empty() {
            return Err(AdminError::invalid("action_id must not be empty"));
        }
        if self.honor_window_ms == 0 {
            return Err(AdminError::invalid("honor_window_ms must be positive"));
        }
        if self.kill_poll_interval_ms == 0 {
            return Err(AdminError::invalid("kill_poll_interval_ms must be positive"));
        }
        if self.max_message_size == 0 || self.transfer_chunk_size == 0 || self.list_batch_size == 0
        {
            return Err(AdminError::invalid(
                "message, chunk and batch sizes must be positive",
            ));
        }
        if self.transfer_chunk_size > self.max_message_size {
            return Err(AdminError::invalid(format!(
                "transfer_chunk_size ({}) exceeds max_message_size ({})",
                self.transfer_chunk_size, self.max_message_size
            )));
        }
        if u32::try_from(self.max_message_size).is_err() {
            return Err(AdminError::invalid("max_message_size does not fit a frame header"));
        }
        Ok(())
    }

    /// Honor window of read authorization decisions
    pub fn honor_window(&self) -> Duration {
        Duration::from_millis(self.honor_window_ms)
    }

    /// Cancellation poll interval of the worker's wait loop
    pub fn kill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.kill_poll_interval_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AdminError::invalid(format!("{key} is not a number: {value}")))
}
