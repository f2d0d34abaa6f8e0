//! Environment loading and run settings
//!
//! Settings are layered once at startup and then passed around immutably:
//!
//! 1. built-in defaults
//! 2. the `settings:` block of the YAML config
//! 3. environment (`FOREMAN_URL`, `FOREMAN_USER`, `FOREMAN_PASSWORD`, `FOREMAN_ORG`)
//! 4. command-line flags
//!
//! Call `load_environment()` early in main() so values from
//! `/etc/hg-sync/environment` or `.env` are visible to step 3.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Alternative paths to check (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &["/etc/hg-sync/environment", ".env"];

/// Load environment variables from the canonical configuration file.
///
/// `HG_SYNC_ENV_FILE` wins over the default locations. Existing environment
/// variables are never overridden. Returns the path that was loaded.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("HG_SYNC_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);
    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded_count = 0;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = parse_env_line(line) {
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        loaded_count += 1;
                    } else {
                        debug!("Skipped (already set): {}", key);
                    }
                }
            }
            info!("Loaded {} environment variables from {}", loaded_count, path);
            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

/// Parse a single `KEY=VALUE` line, stripping surrounding quotes.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Immutable settings for one reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Base URI of the Satellite/Foreman server
    pub uri: String,
    pub user: String,
    pub pass: Option<String>,
    /// Organization every request is scoped to
    pub organization_id: String,
    /// Per-request timeout in seconds; zero or negative disables it
    pub timeout: i64,
    pub verify_ssl: bool,
    /// Page size for listings
    pub per_page: u32,
    /// Path prefix of the primary API surface
    pub primary_api: String,
    /// Path prefix of the older API surface used after server errors
    pub fallback_api: String,
    /// Delete every hostgroup before building the tree
    pub teardown: bool,
    /// Update existing hostgroups instead of failing on conflicts
    pub update: bool,
    pub skip_creation: bool,
    pub skip_combos: bool,
    /// Do not write anything remotely
    pub noop: bool,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            uri: "https://localhost".to_string(),
            user: "admin".to_string(),
            pass: None,
            organization_id: "1".to_string(),
            timeout: 300,
            verify_ssl: false,
            per_page: 100,
            primary_api: "/api/v2".to_string(),
            fallback_api: "/api/v1".to_string(),
            teardown: false,
            update: false,
            skip_creation: false,
            skip_combos: false,
            noop: false,
            verbose: false,
        }
    }
}

/// Partial settings from one configuration layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverrides {
    pub uri: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    #[serde(alias = "org")]
    pub organization_id: Option<String>,
    pub timeout: Option<i64>,
    pub verify_ssl: Option<bool>,
    pub per_page: Option<u32>,
    pub primary_api: Option<String>,
    pub fallback_api: Option<String>,
    pub teardown: Option<bool>,
    pub update: Option<bool>,
    pub skip_creation: Option<bool>,
    pub skip_combos: Option<bool>,
    pub noop: Option<bool>,
    pub verbose: Option<bool>,
}

impl SettingsOverrides {
    /// Read the connection-related overrides from the environment
    pub fn from_env() -> Self {
        Self {
            uri: get_config_opt("FOREMAN_URL"),
            user: get_config_opt("FOREMAN_USER"),
            pass: get_config_opt("FOREMAN_PASSWORD"),
            organization_id: get_config_opt("FOREMAN_ORG"),
            ..Default::default()
        }
    }
}

impl Settings {
    /// Layer the given overrides on top of the defaults, lowest priority first
    pub fn layered<'a>(layers: impl IntoIterator<Item = &'a SettingsOverrides>) -> Self {
        layers
            .into_iter()
            .fold(Self::default(), |settings, layer| settings.merge(layer))
    }

    /// Apply one override layer
    pub fn merge(mut self, layer: &SettingsOverrides) -> Self {
        fn take<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        take(&mut self.uri, &layer.uri);
        take(&mut self.user, &layer.user);
        if layer.pass.is_some() {
            self.pass = layer.pass.clone();
        }
        take(&mut self.organization_id, &layer.organization_id);
        take(&mut self.timeout, &layer.timeout);
        take(&mut self.verify_ssl, &layer.verify_ssl);
        take(&mut self.per_page, &layer.per_page);
        take(&mut self.primary_api, &layer.primary_api);
        take(&mut self.fallback_api, &layer.fallback_api);
        take(&mut self.teardown, &layer.teardown);
        take(&mut self.update, &layer.update);
        take(&mut self.skip_creation, &layer.skip_creation);
        take(&mut self.skip_combos, &layer.skip_combos);
        take(&mut self.noop, &layer.noop);
        take(&mut self.verbose, &layer.verbose);
        self
    }

    /// Per-request timeout, `None` when disabled
    pub fn request_timeout(&self) -> Option<Duration> {
        u64::try_from(self.timeout)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Check the settings are usable before any request is made
    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(Error::invalid_config("uri must not be empty"));
        }
        if self.per_page == 0 {
            return Err(Error::invalid_config("per_page must be greater than zero"));
        }
        if self.pass.is_none() && !self.noop {
            return Err(missing_password());
        }
        Ok(())
    }

    /// Whether a run reads from the server. A noop run still lists
    /// hostgroups for teardown and combos.
    fn reads_remote(&self, has_combos: bool) -> bool {
        !self.noop || self.teardown || (has_combos && !self.skip_combos)
    }

    /// Fail before any request if the run needs the server but has no password
    pub fn require_credentials(&self, has_combos: bool) -> Result<()> {
        if self.pass.is_none() && self.reads_remote(has_combos) {
            return Err(missing_password());
        }
        Ok(())
    }
}

fn missing_password() -> Error {
    Error::invalid_config("no password configured; set FOREMAN_PASSWORD, settings.pass or --pass")
}
