//! Worker configuration.
//!
//! The version label and precache manifest are fixed per deploy. They are
//! injected into the loader, reaper and interception policy rather than read
//! from a global, so several generations can be exercised in one process.

use std::path::Path;

use offline_common::{OfflineError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Offline worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Current cache generation label.
    pub version: String,

    /// Origin the worker is registered on.
    pub origin: Url,

    /// Registration scope path.
    pub scope: String,

    /// Paths that must be cached before a generation is ready.
    pub precache: Vec<String>,

    /// Path served in place of a failed document navigation.
    pub offline_shell: String,

    /// Push notification presentation.
    pub notifications: NotificationConfig,
}

/// Push notification presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Title shown for every push.
    pub title: String,

    /// Body used when the push carries no text.
    pub default_body: String,

    pub icon: String,

    pub badge: String,

    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,

    /// Action id that opens the app.
    pub open_action: String,

    pub open_title: String,

    /// Action id that only dismisses.
    pub dismiss_action: String,

    pub dismiss_title: String,

    /// Path opened by the open action.
    pub open_path: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            version: "monitoring-app-v1".to_string(),
            origin: Url::parse("http://localhost:5000/").expect("static origin URL is valid"),
            scope: "/".to_string(),
            precache: vec![
                "/".to_string(),
                "/manifest.json".to_string(),
                "/icon-192.png".to_string(),
                "/icon-512.png".to_string(),
            ],
            offline_shell: "/".to_string(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "Monitoring System".to_string(),
            default_body: "New notification".to_string(),
            icon: "/icon-192.png".to_string(),
            badge: "/icon-192.png".to_string(),
            vibrate: vec![100, 50, 100],
            open_action: "explore".to_string(),
            open_title: "Open app".to_string(),
            dismiss_action: "close".to_string(),
            dismiss_title: "Close".to_string(),
            open_path: "/".to_string(),
        }
    }
}

impl OfflineConfig {
    /// Default configuration for `origin`.
    pub fn for_origin(origin: Url) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            OfflineError::config_with_source(format!("cannot read {}", path.display()), e)
        })?;
        Self::from_json_str(&json)
    }

    /// Same configuration under another version label.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Check the invariants the worker relies on.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(OfflineError::config("version label must not be empty"));
        }
        if self.precache.is_empty() {
            return Err(OfflineError::config("precache manifest must not be empty"));
        }
        if self.origin.cannot_be_a_base() {
            return Err(OfflineError::config(format!(
                "origin {} cannot resolve paths",
                self.origin
            )));
        }
        self.manifest_urls()?;
        self.shell_url()?;
        self.scope_url()?;
        Ok(())
    }

    /// Resolve a path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin.join(path).map_err(|e| {
            OfflineError::config_with_source(format!("cannot resolve {path}"), e)
        })
    }

    /// Manifest entries as absolute URLs, in manifest order.
    pub fn manifest_urls(&self) -> Result<Vec<Url>> {
        self.precache.iter().map(|p| self.resolve(p)).collect()
    }

    /// Absolute URL of the offline shell.
    pub fn shell_url(&self) -> Result<Url> {
        self.resolve(&self.offline_shell)
    }

    /// Absolute URL of the registration scope.
    pub fn scope_url(&self) -> Result<Url> {
        self.resolve(&self.scope)
    }

    /// Whether a page at `url` falls under this worker's scope.
    pub fn in_scope(&self, url: &Url) -> bool {
        match self.scope_url() {
            Ok(scope) => url.as_str().starts_with(scope.as_str()),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deploy_manifest() {
        let config = OfflineConfig::default();
        assert_eq!(config.version, "monitoring-app-v1");
        assert_eq!(
            config.precache,
            vec!["/", "/manifest.json", "/icon-192.png", "/icon-512.png"]
        );
        assert_eq!(config.notifications.open_action, "explore");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = OfflineConfig::from_json_str(
            r#"{ "version": "monitoring-app-v2", "origin": "https://mon.example.com/" }"#,
        )
        .unwrap();
        assert_eq!(config.version, "monitoring-app-v2");
        assert_eq!(config.precache.len(), 4);
        assert_eq!(
            config.manifest_urls().unwrap()[1].as_str(),
            "https://mon.example.com/manifest.json"
        );
    }

    #[test]
    fn test_empty_manifest_rejected() {
        let err = OfflineConfig::from_json_str(r#"{ "precache": [] }"#).unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_empty_version_rejected() {
        let config = OfflineConfig::default().with_version("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let err = OfflineConfig::from_json_str("{ not json").unwrap_err();
        assert_eq!(err.category(), "json");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = OfflineConfig::load("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_in_scope() {
        let mut config =
            OfflineConfig::for_origin(Url::parse("https://mon.example.com/").unwrap());
        assert!(config.in_scope(&Url::parse("https://mon.example.com/reports").unwrap()));
        assert!(!config.in_scope(&Url::parse("https://other.example.com/").unwrap()));

        config.scope = "/app/".to_string();
        assert!(config.in_scope(&Url::parse("https://mon.example.com/app/x").unwrap()));
        assert!(!config.in_scope(&Url::parse("https://mon.example.com/admin").unwrap()));
    }
}
