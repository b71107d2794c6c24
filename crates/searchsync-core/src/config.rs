//! Engine configuration.
//!
//! One explicit struct passed at construction; there is no process-wide
//! client. Values come from a YAML file, then environment variables, then
//! whatever the caller sets directly, and are validated once via
//! [`EngineConfig::validate`].

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::WaitConfig;
use crate::entity::EntityKind;
use crate::error::SyncError;

/// Which engine dialect to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Task-based asynchronous writes, filter-expression queries.
    #[default]
    Meilisearch,
    /// Synchronous commits, faceted `q`/`fq` queries.
    Solr,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Meilisearch => write!(f, "meilisearch"),
            Self::Solr => write!(f, "solr"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meilisearch" | "meili" => Ok(Self::Meilisearch),
            "solr" => Ok(Self::Solr),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Environment profile. The test profile isolates index names and tightens
/// wait defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Production,
    Test,
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown profile '{other}'")),
        }
    }
}

/// Connection and behaviour settings for one search engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Engine base URL, e.g. `http://localhost:7700`. Required.
    pub base_url: String,
    pub api_key: Option<String>,
    pub profile: Profile,
    /// How long `wait` polls before giving up. Profile default when unset.
    pub wait_timeout_ms: Option<u64>,
    /// Delay between task polls. Profile default when unset.
    pub poll_interval_ms: Option<u64>,
    /// Per-HTTP-request timeout (default 30 s).
    pub request_timeout_ms: Option<u64>,
    /// Prefix for every index name under the test profile (default `test-`).
    pub test_prefix: Option<String>,
    /// Per-entity index name overrides.
    pub indexes: HashMap<EntityKind, String>,
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, SyncError> {
        serde_yaml::from_str(s)
            .map_err(|e| SyncError::NotConfigured(format!("invalid config file: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::NotConfigured(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load from `SEARCHSYNC_*` environment variables only.
    pub fn from_env() -> Result<Self, SyncError> {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `SEARCHSYNC_*` variables looked up through `get`.
    pub fn apply_env_with(
        &mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SyncError> {
        if let Some(v) = get("SEARCHSYNC_BACKEND") {
            self.backend = v.parse().map_err(SyncError::NotConfigured)?;
        }
        if let Some(v) = get("SEARCHSYNC_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("SEARCHSYNC_API_KEY") {
            self.api_key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = get("SEARCHSYNC_PROFILE") {
            self.profile = v.parse().map_err(SyncError::NotConfigured)?;
        }
        if let Some(v) = get("SEARCHSYNC_WAIT_TIMEOUT_MS") {
            self.wait_timeout_ms = Some(parse_ms("SEARCHSYNC_WAIT_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("SEARCHSYNC_POLL_INTERVAL_MS") {
            self.poll_interval_ms = Some(parse_ms("SEARCHSYNC_POLL_INTERVAL_MS", &v)?);
        }
        Ok(())
    }

    /// Fail fast on a missing or unusable engine location.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.base_url.trim().is_empty() {
            return Err(SyncError::NotConfigured("base_url is not set".into()));
        }
        let url = url::Url::parse(&self.base_url).map_err(|e| {
            SyncError::NotConfigured(format!("base_url '{}' is invalid: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::NotConfigured(format!(
                "base_url must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.poll_interval() > self.wait_timeout() {
            return Err(SyncError::NotConfigured(
                "poll_interval_ms exceeds wait_timeout_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        let default = match self.profile {
            Profile::Production => 60_000,
            Profile::Test => 5_000,
        };
        Duration::from_millis(self.wait_timeout_ms.unwrap_or(default))
    }

    pub fn poll_interval(&self) -> Duration {
        let default = match self.profile {
            Profile::Production => 500,
            Profile::Test => 50,
        };
        Duration::from_millis(self.poll_interval_ms.unwrap_or(default))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(30_000))
    }

    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            timeout: self.wait_timeout(),
            poll_interval: self.poll_interval(),
        }
    }

    /// Environment-qualified index name for `entity`.
    pub fn index_name(&self, entity: EntityKind) -> String {
        let name = self
            .indexes
            .get(&entity)
            .map(String::as_str)
            .unwrap_or_else(|| entity.default_index_name());
        match self.profile {
            Profile::Production => name.to_string(),
            Profile::Test => {
                let prefix = self.test_prefix.as_deref().unwrap_or("test-");
                format!("{prefix}{name}")
            }
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn parse_ms(key: &str, value: &str) -> Result<u64, SyncError> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::NotConfigured(format!("{key} must be milliseconds, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_url_is_not_configured() {
        let err = EngineConfig::default().validate().unwrap_err();
        assert!(matches!(err, SyncError::NotConfigured(_)));
        assert!(EngineConfig::new("not a url").validate().is_err());
        assert!(EngineConfig::new("ftp://engine").validate().is_err());
        assert!(EngineConfig::new("http://localhost:7700").validate().is_ok());
    }

    #[test]
    fn profile_defaults() {
        let mut c = EngineConfig::new("http://localhost:7700");
        assert_eq!(c.wait_timeout(), Duration::from_secs(60));
        assert_eq!(c.poll_interval(), Duration::from_millis(500));
        c.profile = Profile::Test;
        assert_eq!(c.wait_timeout(), Duration::from_secs(5));
        assert_eq!(c.poll_interval(), Duration::from_millis(50));
        c.wait_timeout_ms = Some(250);
        assert_eq!(c.wait_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_profile_prefixes_index_names() {
        let mut c = EngineConfig::new("http://localhost:7700");
        assert_eq!(c.index_name(EntityKind::Report), "reports-v3");
        c.profile = Profile::Test;
        assert_eq!(c.index_name(EntityKind::Report), "test-reports-v3");
        c.indexes.insert(EntityKind::Report, "reports-v4".into());
        c.test_prefix = Some("ci_".into());
        assert_eq!(c.index_name(EntityKind::Report), "ci_reports-v4");
    }

    #[test]
    fn yaml_and_env_layering() {
        let mut c = EngineConfig::from_yaml_str(
            "backend: solr\nbase_url: http://solr:8983\nindexes:\n  institution: inst-v9\n",
        )
        .unwrap();
        assert_eq!(c.backend, BackendKind::Solr);
        assert_eq!(c.index_name(EntityKind::Institution), "inst-v9");

        let env: HashMap<&str, &str> = [
            ("SEARCHSYNC_BACKEND", "meilisearch"),
            ("SEARCHSYNC_PROFILE", "test"),
            ("SEARCHSYNC_POLL_INTERVAL_MS", "10"),
        ]
        .into_iter()
        .collect();
        c.apply_env_with(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.backend, BackendKind::Meilisearch);
        assert_eq!(c.profile, Profile::Test);
        assert_eq!(c.poll_interval(), Duration::from_millis(10));
        assert_eq!(c.base_url(), "http://solr:8983");
    }

    #[test]
    fn bad_env_value_fails_fast() {
        let mut c = EngineConfig::default();
        let err = c
            .apply_env_with(|k| (k == "SEARCHSYNC_WAIT_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, SyncError::NotConfigured(_)));
    }
}
