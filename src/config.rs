//! Configuration loading and management.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// Top-level replication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default)]
    pub builder: BuilderConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub matcher: MatcherConfig,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            builder: BuilderConfig::default(),
            backend: BackendConfig::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

/// Builder rate-limiting and retry policy, per spec §4.8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Fixed delay between two successive CREATE requests.
    #[serde(default = "default_inter_request_delay_ms")]
    pub inter_request_delay_ms: u64,

    /// Maximum retry attempts for a rate-limited CREATE before aborting.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base for the exponential backoff (`base * 2^attempt`).
    #[serde(default = "default_backoff_base_ms")]
    pub rate_limit_backoff_base_ms: u64,

    /// Upper bound on any single backoff delay.
    #[serde(default = "default_backoff_cap_ms")]
    pub rate_limit_backoff_cap_ms: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            inter_request_delay_ms: default_inter_request_delay_ms(),
            max_retries: default_max_retries(),
            rate_limit_backoff_base_ms: default_backoff_base_ms(),
            rate_limit_backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_inter_request_delay_ms() -> u64 {
    4000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_cap_ms() -> u64 {
    60_000
}

/// Backend adapter response-cache policy, per spec §5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

fn default_cache_ttl_seconds() -> u64 {
    60
}

/// Reference Matcher thresholds, per spec §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Minimum similarity score (0-100) for `searchTagsByName`/`findSimilarTags`.
    #[serde(default = "default_name_similarity_threshold")]
    pub name_similarity_threshold: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            name_similarity_threshold: default_name_similarity_threshold(),
        }
    }
}

fn default_name_similarity_threshold() -> u32 {
    70
}

impl ReplicationConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ReplicationConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` if given and present, else from the platform config
    /// directory's `tagconf-replicate/config.yaml` if present, else from
    /// env-var overrides on top of defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        if let Some(path) = path {
            if let Ok(config) = Self::load(path) {
                return config;
            }
        } else if let Some(default_path) = Self::default_config_path() {
            if let Ok(config) = Self::load(&default_path) {
                return config;
            }
        }

        let mut config = Self::default();

        if let Ok(delay) = std::env::var("TAGCONF_INTER_REQUEST_DELAY_MS") {
            if let Ok(delay) = delay.parse() {
                config.builder.inter_request_delay_ms = delay;
            }
        }
        if let Ok(retries) = std::env::var("TAGCONF_MAX_RETRIES") {
            if let Ok(retries) = retries.parse() {
                config.builder.max_retries = retries;
            }
        }
        if let Ok(ttl) = std::env::var("TAGCONF_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse() {
                config.backend.cache_ttl_seconds = ttl;
            }
        }
        if let Ok(threshold) = std::env::var("TAGCONF_NAME_SIMILARITY_THRESHOLD") {
            if let Ok(threshold) = threshold.parse() {
                config.matcher.name_similarity_threshold = threshold;
            }
        }

        config
    }

    /// The platform config directory's default path for this tool, e.g.
    /// `~/.config/tagconf-replicate/config.yaml` on Linux.
    fn default_config_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tagconf-replicate").join("config.yaml"))
    }
}

/// Curated table of tag types known to push a custom event, used by the
/// Dependency Resolver to add `TRIGGER_CUSTOM_EVENT` edges for tag types
/// that don't declare an explicit `eventName` parameter (spec §4.1, §9 open
/// question: "implementations MAY expose an extension point").
///
/// Seeded with Google Analytics 4 event tags; the table is a
/// `tag_type -> event_name` mapping, not the reverse, since several tag
/// types may push the same event name.
pub static KNOWN_TEMPLATE_EVENTS: LazyLock<std::sync::Mutex<HashMap<String, String>>> =
    LazyLock::new(|| {
        let mut map = HashMap::new();
        map.insert("gaawe".to_string(), "event".to_string());
        map.insert("googtag".to_string(), "config".to_string());
        std::sync::Mutex::new(map)
    });

/// Look up the event a tag type is known to push.
pub fn known_event_for_tag_type(tag_type: &str) -> Option<String> {
    KNOWN_TEMPLATE_EVENTS
        .lock()
        .expect("known template events lock poisoned")
        .get(tag_type)
        .cloned()
}

/// Register an additional `tag_type -> event_name` entry. Exposed as the
/// extension point spec.md §9 calls out for unknown tag types.
pub fn register_known_template_event(tag_type: impl Into<String>, event_name: impl Into<String>) {
    KNOWN_TEMPLATE_EVENTS
        .lock()
        .expect("known template events lock poisoned")
        .insert(tag_type.into(), event_name.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ReplicationConfig::default();
        assert_eq!(config.builder.inter_request_delay_ms, 4000);
        assert_eq!(config.builder.max_retries, 3);
        assert_eq!(config.builder.rate_limit_backoff_base_ms, 1000);
        assert_eq!(config.builder.rate_limit_backoff_cap_ms, 60_000);
        assert_eq!(config.backend.cache_ttl_seconds, 60);
        assert_eq!(config.matcher.name_similarity_threshold, 70);
    }

    #[test]
    fn known_template_events_seeded_with_ga4() {
        assert_eq!(
            known_event_for_tag_type("gaawe"),
            Some("event".to_string())
        );
    }

    #[test]
    fn register_known_template_event_extends_table() {
        register_known_template_event("custom_tag_type_test", "custom_event_test");
        assert_eq!(
            known_event_for_tag_type("custom_tag_type_test"),
            Some("custom_event_test".to_string())
        );
    }
}
