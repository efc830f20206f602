use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_HEADER_PREFIX: &str = "openfeature_";
pub const DEFAULT_NAMESPACE: &str = "default";

/// Stage configuration, supplied once at construction.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StageConfig {
    /// Address of the flag evaluation provider
    pub endpoint: String,
    /// Credential forwarded to the provider
    pub authorization: String,
    /// Provider backend. Unrecognized or empty selects the no-op provider.
    pub provider: String,
    /// Request headers copied into the evaluation context attributes
    pub context_header_keys: Vec<String>,
    /// Logical name of this client, sent to the provider as `User-Agent` and attached to logs
    pub service: String,
    /// Prefix for produced header names, `openfeature_` when empty
    pub feature_header_prefix: String,
    /// Flag key to kind (`int`, `float`, `string`, `bool`, `object`).
    ///
    /// Note: Kept as plain strings so that unknown kinds can be skipped
    /// instead of rejecting the whole configuration.
    pub flags: HashMap<String, String>,
    /// Header whose value becomes the targeting key
    pub user_header: String,
    /// Flipt namespace, `default` when unset
    pub namespace: Option<String>,
    /// Per-request evaluation deadline. Unset waits for every evaluation.
    pub evaluation_timeout_ms: Option<u64>,
    /// Upper bound on in-flight evaluations per request. Unset is unbounded.
    pub max_concurrent_evaluations: Option<usize>,
}

impl StageConfig {
    pub fn header_prefix(&self) -> &str {
        if self.feature_header_prefix.is_empty() {
            DEFAULT_HEADER_PREFIX
        } else {
            &self.feature_header_prefix
        }
    }

    pub fn namespace(&self) -> &str {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => ns,
            _ => DEFAULT_NAMESPACE,
        }
    }

    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_ms.map(Duration::from_millis)
    }

    pub fn user_header(&self) -> Option<&str> {
        Some(self.user_header.as_str()).filter(|h| !h.is_empty())
    }
}
