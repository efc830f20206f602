use http::HeaderMap;
use std::collections::HashMap;

/// Request-derived inputs for flag evaluation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationContext {
    /// Subject that targeting rules are evaluated against, empty when unknown
    pub targeting_key: String,
    pub attributes: HashMap<String, String>,
}

/// Derives an [`EvaluationContext`] from the configured request headers.
#[derive(Clone, Debug)]
pub struct EvaluationContextBuilder {
    context_header_keys: Vec<String>,
    user_header: Option<String>,
}

impl EvaluationContextBuilder {
    pub fn new(context_header_keys: Vec<String>, user_header: Option<String>) -> Self {
        Self {
            context_header_keys,
            user_header,
        }
    }

    /// Missing headers map to empty strings, so every configured key is present
    /// in the attributes.
    pub fn build(&self, headers: &HeaderMap) -> EvaluationContext {
        let attributes = self
            .context_header_keys
            .iter()
            .map(|key| (key.clone(), header_value(headers, key)))
            .collect();

        let targeting_key = self
            .user_header
            .as_deref()
            .map(|name| header_value(headers, name))
            .unwrap_or_default();

        EvaluationContext {
            targeting_key,
            attributes,
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    // An invalid header name never matches
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}
