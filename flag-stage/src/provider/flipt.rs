use crate::context::EvaluationContext;
use crate::errors::{EvaluationError, StageError};
use crate::evaluator::{FlagEvaluator, ObjectValue};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

const BOOLEAN_PATH: &str = "evaluate/v1/boolean";
const VARIANT_PATH: &str = "evaluate/v1/variant";
const HEALTH_PATH: &str = "health";
const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationRequest<'a> {
    namespace_key: &'a str,
    flag_key: &'a str,
    entity_id: &'a str,
    context: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct BooleanResponse {
    enabled: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantResponse {
    #[serde(rename = "match")]
    matched: bool,
    #[serde(default)]
    variant_key: String,
    #[serde(default)]
    variant_attachment: String,
}

/// Evaluator backed by Flipt's HTTP evaluation API.
#[derive(Clone)]
pub struct FliptProvider {
    client: reqwest::Client,
    boolean_url: Url,
    variant_url: Url,
    health_url: Url,
    namespace: String,
}

impl FliptProvider {
    /// `service` identifies this client to Flipt through the `User-Agent` header.
    pub fn new(
        endpoint: &str,
        authorization: &str,
        namespace: &str,
        service: &str,
    ) -> Result<Self, StageError> {
        if endpoint.is_empty() {
            return Err(StageError::MissingEndpoint(super::FLIPT.to_string()));
        }

        let mut base_url = Url::parse(endpoint)?;
        // Url::join replaces the last segment unless the path ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        if !authorization.is_empty() {
            let mut value = HeaderValue::from_str(&format!("Bearer {authorization}"))
                .map_err(|_| StageError::InvalidAuthorization)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let user_agent = if service.is_empty() {
            DEFAULT_USER_AGENT
        } else {
            service
        };
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            boolean_url: base_url.join(BOOLEAN_PATH)?,
            variant_url: base_url.join(VARIANT_PATH)?,
            health_url: base_url.join(HEALTH_PATH)?,
            namespace: namespace.to_string(),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: &Url,
        key: &str,
        ctx: &EvaluationContext,
    ) -> Result<T, EvaluationError> {
        let body = EvaluationRequest {
            namespace_key: &self.namespace,
            flag_key: key,
            entity_id: &ctx.targeting_key,
            context: &ctx.attributes,
        };

        let response = self.client.post(url.clone()).json(&body).send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<T>().await?),
            StatusCode::NOT_FOUND => Err(EvaluationError::FlagNotFound(key.to_string())),
            status => Err(EvaluationError::Provider {
                key: key.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    /// Returns the matched variant, or `None` when no rule matched.
    async fn variant(
        &self,
        key: &str,
        ctx: &EvaluationContext,
    ) -> Result<Option<VariantResponse>, EvaluationError> {
        let response: VariantResponse = self.post(&self.variant_url, key, ctx).await?;
        Ok(Some(response).filter(|r| r.matched))
    }
}

fn type_mismatch(key: &str, expected: &'static str, value: impl Into<String>) -> EvaluationError {
    EvaluationError::TypeMismatch {
        key: key.to_string(),
        expected,
        value: value.into(),
    }
}

#[async_trait]
impl FlagEvaluator for FliptProvider {
    fn name(&self) -> &'static str {
        super::FLIPT
    }

    async fn probe(&self) -> Result<(), EvaluationError> {
        let response = self.client.get(self.health_url.clone()).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EvaluationError::Provider {
                key: HEALTH_PATH.to_string(),
                status: response.status().as_u16(),
            })
        }
    }

    async fn evaluate_int(
        &self,
        key: &str,
        default: i64,
        ctx: &EvaluationContext,
    ) -> Result<i64, EvaluationError> {
        match self.variant(key, ctx).await? {
            Some(r) => r
                .variant_key
                .parse()
                .map_err(|_| type_mismatch(key, "int", r.variant_key)),
            None => Ok(default),
        }
    }

    async fn evaluate_float(
        &self,
        key: &str,
        default: f64,
        ctx: &EvaluationContext,
    ) -> Result<f64, EvaluationError> {
        match self.variant(key, ctx).await? {
            Some(r) => r
                .variant_key
                .parse()
                .map_err(|_| type_mismatch(key, "float", r.variant_key)),
            None => Ok(default),
        }
    }

    async fn evaluate_string(
        &self,
        key: &str,
        default: String,
        ctx: &EvaluationContext,
    ) -> Result<String, EvaluationError> {
        Ok(self
            .variant(key, ctx)
            .await?
            .map(|r| r.variant_key)
            .unwrap_or(default))
    }

    async fn evaluate_bool(
        &self,
        key: &str,
        _default: bool,
        ctx: &EvaluationContext,
    ) -> Result<bool, EvaluationError> {
        let response: BooleanResponse = self.post(&self.boolean_url, key, ctx).await?;
        Ok(response.enabled)
    }

    async fn evaluate_object(
        &self,
        key: &str,
        default: ObjectValue,
        ctx: &EvaluationContext,
    ) -> Result<ObjectValue, EvaluationError> {
        let Some(r) = self.variant(key, ctx).await? else {
            return Ok(default);
        };

        if r.variant_attachment.is_empty() {
            return Ok(default);
        }

        match serde_json::from_str(&r.variant_attachment) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            _ => Err(type_mismatch(key, "object", r.variant_attachment)),
        }
    }
}
