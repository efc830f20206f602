use crate::context::EvaluationContext;
use crate::errors::EvaluationError;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub type ObjectValue = Map<String, Value>;

/// Typed flag evaluation against an external provider.
///
/// A single evaluator is shared by every request and every flag task, so
/// implementations must tolerate concurrent calls.
#[async_trait]
pub trait FlagEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checks that the provider can be reached. Called once at startup.
    async fn probe(&self) -> Result<(), EvaluationError> {
        Ok(())
    }

    async fn evaluate_int(
        &self,
        key: &str,
        default: i64,
        ctx: &EvaluationContext,
    ) -> Result<i64, EvaluationError>;

    async fn evaluate_float(
        &self,
        key: &str,
        default: f64,
        ctx: &EvaluationContext,
    ) -> Result<f64, EvaluationError>;

    async fn evaluate_string(
        &self,
        key: &str,
        default: String,
        ctx: &EvaluationContext,
    ) -> Result<String, EvaluationError>;

    async fn evaluate_bool(
        &self,
        key: &str,
        default: bool,
        ctx: &EvaluationContext,
    ) -> Result<bool, EvaluationError>;

    async fn evaluate_object(
        &self,
        key: &str,
        default: ObjectValue,
        ctx: &EvaluationContext,
    ) -> Result<ObjectValue, EvaluationError>;
}
