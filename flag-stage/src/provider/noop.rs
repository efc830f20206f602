use crate::context::EvaluationContext;
use crate::errors::EvaluationError;
use crate::evaluator::{FlagEvaluator, ObjectValue};
use async_trait::async_trait;

/// Evaluator that resolves every flag to the supplied default.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProvider;

#[async_trait]
impl FlagEvaluator for NoopProvider {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn evaluate_int(
        &self,
        _key: &str,
        default: i64,
        _ctx: &EvaluationContext,
    ) -> Result<i64, EvaluationError> {
        Ok(default)
    }

    async fn evaluate_float(
        &self,
        _key: &str,
        default: f64,
        _ctx: &EvaluationContext,
    ) -> Result<f64, EvaluationError> {
        Ok(default)
    }

    async fn evaluate_string(
        &self,
        _key: &str,
        default: String,
        _ctx: &EvaluationContext,
    ) -> Result<String, EvaluationError> {
        Ok(default)
    }

    async fn evaluate_bool(
        &self,
        _key: &str,
        default: bool,
        _ctx: &EvaluationContext,
    ) -> Result<bool, EvaluationError> {
        Ok(default)
    }

    async fn evaluate_object(
        &self,
        _key: &str,
        default: ObjectValue,
        _ctx: &EvaluationContext,
    ) -> Result<ObjectValue, EvaluationError> {
        Ok(default)
    }
}
