//! Request stage that evaluates feature flags and exposes them as request headers.
//!
//! For every request the [`FeatureFlagStage`] builds an [`EvaluationContext`]
//! from selected headers, evaluates the configured flags concurrently through
//! a [`FlagEvaluator`], writes one `<prefix><flag key>` header per flag and
//! hands the request to the next service.

pub mod config;
pub mod context;
pub mod errors;
pub mod evaluator;
pub mod forwarder;
pub mod kind;
pub mod metrics_defs;
pub mod provider;
pub mod resolver;
pub mod stage;

#[cfg(test)]
mod testutils;

pub use config::StageConfig;
pub use context::{EvaluationContext, EvaluationContextBuilder};
pub use errors::{EvaluationError, GatewayError, StageError};
pub use evaluator::FlagEvaluator;
pub use forwarder::Forwarder;
pub use kind::{FlagKind, FlagSpec, FlagValue};
pub use resolver::{FlagResolver, ResolvedFlags};
pub use stage::FeatureFlagStage;
