//! Flag evaluator backends and selection from configuration.

mod flipt;
mod noop;

pub use flipt::FliptProvider;
pub use noop::NoopProvider;

use crate::config::StageConfig;
use crate::errors::StageError;
use crate::evaluator::FlagEvaluator;
use std::sync::Arc;

pub const FLIPT: &str = "flipt";

/// Selects the evaluator named by `config.provider`.
///
/// Any name other than a known backend, including an empty one, falls back
/// to [`NoopProvider`], which answers every flag with its default.
pub fn build_evaluator(config: &StageConfig) -> Result<Arc<dyn FlagEvaluator>, StageError> {
    match config.provider.as_str() {
        FLIPT => {
            let provider = FliptProvider::new(
                &config.endpoint,
                &config.authorization,
                config.namespace(),
                &config.service,
            )?;
            Ok(Arc::new(provider))
        }
        other => {
            tracing::info!(provider = other, "Using no-op flag provider");
            Ok(Arc::new(NoopProvider))
        }
    }
}
