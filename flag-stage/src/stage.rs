use crate::config::StageConfig;
use crate::context::EvaluationContextBuilder;
use crate::errors::StageError;
use crate::evaluator::FlagEvaluator;
use crate::kind::FlagSpec;
use crate::provider::build_evaluator;
use crate::resolver::FlagResolver;
use http::{HeaderMap, HeaderValue};
use hyper::Request;
use hyper::service::Service;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Instrument;

/// Request stage that injects evaluated feature flags as request headers and
/// then hands the request to `next`.
///
/// The stage never rejects a request. Evaluation problems only turn individual
/// header values into their defaults.
pub struct FeatureFlagStage<S> {
    inner: Arc<StageInner>,
    next: Arc<S>,
}

struct StageInner {
    service: String,
    context_builder: EvaluationContextBuilder,
    resolver: FlagResolver,
}

impl StageInner {
    async fn apply(&self, headers: &mut HeaderMap) {
        let ctx = self.context_builder.build(headers);
        let resolved = self.resolver.resolve(ctx).await;

        for (name, value) in resolved {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(name, value);
                }
                // The resolver only hands out valid values
                Err(_) => tracing::error!(header = %name, "Dropping invalid flag header value"),
            }
        }
    }
}

impl<S> FeatureFlagStage<S> {
    /// Builds the stage with the provider selected by `config.provider`.
    pub fn new(config: &StageConfig, next: S) -> Result<Self, StageError> {
        let evaluator = build_evaluator(config)?;
        Self::with_evaluator(config, evaluator, next)
    }

    /// Like [`FeatureFlagStage::new`], but fails if the provider cannot be reached.
    pub async fn connect(config: &StageConfig, next: S) -> Result<Self, StageError> {
        let stage = Self::new(config, next)?;

        let evaluator = stage.inner.resolver.evaluator();
        evaluator
            .probe()
            .await
            .map_err(|source| StageError::ProviderUnreachable {
                provider: evaluator.name(),
                source,
            })?;

        Ok(stage)
    }

    /// Builds the stage around an explicitly provided evaluator.
    pub fn with_evaluator(
        config: &StageConfig,
        evaluator: Arc<dyn FlagEvaluator>,
        next: S,
    ) -> Result<Self, StageError> {
        let flags = FlagSpec::from_config(&config.flags, config.header_prefix())?;

        tracing::info!(
            service = %config.service,
            provider = evaluator.name(),
            flags = flags.len(),
            "Configured feature flag stage"
        );

        let resolver = FlagResolver::new(evaluator, flags)
            .with_timeout(config.evaluation_timeout())
            .with_max_concurrency(config.max_concurrent_evaluations);

        let context_builder = EvaluationContextBuilder::new(
            config.context_header_keys.clone(),
            config.user_header().map(str::to_string),
        );

        Ok(Self {
            inner: Arc::new(StageInner {
                service: config.service.clone(),
                context_builder,
                resolver,
            }),
            next: Arc::new(next),
        })
    }

    /// Evaluates the flags for `req` and writes them into its headers,
    /// overwriting headers of the same name.
    pub async fn apply<B>(&self, req: &mut Request<B>) {
        self.inner.apply(req.headers_mut()).await
    }
}

impl<S, B> Service<Request<B>> for FeatureFlagStage<S>
where
    S: Service<Request<B>> + Send + Sync + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, mut req: Request<B>) -> Self::Future {
        let inner = self.inner.clone();
        let next = self.next.clone();
        let span = tracing::debug_span!("feature_flags", service = %inner.service);

        Box::pin(
            async move {
                inner.apply(req.headers_mut()).await;
                next.call(req).await
            }
            .instrument(span),
        )
    }
}
