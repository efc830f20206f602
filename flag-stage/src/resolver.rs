//! Concurrent evaluation of the configured flag set for a single request.

use crate::context::EvaluationContext;
use crate::errors::EvaluationError;
use crate::evaluator::FlagEvaluator;
use crate::kind::{FlagDef, FlagSpec, FlagValue};
use crate::metrics_defs::{FLAG_EVALUATIONS, FLAG_RESOLUTION_DURATION};
use http::{HeaderName, HeaderValue};
use shared::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;

/// Header name to encoded flag value, one entry per configured flag.
pub type ResolvedFlags = HashMap<HeaderName, String>;

/// Evaluates every flag of a [`FlagSpec`] in parallel and encodes the results.
///
/// Each call spawns one task per flag and returns only once every task has
/// finished, or once the optional deadline expired and the remaining tasks
/// were aborted and reaped. No task outlives the call.
///
/// Failures never escape: a flag whose evaluation errors, panics, times out
/// or yields a value that cannot be sent as a header gets the encoding of its
/// kind's default value.
#[derive(Clone)]
pub struct FlagResolver {
    evaluator: Arc<dyn FlagEvaluator>,
    flags: Arc<FlagSpec>,
    timeout: Option<Duration>,
    max_concurrency: Option<usize>,
}

impl FlagResolver {
    pub fn new(evaluator: Arc<dyn FlagEvaluator>, flags: FlagSpec) -> Self {
        Self {
            evaluator,
            flags: Arc::new(flags),
            timeout: None,
            max_concurrency: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bounds in-flight evaluations per request. A limit of 0 is treated as 1.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.map(|n| n.max(1));
        self
    }

    pub fn evaluator(&self) -> &Arc<dyn FlagEvaluator> {
        &self.evaluator
    }

    pub async fn resolve(&self, ctx: EvaluationContext) -> ResolvedFlags {
        let start = Instant::now();
        let ctx = Arc::new(ctx);
        let limiter = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        let mut join_set = JoinSet::new();
        let mut pending: HashMap<Id, &FlagDef> = HashMap::with_capacity(self.flags.len());

        for flag in self.flags.iter() {
            let evaluator = self.evaluator.clone();
            let ctx = ctx.clone();
            let limiter = limiter.clone();
            let key = flag.key.clone();
            let kind = flag.kind;

            let abort_handle = join_set.spawn(async move {
                // The semaphore is never closed, so acquiring only waits
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                kind.evaluate(evaluator.as_ref(), &key, &ctx).await
            });

            pending.insert(abort_handle.id(), flag);
        }

        let mut resolved = ResolvedFlags::with_capacity(self.flags.len());

        let deadline = deadline(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                join_result = join_set.join_next_with_id() => match join_result {
                    Some(join_result) => record(join_result, &mut pending, &mut resolved),
                    None => break,
                },
                _ = &mut deadline => {
                    tracing::warn!(
                        remaining = join_set.len(),
                        "Flag evaluation deadline reached, aborting remaining evaluations"
                    );
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Reap aborted tasks. Some may have finished before the abort landed.
        while let Some(join_result) = join_set.join_next_with_id().await {
            if join_result.as_ref().is_err_and(|e| e.is_cancelled()) {
                continue;
            }
            record(join_result, &mut pending, &mut resolved);
        }

        for flag in pending.into_values() {
            counter!(FLAG_EVALUATIONS, "kind" => flag.kind.as_str(), "outcome" => "timeout")
                .increment(1);
            resolved.insert(flag.header.clone(), flag.kind.default_value().encode());
        }

        histogram!(FLAG_RESOLUTION_DURATION).record(start.elapsed().as_secs_f64());
        resolved
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Stores the encoded outcome of a finished task under its flag's header.
fn record(
    join_result: Result<(Id, Result<FlagValue, EvaluationError>), JoinError>,
    pending: &mut HashMap<Id, &FlagDef>,
    resolved: &mut ResolvedFlags,
) {
    let (flag, outcome) = match join_result {
        Ok((id, result)) => match pending.remove(&id) {
            Some(flag) => (flag, result),
            None => return,
        },
        Err(e) => {
            let Some(flag) = pending.remove(&e.id()) else {
                return;
            };
            tracing::error!(flag = %flag.key, error = %e, "Flag evaluation task failed");
            counter!(FLAG_EVALUATIONS, "kind" => flag.kind.as_str(), "outcome" => "panic")
                .increment(1);
            resolved.insert(flag.header.clone(), flag.kind.default_value().encode());
            return;
        }
    };

    resolved.insert(flag.header.clone(), encode_outcome(flag, outcome));
}

fn encode_outcome(flag: &FlagDef, outcome: Result<FlagValue, EvaluationError>) -> String {
    let kind = flag.kind.as_str();

    match outcome {
        Ok(value) => {
            let encoded = value.encode();
            if HeaderValue::from_str(&encoded).is_ok() {
                counter!(FLAG_EVALUATIONS, "kind" => kind, "outcome" => "ok").increment(1);
                return encoded;
            }
            tracing::warn!(flag = %flag.key, "Flag value is not a valid header value, using default");
            counter!(FLAG_EVALUATIONS, "kind" => kind, "outcome" => "invalid_value").increment(1);
        }
        Err(e) => {
            tracing::warn!(flag = %flag.key, kind, error = %e, "Flag evaluation failed, using default");
            counter!(FLAG_EVALUATIONS, "kind" => kind, "outcome" => "error").increment(1);
        }
    }

    flag.kind.default_value().encode()
}
