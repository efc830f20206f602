use crate::context::EvaluationContext;
use crate::errors::EvaluationError;
use crate::evaluator::{FlagEvaluator, ObjectValue};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Barrier;

/// Serves `handler` on an ephemeral local port with fully buffered bodies.
pub async fn start_test_server<F>(handler: F) -> SocketAddr
where
    F: Fn(Request<Bytes>) -> Response<Bytes> + Clone + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let handler = handler.clone();

            tokio::spawn(async move {
                let svc = service_fn(move |req: Request<Incoming>| {
                    let handler = handler.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = body.collect().await.unwrap().to_bytes();
                        let (parts, body) = handler(Request::from_parts(parts, body)).into_parts();
                        Ok::<_, Infallible>(Response::from_parts(parts, Full::new(body)))
                    }
                });

                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    addr
}

/// What a [`MockEvaluator`] does for a given flag key.
#[derive(Clone)]
pub enum MockBehavior {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Object(ObjectValue),
    Fail,
    Hang,
    Panic,
    /// Sleeps before returning the default
    Delay(Duration),
    /// Waits for every other participant before returning the default
    Rendezvous(Arc<Barrier>),
}

/// Scripted evaluator. Flags without a behavior resolve to their default.
#[derive(Clone, Default)]
pub struct MockEvaluator {
    behaviors: HashMap<String, MockBehavior>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl MockEvaluator {
    pub fn new<K: Into<String>>(behaviors: impl IntoIterator<Item = (K, MockBehavior)>) -> Self {
        Self {
            behaviors: behaviors.into_iter().map(|(k, b)| (k.into(), b)).collect(),
            ..Default::default()
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Runs the scripted behavior for `key`, returning `Some` for a typed override.
    async fn run(&self, key: &str) -> Result<Option<MockBehavior>, EvaluationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = match self.behaviors.get(key).cloned() {
            Some(MockBehavior::Fail) => Err(EvaluationError::FlagNotFound(key.to_string())),
            Some(MockBehavior::Hang) => std::future::pending().await,
            Some(MockBehavior::Panic) => panic!("evaluator panicked for {key}"),
            Some(MockBehavior::Delay(d)) => {
                tokio::time::sleep(d).await;
                Ok(None)
            }
            Some(MockBehavior::Rendezvous(barrier)) => {
                barrier.wait().await;
                Ok(None)
            }
            other => Ok(other),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn mismatch(key: &str, expected: &'static str) -> EvaluationError {
    EvaluationError::TypeMismatch {
        key: key.to_string(),
        expected,
        value: "mock".to_string(),
    }
}

#[async_trait]
impl FlagEvaluator for MockEvaluator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn evaluate_int(
        &self,
        key: &str,
        default: i64,
        _ctx: &EvaluationContext,
    ) -> Result<i64, EvaluationError> {
        match self.run(key).await? {
            None => Ok(default),
            Some(MockBehavior::Int(v)) => Ok(v),
            Some(_) => Err(mismatch(key, "int")),
        }
    }

    async fn evaluate_float(
        &self,
        key: &str,
        default: f64,
        _ctx: &EvaluationContext,
    ) -> Result<f64, EvaluationError> {
        match self.run(key).await? {
            None => Ok(default),
            Some(MockBehavior::Float(v)) => Ok(v),
            Some(_) => Err(mismatch(key, "float")),
        }
    }

    async fn evaluate_string(
        &self,
        key: &str,
        default: String,
        _ctx: &EvaluationContext,
    ) -> Result<String, EvaluationError> {
        match self.run(key).await? {
            None => Ok(default),
            Some(MockBehavior::String(v)) => Ok(v),
            Some(_) => Err(mismatch(key, "string")),
        }
    }

    async fn evaluate_bool(
        &self,
        key: &str,
        default: bool,
        _ctx: &EvaluationContext,
    ) -> Result<bool, EvaluationError> {
        match self.run(key).await? {
            None => Ok(default),
            Some(MockBehavior::Bool(v)) => Ok(v),
            Some(_) => Err(mismatch(key, "bool")),
        }
    }

    async fn evaluate_object(
        &self,
        key: &str,
        default: ObjectValue,
        _ctx: &EvaluationContext,
    ) -> Result<ObjectValue, EvaluationError> {
        match self.run(key).await? {
            None => Ok(default),
            Some(MockBehavior::Object(v)) => Ok(v),
            Some(_) => Err(mismatch(key, "object")),
        }
    }
}
