//! Caller-supplied computations run on a cache miss

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::BoxError;

type CalculatorFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value, BoxError>> + Send>;

/// Computation producing the value for a missed key.
///
/// A calculator runs at most once. Build one from an async closure with
/// [`Calculator::new`], or from a callback-style function with
/// [`Calculator::from_callback`].
pub struct Calculator {
    run: CalculatorFn,
}

impl Calculator {
    /// Wrap an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        Self {
            run: Box::new(move || Box::pin(f())),
        }
    }

    /// Wrap a function that reports its result through a [`Completion`].
    ///
    /// The function may complete synchronously or hand the completion to
    /// another task. Dropping the completion without reporting counts as a
    /// calculation failure.
    pub fn from_callback<F>(f: F) -> Self
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        Self::new(move || {
            let (tx, rx) = oneshot::channel();
            f(Completion { tx });
            async move {
                rx.await.unwrap_or_else(|_| {
                    Err("calculator dropped its completion without reporting a result".into())
                })
            }
        })
    }

    /// Calculator used when the caller supplies none: yields `null`.
    pub fn null() -> Self {
        Self::new(|| async {
            debug!("Running fallback calculator that returns null");
            Ok(Value::Null)
        })
    }

    pub(crate) async fn run(self) -> Result<Value, BoxError> {
        (self.run)().await
    }
}

impl fmt::Debug for Calculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Calculator")
    }
}

/// One-shot completion handed to callback-style calculators
pub struct Completion {
    tx: oneshot::Sender<Result<Value, BoxError>>,
}

impl Completion {
    /// Report the outcome: `Err` for a failure, `Ok` for the computed data.
    pub fn done(self, result: Result<Value, BoxError>) {
        // The receiver is gone only if the fetch itself was dropped.
        let _ = self.tx.send(result);
    }

    /// Report successfully computed data.
    pub fn ok<T: Serialize>(self, data: T) {
        let result = serde_json::to_value(data).map_err(BoxError::from);
        self.done(result);
    }

    /// Report a failure.
    pub fn fail(self, error: impl Into<BoxError>) {
        self.done(Err(error.into()));
    }
}
