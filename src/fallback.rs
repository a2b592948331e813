//! Ordered fallback chains. Candidates are tried one at a time; the first
//! accepted result wins and nothing after it runs.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

use crate::error::{AllFailed, Attempt};

type StrategyFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// A labelled, not-yet-started fetch.
pub struct Strategy<'a, T, E> {
    label: String,
    run: Box<dyn FnOnce() -> StrategyFuture<'a, T, E> + Send + 'a>,
}

impl<'a, T, E> Strategy<'a, T, E> {
    pub fn new<F, Fut>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
    {
        Self {
            label: label.into(),
            run: Box::new(move || Box::pin(run())),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Runs `strategies` sequentially until one yields a value passing `accept`.
pub async fn resolve<'a, T, E, A>(
    strategies: Vec<Strategy<'a, T, E>>,
    accept: A,
) -> Result<T, AllFailed<E>>
where
    E: Display,
    A: Fn(&T) -> bool,
{
    let mut attempts = Vec::with_capacity(strategies.len());
    for Strategy { label, run } in strategies {
        match run().await {
            Ok(value) if accept(&value) => {
                debug!(strategy = %label, "fallback resolved");
                return Ok(value);
            }
            Ok(_) => {
                debug!(strategy = %label, "fallback candidate unusable");
                attempts.push(Attempt::Unacceptable { label });
            }
            Err(error) => {
                debug!(strategy = %label, "fallback candidate failed: {}", error);
                attempts.push(Attempt::Failed { label, error });
            }
        }
    }
    Err(AllFailed { attempts })
}
