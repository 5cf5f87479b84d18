//! Bounded retry: one initial attempt, at most one corrective attempt.
//!
//! The corrective attempt receives feedback describing what was wrong with the
//! first reply, so the prompt it sends is distinguishable from the initial one.

use std::fmt::Display;
use std::future::Future;

/// Which attempt is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    /// Second and last attempt. `feedback` explains what the first reply got wrong.
    Corrective { feedback: String },
}

impl Attempt {
    pub fn is_corrective(&self) -> bool {
        matches!(self, Attempt::Corrective { .. })
    }
}

/// How an attempt failed.
#[derive(Debug)]
pub enum Failure<E> {
    /// The reply was unusable but a corrected request may succeed.
    Correctable { error: E, feedback: String },
    /// Retrying cannot help; surface immediately.
    Fatal(E),
}

/// Runs `attempt` once, and once more with [`Attempt::Corrective`] if the
/// first failure was [`Failure::Correctable`].
///
/// Any failure of the corrective attempt is returned as-is.
pub async fn with_corrective_retry<T, E, F, Fut>(stage: &'static str, mut attempt: F) -> Result<T, E>
where
    E: Display,
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
{
    let feedback = match attempt(Attempt::Initial).await {
        Ok(value) => return Ok(value),
        Err(Failure::Fatal(error)) => return Err(error),
        Err(Failure::Correctable { error, feedback }) => {
            tracing::warn!(stage, error = %error, "reply rejected; issuing corrective retry");
            feedback
        }
    };

    match attempt(Attempt::Corrective { feedback }).await {
        Ok(value) => Ok(value),
        Err(Failure::Fatal(error)) | Err(Failure::Correctable { error, .. }) => Err(error),
    }
}
