//! Ordered fallback across provider identifiers
//!
//! Hosted model availability drifts (deprecations, regional gaps), so a call
//! is tried against a priority list of identifiers and the first success wins.

use std::fmt::{self, Display};
use std::future::Future;

/// Every candidate failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackExhausted {
    /// `(candidate, error)` in the order they were tried
    pub attempts: Vec<(String, String)>,
}

impl Display for FallbackExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no candidates configured");
        }
        write!(f, "all {} candidates failed", self.attempts.len())?;
        for (candidate, error) in &self.attempts {
            write!(f, "; {candidate}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FallbackExhausted {}

/// Try `attempt` against each candidate in order
///
/// Returns the winning candidate alongside its value.
///
/// # Errors
///
/// Returns [`FallbackExhausted`] with every failure if no candidate succeeds
pub async fn try_in_order<T, E, F, Fut>(
    candidates: &[String],
    mut attempt: F,
) -> Result<(String, T), FallbackExhausted>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempts = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match attempt(candidate.clone()).await {
            Ok(value) => {
                if !attempts.is_empty() {
                    tracing::info!(
                        candidate = %candidate,
                        failed = attempts.len(),
                        "fallback candidate succeeded"
                    );
                }
                return Ok((candidate.clone(), value));
            }
            Err(e) => {
                tracing::warn!(candidate = %candidate, error = %e, "candidate failed, trying next");
                attempts.push((candidate.clone(), e.to_string()));
            }
        }
    }

    Err(FallbackExhausted { attempts })
}
