//! Attempt-or-default results
//!
//! Some steps must always produce a usable value even when the upstream call
//! fails (speech synthesis, coaching reply parsing). Instead of swallowing
//! errors ad hoc, those steps return an [`Outcome`] that records whether the
//! value is real or a substituted default, and why.

use std::fmt::Display;

/// Value produced by an attempt that may have fallen back to a default
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The attempt succeeded
    Fresh(T),
    /// The attempt failed and `value` is the substitute
    Degraded { value: T, reason: String },
}

impl<T> Outcome<T> {
    /// Run an attempt, substituting `default()` on failure
    pub fn attempt<E: Display>(result: Result<T, E>, default: impl FnOnce() -> T) -> Self {
        match result {
            Ok(value) => Self::Fresh(value),
            Err(e) => Self::Degraded {
                value: default(),
                reason: e.to_string(),
            },
        }
    }

    /// Build a degraded outcome directly
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    /// Why the default was used, if it was
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Fresh(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Fresh(value) | Self::Degraded { value, .. } => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_fresh() {
        let outcome = Outcome::attempt(Ok::<_, String>(3), || 0);
        assert_eq!(outcome, Outcome::Fresh(3));
        assert_eq!(outcome.reason(), None);
    }

    #[test]
    fn failure_uses_default_and_keeps_reason() {
        let outcome = Outcome::attempt(Err::<i32, _>("boom"), || 7);
        assert_eq!(outcome.reason(), Some("boom"));
        assert_eq!(outcome.into_inner(), 7);
    }
}
