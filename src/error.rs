use std::fmt::Display;

use thiserror::Error;

pub type OptResult<T> = anyhow::Result<T>;

/// Errors raised by the estimators and the relation builders.
///
/// Everything else (missing statistics, unconvertible values, unknown operators on the
/// estimation path) degrades to a default selectivity instead of failing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptError {
    /// A catalog identifier does not resolve.
    #[error("cache lookup failed for {kind} {id}")]
    Lookup { kind: &'static str, id: String },
    /// Caller passed something the estimators can not work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub fn lookup_error<I: Display>(kind: &'static str, id: I) -> anyhow::Error {
    OptError::Lookup {
        kind,
        id: id.to_string(),
    }
    .into()
}

pub fn invalid_input<S: Into<String>>(msg: S) -> anyhow::Error {
    OptError::InvalidInput(msg.into()).into()
}

/// Classifies an error produced by this crate, if it is one.
pub fn as_opt_error(err: &anyhow::Error) -> Option<&OptError> {
    err.downcast_ref::<OptError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let err = lookup_error("operator", 42);
        assert_eq!(err.to_string(), "cache lookup failed for operator 42");
        assert!(matches!(as_opt_error(&err), Some(OptError::Lookup { .. })));

        let err = anyhow::anyhow!("other");
        assert!(as_opt_error(&err).is_none());
    }
}
