use thiserror::Error;

/// All ways a sketch operation can fail.
///
/// Every variant corresponds to one of the five error kinds named in the
/// storage spec: out-of-range construction parameters, a union/compatibility
/// check between sketches with differing metadata, a wire payload that
/// cannot be decoded, an estimator called on a register count it cannot
/// serve, and an aggregate transition invoked outside of an aggregation
/// context.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum HllError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("config mismatch: log_2m and reg_width must match when combining sketches")]
    IncompatibleMetadata,

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("register count too small for the estimator (m must be > 8)")]
    EstimatorDomain,

    #[error("aggregate transition invoked outside an aggregation context: {0}")]
    ContextMisuse(String),
}

impl HllError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        HllError::InvalidParameter(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        HllError::MalformedInput(msg.into())
    }

    pub(crate) fn context(msg: impl Into<String>) -> Self {
        HllError::ContextMisuse(msg.into())
    }
}
