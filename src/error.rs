//! Error taxonomy for costgate, following the component boundaries in
//! which each error can originate: schema build, per-request analysis,
//! and the rate-limit backend.

use displaydoc::Display;
use thiserror::Error;

/// Errors that can occur while merging and validating a [`crate::config::WeightConfig`].
#[derive(Debug, Display, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    /// weight `{field}` must be non-negative, got {value}
    NegativeWeight { field: &'static str, value: i64 },
    /// rate limiter parameter `{field}` must be positive, got {value}
    InvalidAlgorithmParameter { field: &'static str, value: i64 },
    /// configuration file could not be parsed: {0}
    InvalidYaml(String),
}

/// Errors raised while building a [`crate::cost_model::TypeWeightTable`] from a schema.
#[derive(Debug, Display, Error, Clone)]
pub enum SchemaError {
    /// type `{0}` is not an object, interface, enum, union, scalar, or input object
    UnsupportedType(String),
    /// field `{type_name}.{field_name}` is a list with no slicing argument and no @listCost directive
    UnboundedList { type_name: String, field_name: String },
    /// type `{0}` was referenced as resolvesTo but has no entry in the weight table
    DanglingResolvesTo(String),
    /// configuration was invalid: {0}
    Config(#[from] ConfigError),
}

/// Errors raised while an operation is validated against a schema before analysis.
#[derive(Debug, Display, Error, Clone)]
pub enum ValidationError {
    /// operation failed schema validation: {0}
    Invalid(String),
}

/// Errors raised while walking a parsed operation against the weight table.
#[derive(Debug, Display, Error, Clone)]
pub enum AnalysisError {
    /// field `{field_name}` is not a selectable field of type `{type_name}`
    UnknownField { type_name: String, field_name: String },
    /// fragment `...{0}` is not defined in this document
    UnknownFragment(String),
    /// selection kind is neither a field, an inline fragment, nor a fragment spread
    UnsupportedSelection,
    /// operation exceeded the configured depth limit: {depth} > {limit}
    DepthExceeded { depth: u32, limit: u32 },
    /// could not select an operation to analyze: {0}
    UnknownOperation(String),
}

/// Errors raised by a [`crate::ratelimit::CacheBackend`] implementation.
#[derive(Debug, Display, Error, Clone)]
pub enum BackendError {
    /// cache operation failed: {0}
    Io(String),
    /// cache operation exceeded its deadline
    Timeout,
}

/// A rate-limit decision that denied the request.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum LimitExceeded {
    /// caller `{caller_key}` exceeded its budget; retry after {retry_after_millis:?}ms
    Denied {
        caller_key: String,
        retry_after_millis: Option<u64>,
    },
}

/// The union of every error this crate can surface, composed for callers
/// (such as the gateway's HTTP handler) that need a single type to map onto
/// a status code.
#[derive(Debug, Display, Error)]
pub enum CostgateError {
    /// {0}
    Config(#[from] ConfigError),
    /// {0}
    Schema(#[from] SchemaError),
    /// {0}
    Validation(#[from] ValidationError),
    /// {0}
    Analysis(#[from] AnalysisError),
    /// {0}
    Backend(#[from] BackendError),
    /// {0}
    LimitExceeded(#[from] LimitExceeded),
}

impl CostgateError {
    /// The HTTP-style status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            CostgateError::Validation(_) | CostgateError::Analysis(_) => 400,
            CostgateError::LimitExceeded(_) => 429,
            CostgateError::Backend(_) => 503,
            CostgateError::Config(_) | CostgateError::Schema(_) => 500,
        }
    }
}
