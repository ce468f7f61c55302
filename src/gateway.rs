//! The gateway entry point (C6): composes the schema cost
//! builder (C2) once at startup, then for each incoming operation parses,
//! validates, analyzes (C3), applies the optional depth limit, and calls
//! the serialized rate limiter (C5 over C4) to produce a decision.
//!
//! The HTTP adapter that extracts caller identity, operation text, and
//! variables from a request is kept separate; this
//! module's [`Gateway::handle_request`] takes those already extracted, and
//! `src/main.rs`'s `axum` binary is the thin HTTP layer built on top of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use apollo_compiler::executable::ExecutableDocument;
use apollo_compiler::Schema;

use crate::analysis;
use crate::config::Config;
use crate::config::DepthLimit;
use crate::config::RateLimiterConfig;
use crate::cost_model;
use crate::cost_model::TypeWeightTable;
use crate::error::AnalysisError;
use crate::error::CostgateError;
use crate::error::ValidationError;
use crate::metrics::Metrics;
use crate::ratelimit::CacheBackend;
use crate::ratelimit::FixedWindow;
use crate::ratelimit::PerCallerSerializer;
use crate::ratelimit::RateLimitAlgorithm;
use crate::ratelimit::SlidingWindowCounter;
use crate::ratelimit::SlidingWindowLog;
use crate::ratelimit::TokenBucket;

/// Everything the gateway needs to know about one finished decision,
/// attached to every request — allowed or rejected, dark mode or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservabilitySlot {
    pub timestamp_millis: i64,
    pub complexity: u64,
    pub depth: u32,
    pub tokens: i64,
    pub success: bool,
}

/// What the gateway decided to do with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResponse {
    /// Forward the request upstream. In dark mode this variant is returned
    /// even when the underlying decision was a denial.
    Forward(ObservabilitySlot),
    /// Reject with a 429 and this many seconds before a retry could
    /// succeed.
    Reject { slot: ObservabilitySlot, retry_after_secs: u64 },
}

impl GatewayResponse {
    pub fn slot(&self) -> &ObservabilitySlot {
        match self {
            GatewayResponse::Forward(slot) => slot,
            GatewayResponse::Reject { slot, .. } => slot,
        }
    }
}

/// One incoming GraphQL operation, already extracted from its transport by
/// the (out-of-scope) HTTP adapter.
pub struct RequestInput<'a> {
    pub caller_key: &'a str,
    pub operation_text: &'a str,
    pub operation_name: Option<&'a str>,
    pub variables: HashMap<String, serde_json::Value>,
}

/// The composed gateway: an immutable schema, its precomputed cost table,
/// and the serialized rate limiter sitting in front of it.
pub struct Gateway {
    schema: Schema,
    table: TypeWeightTable,
    depth_limit: DepthLimit,
    dark: bool,
    limiter: PerCallerSerializer<Box<dyn RateLimitAlgorithm>>,
    metrics: Metrics,
}

impl Gateway {
    /// Builds the cost model from `schema` and wires up the algorithm and
    /// cache backend named in `config`. Fails at startup
    /// ([`CostgateError::Schema`]/[`CostgateError::Config`]) rather than per
    /// request.
    pub fn build(schema: Schema, config: &Config, cache: Arc<dyn CacheBackend>) -> Result<Self, CostgateError> {
        let table = cost_model::build(
            &schema,
            &config.type_weights,
            cost_model::BuildOptions {
                strict_unbounded_lists: config.enforce_bounded_lists,
            },
        )?;

        let algorithm = build_algorithm(config, cache)?;

        Ok(Gateway {
            schema,
            table,
            depth_limit: config.depth_limit,
            dark: config.dark,
            limiter: PerCallerSerializer::new(algorithm),
            metrics: Metrics::new(),
        })
    }

    pub fn table(&self) -> &TypeWeightTable {
        &self.table
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn reset(&self) -> Result<(), CostgateError> {
        self.limiter.algorithm().reset().await.map_err(CostgateError::from)
    }

    /// Runs the full C6 pipeline for one operation.
    pub async fn handle_request(&self, request: RequestInput<'_>) -> Result<GatewayResponse, CostgateError> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("costgate.request", caller_key = request.caller_key, %request_id);
        let _enter = span.enter();
        let started_at = Instant::now();

        let outcome = self
            .analyze(&request)
            .inspect_err(|_| self.metrics.record("validation_error", 0, started_at.elapsed().as_secs_f64()))?;

        let now = now_millis();
        let result = self
            .limiter
            .process_request(request.caller_key, now, outcome.complexity as i64)
            .await
            .inspect_err(|_| {
                self.metrics
                    .record("backend_error", outcome.complexity, started_at.elapsed().as_secs_f64())
            })?;

        let slot = ObservabilitySlot {
            timestamp_millis: now,
            complexity: outcome.complexity,
            depth: outcome.max_depth,
            tokens: result.tokens,
            success: result.success,
        };

        tracing::info!(
            target: "costgate.decision",
            timestamp = slot.timestamp_millis,
            complexity = slot.complexity,
            depth = slot.depth,
            tokens = slot.tokens,
            success = slot.success,
            dark = self.dark,
            "rate-limit decision"
        );

        let outcome_label = if result.success { "allowed" } else { "denied" };
        self.metrics
            .record(outcome_label, slot.complexity, started_at.elapsed().as_secs_f64());

        if result.success || self.dark {
            return Ok(GatewayResponse::Forward(slot));
        }

        let retry_after_secs = result
            .retry_after_millis
            .map(millis_to_secs_rounded_up)
            .unwrap_or(u64::MAX);
        Ok(GatewayResponse::Reject { slot, retry_after_secs })
    }

    /// Parses, validates, and analyzes `request` against the schema and
    /// cost table, applying the optional depth limit.
    fn analyze(&self, request: &RequestInput<'_>) -> Result<analysis::AnalysisOutcome, CostgateError> {
        let document = ExecutableDocument::parse_and_validate(&self.schema, request.operation_text, "operation.graphql")
            .map_err(|e| ValidationError::Invalid(e.to_string()))?;

        let outcome = analysis::analyze(&document, request.operation_name, &request.variables, &self.table)?;

        if let DepthLimit::Bounded(limit) = self.depth_limit {
            if outcome.max_depth > limit {
                return Err(CostgateError::from(AnalysisError::DepthExceeded {
                    depth: outcome.max_depth,
                    limit,
                }));
            }
        }
        Ok(outcome)
    }
}

fn millis_to_secs_rounded_up(millis: i64) -> u64 {
    if millis <= 0 {
        return 0;
    }
    ((millis as u64) + 999) / 1000
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn build_algorithm(config: &Config, cache: Arc<dyn CacheBackend>) -> Result<Box<dyn RateLimitAlgorithm>, CostgateError> {
    let Some(rate_limiter) = &config.rate_limiter else {
        return Err(CostgateError::Config(crate::error::ConfigError::InvalidAlgorithmParameter {
            field: "rateLimiter",
            value: 0,
        }));
    };
    rate_limiter.validate()?;

    let ttl = config.cache.key_expiry;
    let algorithm: Box<dyn RateLimitAlgorithm> = match rate_limiter {
        RateLimiterConfig::TokenBucket { capacity, refill_rate } => {
            Box::new(TokenBucket::new(*capacity, *refill_rate, ttl, cache))
        }
        RateLimiterConfig::FixedWindow { capacity, window_size_millis } => {
            Box::new(FixedWindow::new(*capacity, *window_size_millis, ttl, cache))
        }
        RateLimiterConfig::SlidingWindowLog { capacity, window_size_millis } => {
            Box::new(SlidingWindowLog::new(*capacity, *window_size_millis, ttl, cache))
        }
        RateLimiterConfig::SlidingWindowCounter { capacity, window_size_millis } => {
            Box::new(SlidingWindowCounter::new(*capacity, *window_size_millis, ttl, cache))
        }
    };
    Ok(algorithm)
}
