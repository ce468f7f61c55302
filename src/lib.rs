//! costgate: a GraphQL query-cost-based rate limiter.
//!
//! Two coupled subsystems do the core work: the schema [`cost_model`]
//! builder collapses a GraphQL schema into a static type-weight table, and
//! the [`analysis`] walker charges each incoming operation against that
//! table to produce a single complexity score and its maximum selection
//! depth. [`ratelimit`] enforces a per-caller budget against that score
//! through one of four pluggable algorithms, serialized per caller key so
//! concurrent requests from the same caller can't both read a stale cache
//! entry. [`gateway`] composes all of it into the request-handling
//! pipeline; [`config`] and [`error`] are the ambient configuration and
//! error taxonomy shared by every component.

pub mod analysis;
pub mod config;
pub mod cost_model;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod ratelimit;
