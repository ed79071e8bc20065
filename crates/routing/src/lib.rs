//! Conduit Routing - conditional fan-out from a pipeline to its sinks
//!
//! A pipeline declares named routes (a name plus a condition expression). Each
//! sink subscribes to a subset of those route names. For every event leaving
//! the processor chain the router evaluates all routes, then hands the event
//! to each sink whose subscriptions intersect the satisfied set.
//!
//! # Rules
//!
//! - A sink with no subscriptions receives every event
//! - A sink subscribed to [`DEFAULT_ROUTE`] also receives events that
//!   satisfied no route
//! - A pipeline without routes sends every event to every sink
//! - An evaluation error counts as "not satisfied" for that route and event
//!
//! # Compilation
//!
//! Route names are resolved once when the router is built. Each route gets a
//! bit in a `u64`; each sink keeps a mask of its routes, so deciding whether
//! a sink receives an event is a single AND.
//!
//! ```text
//! event ─evaluate─→ satisfied: 0b0110
//! sink A  mask 0b0010  → receives
//! sink B  mask 0b1000  → skipped
//! sink C  default      → skipped (something matched)
//! ```

mod error;
mod evaluator;
mod route;
mod router;
mod sink_id;

pub use error::{Result, RoutingError};
pub use evaluator::{EvaluationError, ExpressionEvaluator, FieldEvaluator};
pub use route::{DEFAULT_ROUTE, Route};
pub use router::{EventRouter, EventRouterBuilder, RoutedBatch, RouterMetricsSnapshot};
pub use sink_id::SinkId;

/// Maximum number of routes a pipeline may declare
pub const MAX_ROUTES: usize = 64;
