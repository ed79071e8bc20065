//! Compiled event router

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use conduit_protocol::{Batch, Event, Record};

use crate::error::{Result, RoutingError};
use crate::evaluator::ExpressionEvaluator;
use crate::route::{DEFAULT_ROUTE, Route};
use crate::{MAX_ROUTES, SinkId};

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;

/// What one sink subscribed to
#[derive(Debug, Clone)]
struct Subscription {
    name: String,
    /// Bit per subscribed route
    mask: u64,
    /// Subscribed to [`DEFAULT_ROUTE`]
    default: bool,
    /// No subscriptions at all: receives everything
    all: bool,
}

impl Subscription {
    #[inline]
    fn receives(&self, satisfied: u64) -> bool {
        self.all || self.mask & satisfied != 0 || (self.default && satisfied == 0)
    }
}

/// Builder for [`EventRouter`]
///
/// Routes must be declared before the sinks that subscribe to them.
#[derive(Debug, Default)]
pub struct EventRouterBuilder {
    routes: Vec<Route>,
    route_bits: HashMap<String, u32>,
    sinks: Vec<Subscription>,
}

impl EventRouterBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a route
    pub fn add_route(&mut self, route: Route) -> Result<&mut Self> {
        if route.name == DEFAULT_ROUTE {
            return Err(RoutingError::ReservedRoute { name: route.name });
        }
        if self.route_bits.contains_key(&route.name) {
            return Err(RoutingError::duplicate_route(route.name));
        }
        if self.routes.len() >= MAX_ROUTES {
            return Err(RoutingError::TooManyRoutes { max: MAX_ROUTES });
        }

        self.route_bits
            .insert(route.name.clone(), self.routes.len() as u32);
        self.routes.push(route);
        Ok(self)
    }

    /// Register a sink with the route names it subscribes to
    ///
    /// An empty subscription list means the sink receives every event.
    pub fn register_sink<S: AsRef<str>>(
        &mut self,
        name: impl Into<String>,
        routes: &[S],
    ) -> Result<SinkId> {
        let name = name.into();
        if self.sinks.iter().any(|s| s.name == name) {
            return Err(RoutingError::duplicate_sink(name));
        }
        if self.sinks.len() >= usize::from(SinkId::MAX) {
            return Err(RoutingError::TooManySinks {
                max: usize::from(SinkId::MAX),
            });
        }

        let mut mask = 0u64;
        let mut default = false;
        for route in routes {
            let route = route.as_ref();
            if route == DEFAULT_ROUTE {
                default = true;
                continue;
            }
            let bit = self
                .route_bits
                .get(route)
                .ok_or_else(|| RoutingError::unknown_route(&name, route))?;
            mask |= 1u64 << bit;
        }

        let id = SinkId::new(self.sinks.len() as u16);
        self.sinks.push(Subscription {
            name,
            mask,
            default,
            all: routes.is_empty(),
        });
        Ok(id)
    }

    /// Finish building with the evaluator used for conditions
    pub fn build(self, evaluator: Arc<dyn ExpressionEvaluator>) -> EventRouter {
        EventRouter {
            routes: self.routes,
            sinks: self.sinks,
            evaluator,
            metrics: RouterMetrics::default(),
        }
    }
}

#[derive(Debug, Default)]
struct RouterMetrics {
    records_routed: AtomicU64,
    copies_made: AtomicU64,
    records_unrouted: AtomicU64,
    evaluation_errors: AtomicU64,
}

/// Point-in-time router counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterMetricsSnapshot {
    /// Records delivered to at least one sink
    pub records_routed: u64,
    /// Extra copies made for fan-out
    pub copies_made: u64,
    /// Records that matched no sink and were dropped
    pub records_unrouted: u64,
    pub evaluation_errors: u64,
}

/// Routes records from one pipeline to its sinks
///
/// Immutable once built; share it across workers behind an `Arc`.
pub struct EventRouter {
    routes: Vec<Route>,
    sinks: Vec<Subscription>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    metrics: RouterMetrics,
}

impl EventRouter {
    pub fn builder() -> EventRouterBuilder {
        EventRouterBuilder::new()
    }

    /// Declared routes in declaration order
    #[inline]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[inline]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn sink_name(&self, id: SinkId) -> Option<&str> {
        self.sinks.get(id.as_usize()).map(|s| s.name.as_str())
    }

    /// Evaluate every route against an event, returning the satisfied bits
    pub fn satisfied(&self, event: &Event) -> u64 {
        let mut satisfied = 0u64;
        for (bit, route) in self.routes.iter().enumerate() {
            match self.evaluator.evaluate(&route.condition, event) {
                Ok(true) => satisfied |= 1u64 << bit,
                Ok(false) => {}
                Err(e) => {
                    self.metrics
                        .evaluation_errors
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(route = %route.name, error = %e, "route evaluation failed, treating as not matched");
                }
            }
        }
        satisfied
    }

    /// Names of the routes an event satisfies
    pub fn satisfied_routes(&self, event: &Event) -> Vec<&str> {
        let satisfied = self.satisfied(event);
        self.routes
            .iter()
            .enumerate()
            .filter(|(bit, _)| satisfied & (1u64 << bit) != 0)
            .map(|(_, route)| route.name.as_str())
            .collect()
    }

    /// Whether a sink receives an event with the given satisfied bits
    #[inline]
    pub fn receives(&self, sink: SinkId, satisfied: u64) -> bool {
        self.sinks
            .get(sink.as_usize())
            .is_some_and(|s| s.receives(satisfied))
    }

    /// Split a batch into per-sink sub-batches
    ///
    /// Each sink's records keep their input order. A record going to K sinks
    /// is deep-copied K-1 times and every copy takes its own acknowledgement
    /// lease. A record going nowhere is dropped, which releases its lease
    /// positively.
    pub fn route(&self, batch: Batch) -> RoutedBatch {
        let mut per_sink: Vec<Vec<Record>> = (0..self.sinks.len())
            .map(|_| Vec::with_capacity(batch.len()))
            .collect();
        let mut targets: Vec<usize> = Vec::with_capacity(self.sinks.len());
        let mut routed = 0u64;
        let mut copies = 0u64;
        let mut unrouted = 0usize;

        for record in batch {
            let satisfied = if self.routes.is_empty() {
                0
            } else {
                self.satisfied(record.event())
            };

            targets.clear();
            targets.extend(
                self.sinks
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.receives(satisfied))
                    .map(|(i, _)| i),
            );

            let Some((&last, rest)) = targets.split_last() else {
                unrouted += 1;
                continue;
            };
            for &index in rest {
                per_sink[index].push(record.duplicate());
            }
            per_sink[last].push(record);
            routed += 1;
            copies += rest.len() as u64;
        }

        self.metrics
            .records_routed
            .fetch_add(routed, Ordering::Relaxed);
        self.metrics.copies_made.fetch_add(copies, Ordering::Relaxed);
        if unrouted > 0 {
            self.metrics
                .records_unrouted
                .fetch_add(unrouted as u64, Ordering::Relaxed);
            tracing::debug!(records = unrouted, "records matched no sink, dropped");
        }

        RoutedBatch { per_sink, unrouted }
    }

    pub fn metrics(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            records_routed: self.metrics.records_routed.load(Ordering::Relaxed),
            copies_made: self.metrics.copies_made.load(Ordering::Relaxed),
            records_unrouted: self.metrics.records_unrouted.load(Ordering::Relaxed),
            evaluation_errors: self.metrics.evaluation_errors.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("routes", &self.routes)
            .field("sinks", &self.sinks)
            .finish_non_exhaustive()
    }
}

/// Result of routing one batch
#[derive(Debug)]
pub struct RoutedBatch {
    per_sink: Vec<Vec<Record>>,
    unrouted: usize,
}

impl RoutedBatch {
    /// Records destined for a sink
    pub fn for_sink(&self, sink: SinkId) -> &[Record] {
        self.per_sink
            .get(sink.as_usize())
            .map_or(&[][..], Vec::as_slice)
    }

    /// Take the records destined for a sink
    pub fn take(&mut self, sink: SinkId) -> Vec<Record> {
        self.per_sink
            .get_mut(sink.as_usize())
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Records dropped for matching no sink
    #[inline]
    pub fn unrouted(&self) -> usize {
        self.unrouted
    }

    /// Records across all sinks, counting fan-out copies
    pub fn total(&self) -> usize {
        self.per_sink.iter().map(Vec::len).sum()
    }

    /// Non-empty sub-batches with their sink
    pub fn into_sinks(self) -> impl Iterator<Item = (SinkId, Vec<Record>)> {
        self.per_sink
            .into_iter()
            .enumerate()
            .filter(|(_, records)| !records.is_empty())
            .map(|(index, records)| (SinkId::new(index as u16), records))
    }
}
