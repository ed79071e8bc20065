//! Routing error types

use thiserror::Error;

/// Result type for router construction
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Errors raised while compiling a router
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Sink subscribes to a route the pipeline does not declare
    #[error("sink '{sink}' subscribes to undeclared route '{route}'")]
    UnknownRoute { sink: String, route: String },

    /// Two routes share a name
    #[error("duplicate route '{name}'")]
    DuplicateRoute { name: String },

    /// A route uses the reserved default name
    #[error("route name '{name}' is reserved")]
    ReservedRoute { name: String },

    #[error("too many routes: at most {max} supported")]
    TooManyRoutes { max: usize },

    /// Two sinks share a name
    #[error("duplicate sink '{name}'")]
    DuplicateSink { name: String },

    #[error("too many sinks: at most {max} supported")]
    TooManySinks { max: usize },
}

impl RoutingError {
    #[inline]
    pub fn unknown_route(sink: impl Into<String>, route: impl Into<String>) -> Self {
        Self::UnknownRoute {
            sink: sink.into(),
            route: route.into(),
        }
    }

    #[inline]
    pub fn duplicate_route(name: impl Into<String>) -> Self {
        Self::DuplicateRoute { name: name.into() }
    }

    #[inline]
    pub fn duplicate_sink(name: impl Into<String>) -> Self {
        Self::DuplicateSink { name: name.into() }
    }
}
