//! Route definitions

use serde::{Deserialize, Serialize};

/// Route name that matches events satisfying no declared route
pub const DEFAULT_ROUTE: &str = "_default";

/// A named predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    /// Expression handed to the evaluator
    pub condition: String,
}

impl Route {
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: condition.into(),
        }
    }
}
