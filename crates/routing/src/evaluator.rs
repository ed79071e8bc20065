//! Expression evaluation contract
//!
//! The router does not parse condition expressions itself; it hands the
//! expression string and the event to an [`ExpressionEvaluator`].

use conduit_protocol::{Event, Value};
use thiserror::Error;

/// Failure to evaluate one expression against one event
#[derive(Debug, Clone, Error)]
#[error("cannot evaluate '{expression}': {message}")]
pub struct EvaluationError {
    pub expression: String,
    pub message: String,
}

impl EvaluationError {
    pub fn new(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            message: message.into(),
        }
    }
}

/// Evaluates a condition expression against an event
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, event: &Event) -> Result<bool, EvaluationError>;
}

impl<F> ExpressionEvaluator for F
where
    F: Fn(&str, &Event) -> Result<bool, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, expression: &str, event: &Event) -> Result<bool, EvaluationError> {
        self(expression, event)
    }
}

/// Minimal field-test evaluator
///
/// Understands three forms:
///
/// - `/path` - the field is boolean `true`
/// - `/path == <json>` - the field equals the JSON literal
/// - `/path != <json>` - the field is absent or differs from the literal
///
/// Anything else is an evaluation error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldEvaluator;

impl ExpressionEvaluator for FieldEvaluator {
    fn evaluate(&self, expression: &str, event: &Event) -> Result<bool, EvaluationError> {
        let expression = expression.trim();

        for (op, negate) in [("==", false), ("!=", true)] {
            if let Some((path, literal)) = expression.split_once(op) {
                let expected: Value = serde_json::from_str(literal.trim())
                    .map_err(|e| EvaluationError::new(expression, e.to_string()))?;
                let equal = event.get(path.trim()) == Some(&expected);
                return Ok(equal != negate);
            }
        }

        if !expression.starts_with('/') {
            return Err(EvaluationError::new(expression, "expected a key path"));
        }
        match event.get(expression) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(EvaluationError::new(
                expression,
                format!("field is not a boolean: {other}"),
            )),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        Event::from_json("log", r#"{"is_error":true,"level":"warn","code":7}"#).unwrap()
    }

    #[test]
    fn test_boolean_field() {
        let eval = FieldEvaluator;
        assert!(eval.evaluate("/is_error", &event()).unwrap());
        assert!(!eval.evaluate("/missing", &event()).unwrap());
        assert!(eval.evaluate("/level", &event()).is_err());
        assert!(eval.evaluate("is_error", &event()).is_err());
    }

    #[test]
    fn test_equality() {
        let eval = FieldEvaluator;
        assert!(eval.evaluate(r#"/level == "warn""#, &event()).unwrap());
        assert!(eval.evaluate("/code == 7", &event()).unwrap());
        assert!(eval.evaluate("/code != 8", &event()).unwrap());
        assert!(eval.evaluate("/missing != 1", &event()).unwrap());
        assert!(!eval.evaluate(r#"/level != "warn""#, &event()).unwrap());
        assert!(eval.evaluate("/code == nope", &event()).is_err());
    }

    #[test]
    fn test_closure_evaluator() {
        let eval = |expr: &str, _: &Event| -> Result<bool, EvaluationError> { Ok(expr == "yes") };
        assert!(eval.evaluate("yes", &event()).unwrap());
        assert!(!eval.evaluate("no", &event()).unwrap());
    }
}
