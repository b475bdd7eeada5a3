//! Deferred path-query references.

use std::sync::Arc;

use serde::ser::{Serialize, Serializer};
use serde_json_path::JsonPath;

/// A scalar placeholder carrying a JSONPath expression.
///
/// References are created by the tag preservation bridge wherever a source
/// document marks a scalar with `!ref`. They hold no context at first; the
/// binder attaches a snapshot of the whole configuration before every dump
/// and every execution pass, and [`evaluate`](DeferredRef::evaluate) resolves
/// the expression against whatever snapshot is currently bound.
#[derive(Debug, Clone)]
pub struct DeferredRef {
    expression: String,
    context: Option<Arc<serde_json::Value>>,
}

impl DeferredRef {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            context: None,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn is_bound(&self) -> bool {
        self.context.is_some()
    }

    /// Attach (or replace) the evaluation context. The snapshot is shared,
    /// not owned; rebinding is cheap and may happen any number of times.
    pub fn bind(&mut self, context: Arc<serde_json::Value>) {
        self.context = Some(context);
    }

    /// Resolve the expression against the bound context.
    ///
    /// Never faults: an unbound context, a malformed expression, or an
    /// expression selecting nothing all yield `Null` with a diagnostic.
    /// Exactly one match is unwrapped; several matches come back as an array.
    pub fn evaluate(&self) -> serde_json::Value {
        let Some(context) = &self.context else {
            tracing::warn!(expression = %self.expression, "no context set for reference");
            return serde_json::Value::Null;
        };

        let path = match JsonPath::parse(&self.expression) {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(
                    expression = %self.expression,
                    error = %err,
                    "failed to parse reference expression"
                );
                return serde_json::Value::Null;
            }
        };

        let matches = path.query(context).all();
        match matches.len() {
            0 => {
                tracing::warn!(expression = %self.expression, "reference returned no results");
                serde_json::Value::Null
            }
            1 => matches[0].clone(),
            _ => serde_json::Value::Array(matches.into_iter().cloned().collect()),
        }
    }
}

/// Context identity is irrelevant for equality; two references are the same
/// reference if they carry the same expression.
impl PartialEq for DeferredRef {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

/// Serializing a reference emits the evaluated value, never the expression.
impl Serialize for DeferredRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.evaluate().serialize(serializer)
    }
}
