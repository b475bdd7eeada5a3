//! Context binding for deferred references.

use std::sync::Arc;

use crate::config::Config;
use crate::value::Value;

/// Bind the current state of `config` as the evaluation context of every
/// deferred reference reachable through playbook steps.
///
/// References are created without a context, so this must run before any
/// dump and before every step attempt; rerunning it is cheap and idempotent,
/// and picks up `_response` values recorded since the previous binding. The
/// context handed out is a shared snapshot, not a pointer into the live
/// graph, so the configuration stays independently owned by the engine.
pub fn bind(config: &mut Config) {
    let snapshot = Arc::new(config.to_json());
    for playbook in config.playbooks.values_mut() {
        for step in &mut playbook.steps {
            bind_value(step, &snapshot);
        }
    }
}

fn bind_value(value: &mut Value, context: &Arc<serde_json::Value>) {
    match value {
        Value::Ref(reference) => reference.bind(Arc::clone(context)),
        Value::Mapping(map) => {
            for child in map.values_mut() {
                bind_value(child, context);
            }
        }
        Value::Sequence(seq) => {
            for child in seq {
                bind_value(child, context);
            }
        }
        _ => {}
    }
}
