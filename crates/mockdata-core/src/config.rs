//! Playbook configuration model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::value::Value;

/// The only playbook type the execution engine recognizes.
pub const PLAYBOOK_KIND_REQUEST: &str = "request";

/// Reserved step field holding the decoded response of an executed step.
/// Its presence marks the step as done; templates must never supply it.
pub const RESPONSE_FIELD: &str = "_response";

/// Request parameters shared by every step of a request playbook.
/// Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// A named unit of work: request parameters plus an ordered list of steps.
///
/// `kind` is kept as the raw string from the source document; the engine
/// validates it so the abort-vs-continue policy can apply per playbook
/// instead of failing the whole load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playbook {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<RequestParams>,
    pub steps: Vec<Value>,
}

/// The merged configuration: one namespace of named playbooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Config {
    pub playbooks: BTreeMap<String, Playbook>,
}

impl Config {
    /// Decode a configuration from a generic document graph.
    ///
    /// A document without a `playbooks` key decodes to an empty
    /// configuration; a malformed structure is a load error.
    pub fn from_value(root: Value) -> Result<Config, LoadError> {
        let Value::Mapping(mut map) = root else {
            return Err(LoadError::Structure("document root must be a mapping".to_string()));
        };
        let Some(playbooks) = map.remove("playbooks") else {
            return Ok(Config::default());
        };
        let Value::Mapping(playbooks) = playbooks else {
            return Err(LoadError::Structure("playbooks must be a mapping".to_string()));
        };

        let mut config = Config::default();
        for (name, node) in playbooks {
            let playbook = Playbook::from_value(&name, node)?;
            config.playbooks.insert(name, playbook);
        }
        Ok(config)
    }

    /// Merge `src` into `self`, first writer wins.
    ///
    /// A playbook whose name already exists is skipped with a warning, so
    /// the order in which sources are merged matters to the caller.
    pub fn merge(&mut self, src: Config) {
        for (name, playbook) in src.playbooks {
            if self.playbooks.contains_key(&name) {
                tracing::warn!(playbook = %name, "playbook already exists, skipping");
                continue;
            }
            self.playbooks.insert(name, playbook);
        }
    }

    /// Plain-JSON snapshot of the whole configuration.
    ///
    /// References evaluate against whatever context they currently hold;
    /// unbound references render as null. The binder feeds this snapshot
    /// back to every reference as the new context.
    pub fn to_json(&self) -> serde_json::Value {
        let mut playbooks = serde_json::Map::new();
        for (name, playbook) in &self.playbooks {
            playbooks.insert(name.clone(), playbook.to_json());
        }
        let mut root = serde_json::Map::new();
        root.insert("playbooks".to_string(), serde_json::Value::Object(playbooks));
        serde_json::Value::Object(root)
    }
}

impl Playbook {
    fn from_value(name: &str, node: Value) -> Result<Playbook, LoadError> {
        let Value::Mapping(mut map) = node else {
            return Err(LoadError::Structure(format!("playbook {name} must be a mapping")));
        };

        let kind = match map.remove("type") {
            None => None,
            Some(Value::String(kind)) => Some(kind),
            Some(_) => {
                return Err(LoadError::Structure(format!("playbook {name} type must be a string")));
            }
        };

        let params = match map.remove("params") {
            None => None,
            Some(node) => {
                let params: RequestParams = serde_json::from_value(node.to_json())
                    .map_err(|err| LoadError::Params(format!("playbook {name}: {err}")))?;
                Some(params)
            }
        };

        let steps = match map.remove("steps") {
            None => Vec::new(),
            Some(Value::Sequence(steps)) => steps,
            Some(_) => {
                return Err(LoadError::Structure(format!("playbook {name} steps must be a sequence")));
            }
        };

        let mut playbook = Playbook { kind, params, steps };
        playbook.strip_reserved_fields(name);
        Ok(playbook)
    }

    /// Drop a template-supplied `_response` so a step can never be born done.
    fn strip_reserved_fields(&mut self, name: &str) {
        for (index, step) in self.steps.iter_mut().enumerate() {
            if let Some(map) = step.as_mapping_mut() {
                if map.remove(RESPONSE_FIELD).is_some() {
                    tracing::warn!(
                        playbook = %name,
                        step = index,
                        "template supplied reserved field {RESPONSE_FIELD}, dropping"
                    );
                }
            }
        }
    }

    fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        if let Some(kind) = &self.kind {
            out.insert("type".to_string(), serde_json::Value::String(kind.clone()));
        }
        if let Some(params) = &self.params {
            let params = serde_json::to_value(params).unwrap_or(serde_json::Value::Null);
            out.insert("params".to_string(), params);
        }
        out.insert(
            "steps".to_string(),
            serde_json::Value::Array(self.steps.iter().map(Value::to_json).collect()),
        );
        serde_json::Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_playbook() -> Playbook {
        Playbook {
            kind: Some(PLAYBOOK_KIND_REQUEST.to_string()),
            params: None,
            steps: Vec::new(),
        }
    }

    fn config_with(names: &[&str]) -> Config {
        let mut config = Config::default();
        for name in names {
            config.playbooks.insert(name.to_string(), request_playbook());
        }
        config
    }

    #[test]
    fn test_from_value_full_playbook() {
        let graph = Value::from_json(serde_json::json!({
            "playbooks": {
                "create_user": {
                    "type": "request",
                    "params": {
                        "url": "http://example.com/users",
                        "method": "POST",
                        "headers": {"Authorization": "Bearer token"}
                    },
                    "steps": [{"name": "alice"}]
                }
            }
        }));
        let config = Config::from_value(graph).unwrap();

        let playbook = &config.playbooks["create_user"];
        assert_eq!(playbook.kind.as_deref(), Some("request"));
        let params = playbook.params.as_ref().unwrap();
        assert_eq!(params.url, "http://example.com/users");
        assert_eq!(params.method, "POST");
        assert_eq!(params.headers["Authorization"], "Bearer token");
        assert_eq!(playbook.steps.len(), 1);
    }

    #[test]
    fn test_from_value_without_playbooks_key() {
        let graph = Value::from_json(serde_json::json!({"other": 1}));
        let config = Config::from_value(graph).unwrap();
        assert!(config.playbooks.is_empty());
    }

    #[test]
    fn test_from_value_rejects_scalar_root() {
        assert!(Config::from_value(Value::String("nope".to_string())).is_err());
    }

    #[test]
    fn test_from_value_rejects_bad_params() {
        let graph = Value::from_json(serde_json::json!({
            "playbooks": {"p": {"type": "request", "params": {"method": "GET"}}}
        }));
        // url is required
        assert!(Config::from_value(graph).is_err());
    }

    #[test]
    fn test_from_value_strips_reserved_response_field() {
        let graph = Value::from_json(serde_json::json!({
            "playbooks": {
                "p": {
                    "type": "request",
                    "steps": [{"name": "x", "_response": {"id": "sneaky"}}]
                }
            }
        }));
        let config = Config::from_value(graph).unwrap();
        let step = config.playbooks["p"].steps[0].as_mapping().unwrap();
        assert!(!step.contains_key(RESPONSE_FIELD));
        assert!(step.contains_key("name"));
    }

    #[test]
    fn test_merge_disjoint_names_is_union() {
        let mut dst = config_with(&["pb1"]);
        dst.merge(config_with(&["pb2"]));
        assert_eq!(dst.playbooks.len(), 2);
        assert!(dst.playbooks.contains_key("pb1"));
        assert!(dst.playbooks.contains_key("pb2"));
    }

    #[test]
    fn test_merge_keeps_first_on_collision() {
        let mut dst = config_with(&["pb1"]);
        let mut src = Config::default();
        src.playbooks.insert(
            "pb1".to_string(),
            Playbook {
                kind: Some("different".to_string()),
                params: None,
                steps: Vec::new(),
            },
        );
        dst.merge(src);
        assert_eq!(dst.playbooks.len(), 1);
        assert_eq!(dst.playbooks["pb1"].kind.as_deref(), Some(PLAYBOOK_KIND_REQUEST));
    }

    #[test]
    fn test_to_json_shape() {
        let config = config_with(&["pb1"]);
        let json = config.to_json();
        assert_eq!(json["playbooks"]["pb1"]["type"], "request");
        assert!(json["playbooks"]["pb1"]["steps"].as_array().unwrap().is_empty());
    }
}
