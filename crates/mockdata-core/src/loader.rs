//! Loading pipeline: render, parse, reference extraction, merge.
//!
//! Each template directory contributes one index document. The pipeline for
//! a directory is render (templates plus includes), parse to YAML, collect
//! `!ref` tags, decode to the generic graph, reapply the tags as deferred
//! references, then decode the playbook structure. Directories are merged
//! in argument order with first writer wins.

use std::path::{Path, PathBuf};

use crate::bridge;
use crate::config::Config;
use crate::error::LoadError;
use crate::template::TemplateEngine;
use crate::value::Value;

/// Loads playbook configurations from template directories.
pub struct Loader {
    index_file: String,
    engine: TemplateEngine,
}

impl Loader {
    /// `index_file` is the per-directory entry point, e.g. `index.yaml`.
    pub fn new(index_file: impl Into<String>) -> Self {
        Self {
            index_file: index_file.into(),
            engine: TemplateEngine::new(),
        }
    }

    /// Load and merge every template directory, in order.
    pub fn load(&self, dirs: &[PathBuf]) -> Result<Config, LoadError> {
        let mut config = Config::default();
        for dir in dirs {
            tracing::info!(dir = %dir.display(), "loading templates");
            config.merge(self.load_dir(dir)?);
        }
        Ok(config)
    }

    /// Load the index document of a single directory.
    pub fn load_dir(&self, dir: &Path) -> Result<Config, LoadError> {
        let index = dir.join(&self.index_file);
        let rendered = self.engine.render_file(&index, dir)?;
        parse_config(&rendered)
    }
}

/// Decode rendered YAML into a configuration, preserving `!ref` tags as
/// deferred references. The returned references are unbound; callers run
/// the binder before evaluating or dumping them.
pub fn parse_config(source: &str) -> Result<Config, LoadError> {
    let tree: serde_yaml::Value = serde_yaml::from_str(source)?;
    let refs = bridge::extract_ref_tags(&tree, "");
    let mut graph = Value::from_yaml(&tree);
    bridge::apply_ref_tags(&mut graph, &refs, "");
    Config::from_value(graph)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::binder;
    use crate::value::Value;

    const INDEX: &str = "index.yaml";

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_parse_config_preserves_refs() {
        let config = parse_config(
            "playbooks:\n  get_user:\n    type: request\n    steps:\n      - user_id: !ref $.playbooks.create_user.steps[0]._response.id\n",
        )
        .unwrap();

        let step = config.playbooks["get_user"].steps[0].as_mapping().unwrap();
        let Value::Ref(reference) = &step["user_id"] else {
            panic!("expected a deferred reference");
        };
        assert_eq!(reference.expression(), "$.playbooks.create_user.steps[0]._response.id");
        assert!(!reference.is_bound());
    }

    #[test]
    fn test_load_dir_renders_and_parses() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            INDEX,
            "playbooks:\n  create_user:\n    type: request\n    params:\n      url: http://localhost:8080/users\n      method: POST\n    steps:\n      - name: {{ generate_name() }}\n",
        );

        let config = Loader::new(INDEX).load_dir(dir.path()).unwrap();
        let playbook = &config.playbooks["create_user"];
        assert_eq!(playbook.params.as_ref().unwrap().method, "POST");

        let name = playbook.steps[0].as_mapping().unwrap()["name"].as_str().unwrap().to_string();
        assert!(!name.is_empty());
    }

    #[test]
    fn test_load_dir_with_include() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), INDEX, "playbooks:\n  users:\n    !include users.yaml");
        write(
            dir.path(),
            "users.yaml",
            "type: request\nparams:\n  url: http://localhost:8080/users\n  method: POST\nsteps:\n  - name: alice\n",
        );

        let config = Loader::new(INDEX).load_dir(dir.path()).unwrap();
        assert_eq!(config.playbooks["users"].kind.as_deref(), Some("request"));
        assert_eq!(config.playbooks["users"].steps.len(), 1);
    }

    #[test]
    fn test_load_merges_dirs_first_writer_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(
            first.path(),
            INDEX,
            "playbooks:\n  shared:\n    type: request\n    steps: [{origin: first}]\n  only_first:\n    type: request\n    steps: []\n",
        );
        write(
            second.path(),
            INDEX,
            "playbooks:\n  shared:\n    type: request\n    steps: [{origin: second}]\n  only_second:\n    type: request\n    steps: []\n",
        );

        let config = Loader::new(INDEX)
            .load(&[first.path().to_path_buf(), second.path().to_path_buf()])
            .unwrap();

        assert_eq!(config.playbooks.len(), 3);
        let origin = config.playbooks["shared"].steps[0].as_mapping().unwrap()["origin"].clone();
        assert_eq!(origin, Value::String("first".to_string()));
    }

    #[test]
    fn test_load_missing_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Loader::new(INDEX).load(&[dir.path().to_path_buf()]);
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_loaded_refs_resolve_after_binding() {
        // End-to-end: tags survive the load and evaluate against recorded
        // responses once bound.
        let mut config = parse_config(
            "playbooks:\n  create_user:\n    type: request\n    steps:\n      - name: alice\n  get_user:\n    type: request\n    steps:\n      - user_id: !ref $.playbooks.create_user.steps[0]._response.id\n        user_name: !ref $.playbooks.create_user.steps[0]._response.name\n",
        )
        .unwrap();

        // Nothing has executed yet, so both references resolve to null.
        binder::bind(&mut config);
        {
            let step = config.playbooks["get_user"].steps[0].as_mapping().unwrap();
            assert_eq!(step["user_id"].to_json(), serde_json::Value::Null);
            assert_eq!(step["user_name"].to_json(), serde_json::Value::Null);
        }

        config
            .playbooks
            .get_mut("create_user")
            .unwrap()
            .steps[0]
            .as_mapping_mut()
            .unwrap()
            .insert(
                "_response".to_string(),
                Value::from_json(serde_json::json!({"id": "user-123", "name": "alice"})),
            );
        binder::bind(&mut config);

        let step = config.playbooks["get_user"].steps[0].as_mapping().unwrap();
        let Value::Ref(reference) = &step["user_id"] else {
            panic!("expected a deferred reference");
        };
        assert_eq!(reference.evaluate(), serde_json::json!("user-123"));
        assert_eq!(serde_json::to_string(&step["user_id"]).unwrap(), r#""user-123""#);
        assert_eq!(serde_json::to_string(&step["user_name"]).unwrap(), r#""alice""#);
    }
}
