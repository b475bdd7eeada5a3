//! Hierarchical test-fixture generation from declarative playbooks.
//!
//! Playbooks are written as templated YAML documents. Each one names an
//! HTTP endpoint and an ordered list of steps; a step is a document to
//! upload. Steps may refer to values produced by other steps, including
//! server-assigned fields of their responses, with `!ref` JSONPath
//! expressions. The engine executes steps in repeated passes so that a
//! reference to a not-yet-available response resolves on a later pass.
//!
//! The crate splits into a loading side and an execution side:
//!
//! - [`template`] renders the sources and expands `!include` directives;
//! - [`bridge`] preserves `!ref` tags across the generic YAML decode;
//! - [`loader`] drives the pipeline and merges directories into a [`Config`];
//! - [`binder`] snapshots the configuration as the evaluation context of
//!   every [`DeferredRef`];
//! - [`engine`] uploads pending steps and records their responses.

pub mod binder;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod reference;
pub mod template;
pub mod value;

pub use config::{Config, Playbook, RequestParams};
pub use engine::{Engine, RunOptions, RunReport};
pub use error::{LoadError, RunError};
pub use loader::Loader;
pub use reference::DeferredRef;
pub use value::Value;
