//! Template rendering and file inclusion for YAML sources.
//!
//! Source files are minijinja templates producing YAML. After rendering,
//! `!include <path>` lines are replaced inline by the rendered content of the
//! referenced file, re-indented to the directive's column so the included
//! YAML nests where the directive sat.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use minijinja::{context, Environment, Value};
use rand::Rng;

use crate::error::LoadError;

const INCLUDE_TAG: &str = "!include ";

/// Template engine with the generator's custom functions registered.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_function("environ", fn_environ);
        env.add_function("generate_name", fn_generate_name);
        env.add_function("lorem", fn_lorem);
        Self { env }
    }

    /// Render one source file and expand its include directives.
    pub fn render_file(&self, path: &Path, base_dir: &Path) -> Result<String, LoadError> {
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let rendered = self.env.template_from_str(&content)?.render(context! {})?;
        Ok(self.expand_includes(&rendered, base_dir))
    }

    /// Inline `!include` directives, recursively.
    ///
    /// A failing include is logged and the line left as-is, matching the
    /// loader's policy of deferring structural problems to the YAML parse.
    fn expand_includes(&self, input: &str, base_dir: &Path) -> String {
        let mut lines: Vec<String> = input.lines().map(str::to_string).collect();
        for line in &mut lines {
            let Some(column) = line.find(INCLUDE_TAG) else { continue };
            let include_path = line[column + INCLUDE_TAG.len()..].trim();
            let full_path = base_dir.join(include_path);

            match self.render_file(&full_path, base_dir) {
                Ok(content) => {
                    let content = content
                        .trim_start_matches("---\r\n")
                        .trim_start_matches("---\n")
                        .trim();
                    // Re-indent to the directive's column so the included
                    // document nests at the same level.
                    let indented = content.replace('\n', &format!("\n{}", " ".repeat(column)));
                    *line = format!("{}{}", &line[..column], indented);
                }
                Err(err) => {
                    tracing::warn!(path = %include_path, error = %err, "failed to process include");
                }
            }
        }
        lines.join("\n")
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Custom template functions

fn fn_environ() -> Value {
    let env: BTreeMap<String, String> = std::env::vars().collect();
    Value::from_serialize(&env)
}

fn fn_generate_name(style: Option<String>) -> String {
    let mut rng = rand::thread_rng();
    let length = rng.gen_range(5..=10);
    let name: String = (0..length).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();

    if style.as_deref() == Some("capital") {
        capitalize(&name)
    } else {
        name
    }
}

fn fn_lorem() -> String {
    let mut rng = rand::thread_rng();
    let mut words = vec![capitalize(&random_word(&mut rng))];
    for _ in 0..rng.gen_range(2..=5) {
        words.push(random_word(&mut rng));
    }
    format!("{}.", words.join(" "))
}

fn random_word(rng: &mut impl Rng) -> String {
    let length = rng.gen_range(3..=8);
    (0..length).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
