//! Playbook execution engine.
//!
//! Execution is a fixed number of passes over every playbook. A step that
//! has recorded a `_response` is done and is skipped; a step whose request
//! fails stays pending and is retried on the next pass. References are
//! rebound before every step attempt, so a value that resolved to null on
//! one pass picks up responses recorded since and converges on a later one.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};

use crate::binder;
use crate::config::{Config, RequestParams, PLAYBOOK_KIND_REQUEST, RESPONSE_FIELD};
use crate::error::RunError;
use crate::value::Value;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Execution policy for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Extra passes over the playbooks after the first one.
    pub retries: u32,
    /// Prepare every request but send none of them.
    pub dry_run: bool,
    /// Log faults and keep going instead of aborting the run.
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            retries: 10,
            dry_run: false,
            force: false,
        }
    }
}

/// What happened to one pending step on one pass.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Request succeeded and the response was recorded on the step.
    Completed,
    /// Dry run: the request was prepared but not sent.
    Skipped,
    /// Server answered with an error status; the step stays pending.
    Status(u16),
    /// The request could not be built or sent; the step stays pending.
    Transport(String),
    /// The step body could not be serialized.
    Serialize(String),
    /// The response could not be read or decoded.
    BadResponse(String),
}

#[derive(Debug, Clone)]
pub struct StepAttempt {
    pub playbook: String,
    pub step: usize,
    pub outcome: AttemptOutcome,
}

/// Diagnostic record of a run: every attempt on every pending step.
#[derive(Debug, Default)]
pub struct RunReport {
    pub passes: u32,
    pub attempts: Vec<StepAttempt>,
}

impl RunReport {
    fn record(&mut self, playbook: &str, step: usize, outcome: AttemptOutcome) {
        self.attempts.push(StepAttempt {
            playbook: playbook.to_string(),
            step,
            outcome,
        });
    }

    /// Number of attempts that completed a step.
    pub fn completed(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Completed)
            .count()
    }
}

/// Runs request playbooks against their target endpoints.
pub struct Engine {
    client: Client,
    options: RunOptions,
}

impl Engine {
    pub fn new(options: RunOptions) -> Result<Self, RunError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| RunError::Client { source })?;
        Ok(Self { client, options })
    }

    /// Use a preconfigured client instead of the default one.
    pub fn with_client(client: Client, options: RunOptions) -> Self {
        Self { client, options }
    }

    /// Execute every playbook until all steps are done or passes run out.
    ///
    /// Without `force`, the first fault aborts the run; steps already
    /// completed keep their recorded responses, so a rerun of the same
    /// configuration resumes where it stopped.
    pub async fn run(&self, config: &mut Config) -> Result<RunReport, RunError> {
        let names: Vec<String> = config.playbooks.keys().cloned().collect();
        let mut report = RunReport::default();

        for retries_remaining in (0..=self.options.retries).rev() {
            report.passes += 1;
            for name in &names {
                self.run_playbook(config, name, retries_remaining, &mut report)
                    .await?;
            }
            if pending_steps(config) == 0 {
                break;
            }
        }
        Ok(report)
    }

    async fn run_playbook(
        &self,
        config: &mut Config,
        name: &str,
        retries_remaining: u32,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        let (params, step_count) = {
            let Some(playbook) = config.playbooks.get(name) else {
                return Ok(());
            };
            match playbook.kind.as_deref() {
                None => {
                    return self.playbook_fault(RunError::MissingKind {
                        playbook: name.to_string(),
                    });
                }
                Some(PLAYBOOK_KIND_REQUEST) => {}
                Some(kind) => {
                    return self.playbook_fault(RunError::UnknownKind {
                        playbook: name.to_string(),
                        kind: kind.to_string(),
                    });
                }
            }
            let Some(params) = playbook.params.clone() else {
                return self.playbook_fault(RunError::MissingParams {
                    playbook: name.to_string(),
                });
            };
            if playbook.steps.is_empty() {
                return self.playbook_fault(RunError::MissingSteps {
                    playbook: name.to_string(),
                });
            }
            (params, playbook.steps.len())
        };

        for index in 0..step_count {
            // Rebind so references see responses recorded by earlier steps,
            // including ones from this very pass.
            binder::bind(config);

            let Some(playbook) = config.playbooks.get(name) else {
                return Ok(());
            };
            let Some(step) = playbook.steps.get(index) else {
                break;
            };
            let Some(step_map) = step.as_mapping() else {
                continue;
            };
            if step_map.contains_key(RESPONSE_FIELD) {
                continue;
            }

            let body = if is_body_method(&params.method) {
                match serde_json::to_string(step) {
                    Ok(body) => Some(body),
                    Err(err) => {
                        report.record(name, index, AttemptOutcome::Serialize(err.to_string()));
                        if retries_remaining > 0 {
                            continue;
                        }
                        if self.options.force {
                            tracing::warn!(
                                playbook = %name,
                                step = index,
                                error = %err,
                                "failed to serialize step body, skipping"
                            );
                            continue;
                        }
                        return Err(RunError::BodySerialize {
                            playbook: name.to_string(),
                            step: index,
                            source: err,
                        });
                    }
                }
            } else {
                None
            };

            if self.options.dry_run {
                tracing::info!(
                    playbook = %name,
                    step = index,
                    method = %params.method,
                    url = %params.url,
                    "dry run, not sending request"
                );
                report.record(name, index, AttemptOutcome::Skipped);
                continue;
            }

            tracing::info!(
                playbook = %name,
                step = index,
                method = %params.method,
                url = %params.url,
                "running step"
            );

            match self.execute_step(&params, body, name, index).await {
                Ok(response) => {
                    set_response(config, name, index, response);
                    report.record(name, index, AttemptOutcome::Completed);
                }
                Err(err @ (RunError::ResponseRead { .. } | RunError::ResponseDecode { .. })) => {
                    report.record(name, index, AttemptOutcome::BadResponse(err.to_string()));
                    if self.options.force {
                        // The request itself went through; an unusable
                        // response still marks the step done.
                        tracing::warn!(
                            playbook = %name,
                            step = index,
                            error = %err,
                            "unusable response, marking step done"
                        );
                        set_response(config, name, index, serde_json::Value::Object(serde_json::Map::new()));
                        continue;
                    }
                    return Err(err);
                }
                Err(err) => {
                    let outcome = match &err {
                        RunError::Status { status, .. } => AttemptOutcome::Status(*status),
                        _ => AttemptOutcome::Transport(err.to_string()),
                    };
                    report.record(name, index, outcome);
                    if self.options.force {
                        tracing::warn!(
                            playbook = %name,
                            step = index,
                            error = %err,
                            "step failed, leaving it pending"
                        );
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn playbook_fault(&self, err: RunError) -> Result<(), RunError> {
        if self.options.force {
            tracing::warn!(error = %err, "skipping playbook");
            return Ok(());
        }
        Err(err)
    }

    async fn execute_step(
        &self,
        params: &RequestParams,
        body: Option<String>,
        playbook: &str,
        step: usize,
    ) -> Result<serde_json::Value, RunError> {
        let method = Method::from_bytes(params.method.to_uppercase().as_bytes()).map_err(|err| {
            RunError::Request {
                playbook: playbook.to_string(),
                step,
                message: err.to_string(),
            }
        })?;

        let mut request = self.client.request(method, &params.url);
        if !params.params.is_empty() {
            request = request.query(&params.params);
        }
        for (key, value) in &params.headers {
            request = request.header(key, value);
        }
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await.map_err(|source| RunError::Transport {
            playbook: playbook.to_string(),
            step,
            source,
        })?;

        // Read the body before checking the status so error responses can
        // carry the server's message.
        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| RunError::ResponseRead {
            playbook: playbook.to_string(),
            step,
            source,
        })?;

        if status.as_u16() >= 400 {
            return Err(RunError::Status {
                playbook: playbook.to_string(),
                step,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|source| RunError::ResponseDecode {
            playbook: playbook.to_string(),
            step,
            source,
        })
    }
}

fn is_body_method(method: &str) -> bool {
    matches!(method.to_uppercase().as_str(), "POST" | "PUT" | "PATCH")
}

fn set_response(config: &mut Config, name: &str, step: usize, response: serde_json::Value) {
    let map = config
        .playbooks
        .get_mut(name)
        .and_then(|playbook| playbook.steps.get_mut(step))
        .and_then(Value::as_mapping_mut);
    match map {
        Some(map) => {
            map.insert(RESPONSE_FIELD.to_string(), Value::from_json(response));
        }
        None => {
            tracing::warn!(playbook = %name, step, "cannot record response on a non-mapping step");
        }
    }
}

/// Steps that are mappings without a recorded response.
fn pending_steps(config: &Config) -> usize {
    config
        .playbooks
        .values()
        .flat_map(|playbook| &playbook.steps)
        .filter(|step| {
            step.as_mapping()
                .is_some_and(|map| !map.contains_key(RESPONSE_FIELD))
        })
        .count()
}
