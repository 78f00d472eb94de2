//! Execution of a single step: render, send, classify, loop.

use crate::catalog::{ApiTemplate, JSONRPC_VERSION};
use crate::error::StepError;
use crate::model::{StepDefinition, Variables};
use crate::resolver::{self, ResponseRegistry};
use crate::transport::{Transport, TransportResponse};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// What a step contributed to its case execution.
#[derive(Debug)]
pub struct StepReport {
    /// Transport calls made.
    pub attempts: usize,
    /// Last HTTP status seen, or the fatal `code` value.
    pub status_code: i64,
    pub outcome: Result<(), StepError>,
}

/// How a decoded response is treated by the loop policy.
#[derive(Debug, PartialEq)]
enum Verdict {
    Success,
    /// `error` field present.
    Retryable(String),
    /// `code` field present and not 200.
    Fatal(i64),
}

/// Runs one step against one template.
pub struct StepController<'a> {
    template: &'a ApiTemplate,
    transport: &'a dyn Transport,
    url: &'a str,
}

impl<'a> StepController<'a> {
    pub fn new(template: &'a ApiTemplate, transport: &'a dyn Transport, url: &'a str) -> Self {
        Self {
            template,
            transport,
            url,
        }
    }

    /// Execute `step` (at position `index`) to a terminal outcome.
    ///
    /// On success the last response, with the step's `response`
    /// fields merged over it, is registered under the step key.
    /// `next_id` supplies JSON-RPC ids and is advanced per attempt.
    pub async fn execute(
        &self,
        step: &StepDefinition,
        index: usize,
        case_vars: &Variables,
        registry: &mut ResponseRegistry,
        next_id: &mut u64,
    ) -> StepReport {
        let key = step.key(index);
        let vars = step_variables(step, case_vars, registry);
        let unbounded = step.is_unbounded();
        let iterations = usize::try_from(step.loop_count).unwrap_or(0);

        let mut attempts = 0;
        let mut retries: i64 = 0;
        let mut iteration = 0;
        let mut status_code = 0;
        let mut last_success = None;

        loop {
            if !unbounded && iteration >= iterations {
                break;
            }
            iteration += 1;

            let envelope = match self.template.compile(&vars, *next_id) {
                Ok(envelope) => envelope,
                Err(err) => {
                    return StepReport {
                        attempts,
                        status_code,
                        outcome: Err(err),
                    }
                }
            };
            let request_id = *next_id;
            *next_id += 1;
            attempts += 1;

            debug!(
                step = %key,
                method = %self.template.method(),
                attempt = attempts,
                "Sending request"
            );
            let (status, response) = self.exchange(&envelope, request_id).await;
            status_code = i64::from(status);

            match classify(&response) {
                Verdict::Fatal(code) => {
                    return StepReport {
                        attempts,
                        status_code: code,
                        outcome: Err(StepError::FatalCode { step: key, code }),
                    };
                }
                Verdict::Retryable(message) => {
                    let exhausted = step.max_retry >= 0 && retries >= step.max_retry;
                    if !unbounded || exhausted {
                        return StepReport {
                            attempts,
                            status_code,
                            outcome: Err(StepError::Application {
                                step: key,
                                attempts,
                                message,
                            }),
                        };
                    }
                    retries += 1;
                    warn!(
                        step = %key,
                        retry = retries,
                        "Step returned an error, retrying in {:?}: {}",
                        step.interval(),
                        message
                    );
                    tokio::time::sleep(step.interval()).await;
                }
                Verdict::Success => {
                    last_success = Some(response);
                    if unbounded {
                        break;
                    }
                    if iteration < iterations {
                        tokio::time::sleep(step.interval()).await;
                    }
                }
            }
        }

        if let Some(mut response) = last_success {
            for (field, value) in &step.response {
                response.insert(field.clone(), value.clone());
            }
            registry.insert(key, json!({ "response": Value::Object(response) }));
        }

        StepReport {
            attempts,
            status_code,
            outcome: Ok(()),
        }
    }

    /// Send one envelope. Transport failures and undecodable bodies
    /// come back as a synthetic response carrying an `error` field.
    async fn exchange(&self, envelope: &Value, request_id: u64) -> (u16, Map<String, Value>) {
        let reply = self.transport.send(self.url, envelope).await;
        let status = reply.as_ref().map(|r| r.status).unwrap_or(0);

        match reply.and_then(decode_response) {
            Ok(response) => (status, response),
            Err(err) => {
                let mut response = Map::new();
                response.insert("jsonrpc".into(), json!(JSONRPC_VERSION));
                response.insert("id".into(), json!(request_id));
                response.insert("error".into(), Value::String(err.to_string()));
                (status, response)
            }
        }
    }
}

/// Case variables overlaid with the step's resolved overrides.
fn step_variables(
    step: &StepDefinition,
    case_vars: &Variables,
    registry: &ResponseRegistry,
) -> Variables {
    let mut vars = case_vars.clone();
    for (name, value) in &step.request {
        vars.insert(name.clone(), resolver::resolve(value, registry));
    }
    vars
}

fn decode_response(reply: TransportResponse) -> Result<Map<String, Value>, StepError> {
    match serde_json::from_str::<Value>(&reply.body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StepError::InvalidResponse {
            status: reply.status,
            reason: format!("expected a JSON object, got {other}"),
        }),
        Err(e) => Err(StepError::InvalidResponse {
            status: reply.status,
            reason: e.to_string(),
        }),
    }
}

fn classify(response: &Map<String, Value>) -> Verdict {
    if let Some(code) = response.get("code").filter(|v| !v.is_null()) {
        // Compared as a float so `200.0` and `"200"` both count as OK.
        let numeric = code
            .as_f64()
            .or_else(|| code.as_str().and_then(|s| s.trim().parse::<f64>().ok()));
        if numeric != Some(200.0) {
            return Verdict::Fatal(numeric.map_or(0, |c| c as i64));
        }
    }

    match response.get("error") {
        None | Some(Value::Null) => Verdict::Success,
        Some(Value::String(message)) => Verdict::Retryable(message.clone()),
        Some(other) => Verdict::Retryable(other.to_string()),
    }
}
