//! Data model for API catalogs, test flows and run results.

use anyhow::{bail, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Variable environment threaded through a case execution.
pub type Variables = HashMap<String, Value>;

/// One record of the API catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDefinition {
    pub request: ApiRequest,
    /// Response schema. Carried for documentation only; the
    /// engine never reads it.
    #[serde(default)]
    pub response: Option<Value>,
}

/// The request half of an [`ApiDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    /// JSON-RPC method name. Lookup is exact and case-sensitive.
    pub method: String,
    /// Parameter template, kept as the exact source text.
    /// `{{name}}` placeholders may appear anywhere inside it.
    #[serde(default)]
    pub params: Option<Box<RawValue>>,
}

/// Root of the test flow file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestFlow {
    pub cases: Vec<TestCase>,
}

/// A named, ordered list of steps executed `loop * thread` times
/// by `thread` concurrent workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(deserialize_with = "deserialize_steps")]
    pub steps: Vec<StepDefinition>,
    /// Executions per worker.
    #[serde(rename = "loop", default = "default_case_loop")]
    pub loop_count: usize,
    /// Number of concurrent workers.
    #[serde(default = "default_thread")]
    pub thread: usize,
    /// Seed of the variable environment for every execution.
    #[serde(default)]
    pub variables: Variables,
}

/// A single step of a test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// API method name, looked up in the template catalog.
    pub method: String,
    /// Key under which the step's response is registered.
    /// Defaults to the step's ordinal position.
    #[serde(default)]
    pub id: Option<String>,
    /// Per-step variable overrides. String values of the form
    /// `<step>.response.<path>` are cross-step references.
    #[serde(default)]
    pub request: Variables,
    /// Fields merged over the response before it is registered.
    #[serde(default)]
    pub response: Map<String, Value>,
    /// Iterations to run; any negative value means "until success".
    #[serde(rename = "loop", default = "default_step_loop")]
    pub loop_count: i64,
    /// Pause between iterations, in milliseconds.
    #[serde(rename = "interval", default = "default_interval")]
    pub interval_ms: u64,
    /// Retries allowed for an unbounded loop; `-1` is unlimited.
    #[serde(default = "default_max_retry")]
    pub max_retry: i64,
}

/// Flow files may list a step either as a bare method name or as a
/// full mapping.
#[derive(Deserialize)]
#[serde(untagged)]
enum StepEntry {
    Method(String),
    Full(StepDefinition),
}

fn deserialize_steps<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<StepDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<StepEntry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            StepEntry::Method(method) => StepDefinition::new(method),
            StepEntry::Full(step) => step,
        })
        .collect())
}

fn default_case_loop() -> usize {
    1
}

fn default_thread() -> usize {
    1
}

fn default_step_loop() -> i64 {
    1
}

fn default_interval() -> u64 {
    1000
}

fn default_max_retry() -> i64 {
    10
}

fn default_timeout() -> u64 {
    30
}

impl StepDefinition {
    /// A step calling `method` once with default policy.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            id: None,
            request: Variables::new(),
            response: Map::new(),
            loop_count: default_step_loop(),
            interval_ms: default_interval(),
            max_retry: default_max_retry(),
        }
    }

    /// Registry key: the explicit id, or the ordinal position.
    pub fn key(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| index.to_string())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// `true` for retry-until-success steps.
    pub fn is_unbounded(&self) -> bool {
        self.loop_count < 0
    }
}

impl TestCase {
    /// Total executions scheduled for this case. Saturates; flows
    /// loaded through [`TestFlow::from_yaml`] never overflow.
    pub fn executions(&self) -> usize {
        self.loop_count.saturating_mul(self.thread)
    }

    /// Reject cases the worker pool cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.thread == 0 {
            bail!("case '{}': thread must be at least 1", self.name);
        }
        if self.loop_count.checked_mul(self.thread).is_none() {
            bail!(
                "case '{}': loop ({}) * thread ({}) overflows",
                self.name,
                self.loop_count,
                self.thread
            );
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(id) = &step.id {
                if !seen.insert(id.as_str()) {
                    bail!(
                        "case '{}': duplicate step id '{}' at step {}",
                        self.name,
                        id,
                        index
                    );
                }
            }
        }

        // An explicit id equal to another step's ordinal would
        // silently shadow it in the response registry.
        for (index, step) in self.steps.iter().enumerate() {
            if step.id.is_none() && seen.contains(index.to_string().as_str()) {
                bail!(
                    "case '{}': step id '{}' collides with the ordinal of step {}",
                    self.name,
                    index,
                    index
                );
            }
        }

        Ok(())
    }
}

impl TestFlow {
    /// Deserialize and validate a flow from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let flow: TestFlow = serde_yaml::from_str(yaml)?;
        for case in &flow.cases {
            case.validate()?;
        }
        Ok(flow)
    }
}

/// Target endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// JSON-RPC endpoint every envelope is posted to.
    pub url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: default_timeout(),
            headers: HashMap::new(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EndpointConfig = serde_yaml::from_str(yaml)?;
        url::Url::parse(&config.url)
            .map_err(|e| anyhow::anyhow!("invalid endpoint url '{}': {e}", config.url))?;
        Ok(config)
    }
}

/// Outcome of one case execution. Exactly one is produced per
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    /// Method of the last step that ran.
    pub method: Option<String>,
    pub duration: Duration,
    /// 200 on full success, otherwise the last observed code.
    pub status_code: i64,
    pub error: Option<String>,
    /// Steps whose template was found and executed.
    pub steps_invoked: usize,
    /// Transport calls made across all steps.
    pub attempts: usize,
}

impl CaseResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status_code == 200
    }
}
