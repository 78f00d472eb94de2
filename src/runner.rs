//! Test case execution logic

use crate::catalog::TemplateCatalog;
use crate::model::{CaseResult, TestCase};
use crate::resolver::ResponseRegistry;
use crate::step::StepController;
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

/// Case runner trait
#[async_trait]
pub trait CaseRunner: Send + Sync {
    /// Execute every step of `case` once. Never fails: all step
    /// errors end up in the returned result.
    async fn run(&self, case: &TestCase) -> CaseResult;
}

/// Default case runner
pub struct DefaultCaseRunner {
    catalog: Arc<TemplateCatalog>,
    transport: Arc<dyn Transport>,
    url: String,
}

impl DefaultCaseRunner {
    pub fn new(
        catalog: Arc<TemplateCatalog>,
        transport: Arc<dyn Transport>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CaseRunner for DefaultCaseRunner {
    #[instrument(skip(self, case), fields(name = %case.name))]
    async fn run(&self, case: &TestCase) -> CaseResult {
        let start_time = Instant::now();
        let mut registry = ResponseRegistry::new();
        let mut next_id = 1;
        let mut method = None;
        let mut steps_invoked = 0;
        let mut attempts = 0;

        for (index, step) in case.steps.iter().enumerate() {
            let Some(template) = self.catalog.get(&step.method) else {
                warn!("API method not found: {}", step.method);
                continue;
            };

            debug!(
                "Running step {}/{}: {}",
                index + 1,
                case.steps.len(),
                step.method
            );
            steps_invoked += 1;
            method = Some(step.method.clone());

            let report = StepController::new(template, self.transport.as_ref(), &self.url)
                .execute(step, index, &case.variables, &mut registry, &mut next_id)
                .await;
            attempts += report.attempts;

            if let Err(err) = report.outcome {
                error!("Case '{}' stopped at step {}: {}", case.name, index, err);
                return CaseResult {
                    method,
                    duration: start_time.elapsed(),
                    status_code: report.status_code,
                    error: Some(err.to_string()),
                    steps_invoked,
                    attempts,
                };
            }
        }

        CaseResult {
            method,
            duration: start_time.elapsed(),
            status_code: 200,
            error: None,
            steps_invoked,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ApiTemplate;
    use crate::model::StepDefinition;
    use crate::step::tests::ScriptedTransport;
    use serde_json::json;

    fn catalog(methods: &[(&str, &str)]) -> Arc<TemplateCatalog> {
        let mut catalog = TemplateCatalog::new();
        for (method, params) in methods {
            catalog.insert(ApiTemplate::new(*method, *params));
        }
        Arc::new(catalog)
    }

    fn case(steps: Vec<StepDefinition>) -> TestCase {
        TestCase {
            name: "case".into(),
            steps,
            loop_count: 1,
            thread: 1,
            variables: [("from".to_string(), json!("0xabc"))].into_iter().collect(),
        }
    }

    #[tokio::test]
    async fn later_step_reads_earlier_response() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            json!({"result": {"receipt": "0x1"}}),
            json!({"result": true}),
        ]));
        let runner = DefaultCaseRunner::new(
            catalog(&[("send", r#"["{{from}}"]"#), ("check", r#"["{{hash}}"]"#)]),
            transport.clone(),
            "http://test",
        );
        let mut check = StepDefinition::new("check");
        check
            .request
            .insert("hash".into(), json!("A.response.result.receipt"));
        let send = StepDefinition {
            id: Some("A".into()),
            ..StepDefinition::new("send")
        };

        let result = runner.run(&case(vec![send, check])).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.steps_invoked, 2);
        assert_eq!(result.method.as_deref(), Some("check"));
        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent[0]["params"], json!(["0xabc"]));
        assert_eq!(sent[1]["params"], json!(["0x1"]));
        assert_eq!(sent[1]["id"], json!(2));
    }

    #[tokio::test]
    async fn bounded_loop_finishes_before_next_step() {
        let transport = Arc::new(ScriptedTransport::new(vec![json!({"result": 1})]));
        let runner = DefaultCaseRunner::new(
            catalog(&[("poll", "[]"), ("after", "[]")]),
            transport.clone(),
            "http://test",
        );
        let poll = StepDefinition {
            loop_count: 3,
            interval_ms: 1,
            ..StepDefinition::new("poll")
        };

        let result = runner
            .run(&case(vec![poll, StepDefinition::new("after")]))
            .await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(transport.methods(), vec!["poll", "poll", "poll", "after"]);
        assert_eq!(result.steps_invoked, 2);
        assert_eq!(result.attempts, 4);
    }

    #[tokio::test]
    async fn fatal_code_skips_remaining_steps() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            json!({"code": 500}),
            json!({"result": 1}),
        ]));
        let runner = DefaultCaseRunner::new(
            catalog(&[("first", "[]"), ("second", "[]")]),
            transport.clone(),
            "http://test",
        );

        let result = runner
            .run(&case(vec![
                StepDefinition::new("first"),
                StepDefinition::new("second"),
            ]))
            .await;

        assert_eq!(transport.methods(), vec!["first"]);
        assert_eq!(result.steps_invoked, 1);
        assert_eq!(result.status_code, 500);
        assert!(result.error.unwrap().contains("fatal response code 500"));
    }

    #[tokio::test]
    async fn unknown_methods_are_skipped() {
        let transport = Arc::new(ScriptedTransport::new(vec![json!({"result": 1})]));
        let runner = DefaultCaseRunner::new(catalog(&[("known", "[]")]), transport.clone(), "http://test");

        let result = runner
            .run(&case(vec![
                StepDefinition::new("unknown"),
                StepDefinition::new("known"),
                StepDefinition::new("also_unknown"),
            ]))
            .await;

        assert!(result.is_success());
        assert_eq!(result.steps_invoked, 1);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.method.as_deref(), Some("known"));
    }

    #[tokio::test]
    async fn terminal_error_reports_attempts_so_far() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            json!({"result": 1}),
            json!({"error": "reverted"}),
        ]));
        let runner = DefaultCaseRunner::new(catalog(&[("a", "[]"), ("b", "[]"), ("c", "[]")]), transport.clone(), "http://test");

        let result = runner
            .run(&case(vec![
                StepDefinition::new("a"),
                StepDefinition::new("b"),
                StepDefinition::new("c"),
            ]))
            .await;

        assert!(!result.is_success());
        assert_eq!(result.steps_invoked, 2);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.method.as_deref(), Some("b"));
        assert!(result.error.unwrap().contains("reverted"));
    }
}
