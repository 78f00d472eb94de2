//! Result collection and summary statistics.

use crate::model::CaseResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Results of every case execution, in completion order.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    inner: Arc<Mutex<Vec<CaseResult>>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, result: CaseResult) {
        self.inner.lock().await.push(result);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Copy of the results gathered so far.
    pub async fn snapshot(&self) -> Vec<CaseResult> {
        self.inner.lock().await.clone()
    }
}

/// Single collector draining the results stream into a
/// [`ResultSet`] until every sender is dropped.
pub struct Aggregator {
    results: ResultSet,
}

impl Aggregator {
    pub fn new(results: ResultSet) -> Self {
        Self { results }
    }

    /// Consume the stream; resolves with the number of results
    /// collected once the channel closes.
    pub async fn run(self, mut rx: mpsc::Receiver<CaseResult>) -> usize {
        let mut collected = 0;
        while let Some(result) = rx.recv().await {
            self.results.push(result).await;
            collected += 1;
        }
        debug!("Results stream closed after {} result(s)", collected);
        collected
    }

    pub fn spawn(self, rx: mpsc::Receiver<CaseResult>) -> JoinHandle<usize> {
        tokio::spawn(self.run(rx))
    }
}

/// Summary derived from a finished result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub total_duration_ms: u64,
    /// Case executions that produced a result.
    pub executions: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage of successful executions.
    pub success_rate: f64,
    /// Mean duration of successful executions.
    pub average_latency_ms: f64,
    /// Steps actually invoked across all executions.
    pub total_requests: usize,
    /// Transport calls, retries and loop iterations included.
    pub rpc_calls: usize,
    pub requests_per_second: f64,
    /// Completed case executions per second.
    pub transactions_per_second: f64,
    pub errors: Vec<String>,
}

impl Report {
    pub fn from_results(
        results: &[CaseResult],
        total_duration: Duration,
        completed_cases: usize,
    ) -> Self {
        let executions = results.len();
        let mut successful = 0;
        let mut success_time = Duration::ZERO;
        let mut total_requests = 0;
        let mut rpc_calls = 0;
        let mut errors = Vec::new();

        for result in results {
            total_requests += result.steps_invoked;
            rpc_calls += result.attempts;
            if result.is_success() {
                successful += 1;
                success_time += result.duration;
            }
            if let Some(error) = &result.error {
                errors.push(error.clone());
            }
        }

        let success_rate = if executions > 0 {
            successful as f64 / executions as f64 * 100.0
        } else {
            0.0
        };
        let average_latency_ms = if successful > 0 {
            success_time.as_secs_f64() * 1000.0 / successful as f64
        } else {
            0.0
        };
        let seconds = total_duration.as_secs_f64();
        let per_second = |count: usize| {
            if seconds > 0.0 {
                count as f64 / seconds
            } else {
                0.0
            }
        };

        Self {
            total_duration_ms: total_duration.as_millis() as u64,
            executions,
            successful,
            failed: executions - successful,
            success_rate,
            average_latency_ms,
            total_requests,
            rpc_calls,
            requests_per_second: per_second(total_requests),
            transactions_per_second: per_second(completed_cases),
            errors,
        }
    }
}
