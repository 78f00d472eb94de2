//! Worker pool and flow driver.
//!
//! Each test case gets its own pool of `thread` workers sharing a
//! work queue pre-sized to hold all `loop * thread` executions, so
//! the driver never blocks while filling it. Cases run one after
//! another; executions of one case run concurrently. Every
//! execution sends exactly one [`CaseResult`] to a single
//! [`Aggregator`] shared by the whole run.

use crate::aggregate::{Aggregator, ResultSet};
use crate::model::{CaseResult, TestCase, TestFlow};
use crate::runner::CaseRunner;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Capacity of the results stream between workers and collector.
const RESULT_CHANNEL_SIZE: usize = 1024;

/// Everything the report consumer needs once a run is over.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub results: Vec<CaseResult>,
    pub total_duration: Duration,
    pub completed_cases: usize,
}

/// Fixed-size pool of workers for one test case at a time.
pub struct WorkerPool {
    runner: Arc<dyn CaseRunner>,
    results: mpsc::Sender<CaseResult>,
}

impl WorkerPool {
    pub fn new(runner: Arc<dyn CaseRunner>, results: mpsc::Sender<CaseResult>) -> Self {
        Self { runner, results }
    }

    /// Run every scheduled execution of `case` and wait for all
    /// workers. Returns the number of executions completed.
    pub async fn run_case(&self, case: &TestCase) -> usize {
        let units = case.executions();
        let (queue_tx, queue_rx) = mpsc::channel::<usize>(units.max(1));
        let queue = Arc::new(Mutex::new(queue_rx));
        let case = Arc::new(case.clone());

        let handles: Vec<_> = (0..case.thread)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let case = Arc::clone(&case);
                let runner = Arc::clone(&self.runner);
                let results = self.results.clone();
                tokio::spawn(async move {
                    let mut completed = 0;
                    loop {
                        let unit = queue.lock().await.recv().await;
                        let Some(unit) = unit else {
                            break;
                        };
                        debug!(worker_id, unit, "Starting case execution");
                        let result = runner.run(&case).await;
                        if results.send(result).await.is_err() {
                            warn!(worker_id, "Results stream closed, stopping worker");
                            break;
                        }
                        completed += 1;
                    }
                    completed
                })
            })
            .collect();

        for unit in 0..units {
            if queue_tx.send(unit).await.is_err() {
                warn!("Work queue closed before it was filled");
                break;
            }
        }
        drop(queue_tx);

        let mut completed = 0;
        for handle in handles {
            match handle.await {
                Ok(count) => completed += count,
                Err(e) => error!("Worker for case '{}' failed: {}", case.name, e),
            }
        }
        completed
    }
}

/// Run every case of `flow` in order and collect all results.
pub async fn run_flow(flow: &TestFlow, runner: Arc<dyn CaseRunner>) -> RunSummary {
    let (tx, rx) = mpsc::channel(RESULT_CHANNEL_SIZE);
    let results = ResultSet::new();
    let collector = Aggregator::new(results.clone()).spawn(rx);

    let start = Instant::now();
    let pool = WorkerPool::new(runner, tx);
    let mut completed_cases = 0;

    for (idx, case) in flow.cases.iter().enumerate() {
        info!(
            "Running test case {}/{}: {} ({} thread(s) x {} loop(s))",
            idx + 1,
            flow.cases.len(),
            case.name,
            case.thread,
            case.loop_count
        );
        let completed = pool.run_case(case).await;
        info!("Test case finished: {} ({} execution(s))", case.name, completed);
        completed_cases += completed;
    }

    // Closing the last sender ends the collector.
    drop(pool);
    if let Err(e) = collector.await {
        error!("Result collector failed: {}", e);
    }
    let total_duration = start.elapsed();

    RunSummary {
        results: results.snapshot().await,
        total_duration,
        completed_cases,
    }
}
