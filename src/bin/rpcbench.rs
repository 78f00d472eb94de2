//! rpcbench CLI - JSON-RPC load generation tool.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use rpcbench::{run_flow, DefaultCaseRunner, HttpTransport, Report, RunConfig, RunSummary};
use serde::Serialize;
use std::process::exit;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// rpcbench - replay declarative test flows against a JSON-RPC endpoint.
#[derive(Parser, Debug)]
#[command(name = "rpcbench", version, about)]
struct Cli {
    /// Path to the API definition file.
    #[arg(long = "api", default_value = "api.json")]
    api: String,

    /// Path to the test flow file.
    #[arg(long = "flow", default_value = "test_flow.yml")]
    flow: String,

    /// Path to the endpoint configuration file.
    #[arg(long = "config", default_value = "config.yml")]
    config: String,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Report output format.
    #[arg(long = "report-format", default_value = "text")]
    report_format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ReportFormat {
    Json,
    Yaml,
    Text,
}

/// Machine-readable report envelope.
#[derive(Serialize)]
struct ReportDocument<'a> {
    timestamp: String,
    #[serde(flatten)]
    report: &'a Report,
}

fn init_tracing(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }

    if tracing::dispatcher::has_been_set() {
        return;
    }

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}

fn print_report(report: &Report) {
    println!("\n--- Performance Test Report ---");
    println!("Total Duration: {} ms", report.total_duration_ms);
    println!("Total Executions: {}", report.executions);
    println!("Successful Executions: {}", report.successful);
    println!("Failed Executions: {}", report.failed);
    println!("Success Rate: {:.2}%", report.success_rate);
    println!("Average Latency: {:.2} ms", report.average_latency_ms);
    println!("Total Requests: {}", report.total_requests);
    println!("Total RPC Calls: {}", report.rpc_calls);
    println!("Requests Per Second: {:.2}", report.requests_per_second);
    println!(
        "Transactions Per Second (TPS): {:.2}",
        report.transactions_per_second
    );

    if !report.errors.is_empty() {
        println!("\n--- Errors ---");
        for error in &report.errors {
            println!("- {error}");
        }
    }

    println!("-----------------------------");
}

fn emit_report(summary: &RunSummary, format: ReportFormat) -> Result<()> {
    let report = Report::from_results(
        &summary.results,
        summary.total_duration,
        summary.completed_cases,
    );

    let document = ReportDocument {
        timestamp: Utc::now().to_rfc3339(),
        report: &report,
    };
    match format {
        ReportFormat::Text => print_report(&report),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&document)?),
        ReportFormat::Yaml => print!("{}", serde_yaml::to_string(&document)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.verbose);

    let config = match RunConfig::load(&args.api, &args.flow, &args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load inputs: {:#}", e);
            eprintln!("Error: {e:#}");
            exit(1);
        }
    };

    let transport = HttpTransport::new(&config.endpoint).context("Failed to create transport")?;
    let runner = DefaultCaseRunner::new(
        Arc::new(config.catalog),
        Arc::new(transport),
        config.endpoint.url.clone(),
    );

    info!(
        "Running {} test case(s) against {}",
        config.flow.cases.len(),
        config.endpoint.url
    );
    let summary = run_flow(&config.flow, Arc::new(runner)).await;

    emit_report(&summary, args.report_format)?;
    info!("Performance test finished.");

    Ok(())
}
