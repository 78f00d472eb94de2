//! Load generator for JSON-RPC endpoints.
//!
//! A run replays the cases of a [`TestFlow`]: each case is executed
//! `loop * thread` times by `thread` concurrent workers, its steps
//! rendered from a [`TemplateCatalog`] and sent through a
//! [`Transport`]. Every execution yields one [`CaseResult`], and the
//! finished set is summarised by [`Report`].

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod pool;
pub mod resolver;
pub mod runner;
pub mod step;
pub mod transport;

pub use aggregate::{Aggregator, Report, ResultSet};
pub use catalog::{ApiTemplate, TemplateCatalog};
pub use config::RunConfig;
pub use error::StepError;
pub use model::*;
pub use pool::{run_flow, RunSummary, WorkerPool};
pub use runner::*;
pub use transport::{HttpTransport, Transport, TransportResponse};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
