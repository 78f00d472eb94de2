//! Loading of the API catalog, test flow and endpoint files.

use crate::catalog::TemplateCatalog;
use crate::model::{ApiDefinition, EndpointConfig, TestFlow};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// All inputs of a run, parsed and validated.
#[derive(Debug)]
pub struct RunConfig {
    pub endpoint: EndpointConfig,
    pub catalog: TemplateCatalog,
    pub flow: TestFlow,
}

impl RunConfig {
    /// Load the three input files. Any failure aborts before work
    /// starts.
    pub fn load<P: AsRef<Path>>(api: P, flow: P, endpoint: P) -> Result<Self> {
        let endpoint = load_endpoint_config(endpoint)?;
        let catalog = load_api_catalog(api)?;
        let flow = load_test_flow(flow)?;
        Ok(Self {
            endpoint,
            catalog,
            flow,
        })
    }
}

fn read(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).context(format!(
        "Failed to read {what} file: {}",
        path.display()
    ))
}

/// Load the JSON API definition file into a template catalog.
pub fn load_api_catalog<P: AsRef<Path>>(path: P) -> Result<TemplateCatalog> {
    let path = path.as_ref();
    info!("Loading API definitions from {}", path.display());

    let content = read(path, "API")?;
    let definitions: Vec<ApiDefinition> = serde_json::from_str(&content).context(format!(
        "Failed to parse API definitions from {}",
        path.display()
    ))?;
    let catalog = TemplateCatalog::from_definitions(definitions)?;

    debug!("Loaded {} API template(s)", catalog.len());
    Ok(catalog)
}

/// Load the YAML test flow file.
pub fn load_test_flow<P: AsRef<Path>>(path: P) -> Result<TestFlow> {
    let path = path.as_ref();
    info!("Loading test flow from {}", path.display());

    let content = read(path, "test flow")?;
    let flow = TestFlow::from_yaml(&content)
        .context(format!("Failed to parse test flow from {}", path.display()))?;

    debug!("Loaded {} test case(s)", flow.cases.len());
    Ok(flow)
}

/// Load the YAML endpoint configuration file.
pub fn load_endpoint_config<P: AsRef<Path>>(path: P) -> Result<EndpointConfig> {
    let path = path.as_ref();
    let content = read(path, "config")?;
    EndpointConfig::from_yaml(&content)
        .context(format!("Failed to parse config from {}", path.display()))
}
