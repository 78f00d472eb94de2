//! Request templates keyed by JSON-RPC method name.

use crate::error::StepError;
use crate::model::{ApiDefinition, Variables};
use anyhow::Result;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// JSON-RPC protocol version written into every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([^{}]+)\}\}")
        .expect("failed to compile placeholder regex")
});

/// An immutable parameter template for one method.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiTemplate {
    method: String,
    params: String,
}

impl ApiTemplate {
    /// Build a template from raw parameter text. The text only
    /// has to be valid JSON after substitution.
    pub fn new(method: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: params.into(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params_text(&self) -> &str {
        &self.params
    }

    /// Substitute `{{name}}` placeholders and parse the result.
    ///
    /// Strings are inserted verbatim, so a string placeholder has
    /// to be quoted in the template (`"{{to}}"`). Every other value
    /// is inserted as its JSON text. Names missing from `vars` are
    /// left in place untouched; if that leaves the text invalid the
    /// call fails with [`StepError::Render`], otherwise the literal
    /// `{{name}}` is sent to the endpoint as-is.
    pub fn render(&self, vars: &Variables) -> Result<Value, StepError> {
        let text = substitute(&self.params, vars);
        serde_json::from_str(&text).map_err(|source| StepError::Render {
            method: self.method.clone(),
            source,
        })
    }

    /// Render and wrap the parameters in a JSON-RPC envelope.
    pub fn compile(&self, vars: &Variables, id: u64) -> Result<Value, StepError> {
        let params = self.render(vars)?;
        Ok(json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": self.method,
            "params": params,
        }))
    }
}

/// Replace every known placeholder in `text`.
pub fn substitute(text: &str, vars: &Variables) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures| {
            let key = &caps[1];
            match vars.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(v) => v.to_string(),
                None => {
                    debug!("Unresolved placeholder '{}' left in template", key);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Process-wide, read-only set of templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<String, ApiTemplate>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from parsed API definitions. Parameter
    /// text is taken byte-for-byte from the source; missing params
    /// become `null`. A later definition of the same method
    /// replaces an earlier one.
    pub fn from_definitions(definitions: Vec<ApiDefinition>) -> Result<Self> {
        let mut catalog = Self::new();
        for definition in definitions {
            let params = definition
                .request
                .params
                .as_deref()
                .map_or("null", |raw| raw.get())
                .to_string();
            catalog.insert(ApiTemplate::new(definition.request.method, params));
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, template: ApiTemplate) {
        if let Some(previous) =
            self.templates.insert(template.method.clone(), template)
        {
            warn!("API method '{}' defined more than once", previous.method);
        }
    }

    pub fn get(&self, method: &str) -> Option<&ApiTemplate> {
        self.templates.get(method)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
