use thiserror::Error;

/// Failures a single step can end with. None of them escape the
/// worker; they are surfaced through [`crate::CaseResult::error`].
#[derive(Debug, Error)]
pub enum StepError {
    /// Placeholder substitution produced text that is not JSON.
    #[error("render error for '{method}': {source}")]
    Render {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),

    /// The body was not a JSON object.
    #[error("invalid response (HTTP {status}): {reason}")]
    InvalidResponse { status: u16, reason: String },

    /// The response carried an `error` field and no retries remain.
    #[error("step '{step}' failed after {attempts} attempt(s): {message}")]
    Application {
        step: String,
        attempts: usize,
        message: String,
    },

    /// The response carried a non-200 `code` field.
    #[error("step '{step}' returned fatal response code {code}")]
    FatalCode { step: String, code: i64 },
}

impl StepError {
    /// Status code reported alongside this error.
    pub fn status_code(&self) -> i64 {
        match self {
            StepError::FatalCode { code, .. } => *code,
            StepError::InvalidResponse { status, .. } => i64::from(*status),
            _ => 0,
        }
    }
}
