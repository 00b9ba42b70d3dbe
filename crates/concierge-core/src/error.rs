use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConciergeError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Data provider errors
    #[error("Provider failed: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Provider input validation failed: {0}")]
    ProviderInput(String),

    // Workflow errors
    #[error("Invalid workflow graph: {0}")]
    InvalidGraph(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConciergeError {
    /// Shorthand for a provider failure.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConciergeError>;
