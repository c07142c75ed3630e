/// Shared error type used across every PromptArena crate.
///
/// Mirrors the closed taxonomy: config, timeout, cancellation, provider
/// (with rate-limit/auth/bad-response sub-cases folded into `message`),
/// tool (with its own sub-cases), validation, state store, unsupported,
/// unavailable, internal.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("config: {0}")]
    Config(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("provider {provider}: rate limited: {message}")]
    ProviderRateLimited { provider: String, message: String },

    #[error("provider {provider}: auth failed: {message}")]
    ProviderAuth { provider: String, message: String },

    #[error("provider {provider}: bad response: {message}")]
    ProviderBadResponse { provider: String, message: String },

    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("tool {tool}: timeout: {message}")]
    ToolTimeout { tool: String, message: String },

    #[error("tool {tool}: transport: {message}")]
    ToolTransport { tool: String, message: String },

    #[error("tool {tool}: schema: {message}")]
    ToolSchema { tool: String, message: String },

    #[error("tool round cap exceeded after {rounds} rounds")]
    ToolRoundCap { rounds: u32 },

    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error("state store: {0}")]
    StateStore(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that a retry loop should treat as transient.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::ProviderRateLimited { .. }
                | Error::ToolTimeout { .. }
                | Error::ToolTransport { .. }
                | Error::Unavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
