use async_trait::async_trait;
use serde_json::Value;

pub mod azure_oracle;
pub mod gateway;
pub mod prompts;
pub mod types;
pub use gateway::OracleGateway;
pub use types::*;

/// Trait for oracle backends (Azure OpenAI, Gemini, test doubles, …).
///
/// A transport performs exactly one request/response round trip and returns
/// the structured JSON object produced by the service. It does not validate
/// the shape (that is [`OracleGateway`]'s job) and it never retries.
#[async_trait]
pub trait OracleTransport: Send + Sync {
    async fn send(&self, request: &OracleRequest) -> Result<Value, AiError>;

    /// Provider name for logging/display
    fn name(&self) -> &str;
}
