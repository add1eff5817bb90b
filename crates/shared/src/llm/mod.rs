pub mod chain;
pub mod gateway;
pub mod observability;
pub mod openai;
pub mod prompts;

pub use chain::{ChainError, ChainInput, ChainOutcome, ChainSettings, SqlChain};
pub use gateway::{
    LlmCompletion, LlmCompletionRequest, LlmGateway, LlmGatewayError, LlmGatewayFuture,
    LlmTokenUsage,
};
pub use observability::{ChainStage, LlmTelemetryEvent, complete_with_telemetry};
pub use openai::{ChatCompletionsClientError, ChatCompletionsConfig, ChatCompletionsGateway};
pub use prompts::{PromptTemplates, format_chat_history};
