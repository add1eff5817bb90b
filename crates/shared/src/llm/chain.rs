use thiserror::Error;
use tracing::info;

use super::observability::{
    ChainStage, LlmTelemetryEvent, complete_with_telemetry, log_llm_telemetry,
};
use super::prompts::{PromptTemplates, format_chat_history};
use super::{LlmCompletionRequest, LlmGateway, LlmGatewayError};
use crate::config::LlmConfig;
use crate::models::Turn;
use crate::sqldb::{DatabaseAdapter, DbError};

#[derive(Debug, Clone, Copy)]
pub struct ChainSettings {
    pub sql_temperature: f32,
    pub answer_temperature: f32,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            sql_temperature: 0.0,
            answer_temperature: 0.7,
        }
    }
}

impl From<&LlmConfig> for ChainSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            sql_temperature: config.sql_temperature,
            answer_temperature: config.answer_temperature,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChainInput<'a> {
    /// Conversation as it stood before `question` was asked.
    pub history: &'a [Turn],
    pub question: &'a str,
    /// Correlates log lines for one HTTP request.
    pub request_id: Option<&'a str>,
    /// Opaque end-user identifier forwarded to the provider.
    pub requester_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub sql: String,
    pub result: String,
    pub answer: String,
    pub telemetry: Vec<LlmTelemetryEvent>,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("failed to read database schema: {0}")]
    Schema(#[source] DbError),
    #[error("failed to render {} prompt: {source}", .stage.as_str())]
    Prompt {
        stage: ChainStage,
        #[source]
        source: minijinja::Error,
    },
    #[error("{} completion failed: {source}", .stage.as_str())]
    Llm {
        stage: ChainStage,
        #[source]
        source: LlmGatewayError,
    },
    #[error("failed to execute generated sql: {source}")]
    ExecuteSql {
        sql: String,
        #[source]
        source: DbError,
    },
}

impl ChainError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Schema(_) => "describe_schema",
            Self::Prompt { stage, .. } | Self::Llm { stage, .. } => stage.as_str(),
            Self::ExecuteSql { .. } => "execute_sql",
        }
    }
}

/// Question to SQL, SQL to executed result, result to answer. One attempt per stage.
pub struct SqlChain<'a> {
    gateway: &'a dyn LlmGateway,
    prompts: &'a PromptTemplates,
    settings: ChainSettings,
}

impl<'a> SqlChain<'a> {
    pub fn new(
        gateway: &'a dyn LlmGateway,
        prompts: &'a PromptTemplates,
        settings: ChainSettings,
    ) -> Self {
        Self {
            gateway,
            prompts,
            settings,
        }
    }

    pub async fn run(
        &self,
        db: &mut dyn DatabaseAdapter,
        input: ChainInput<'_>,
    ) -> Result<ChainOutcome, ChainError> {
        let schema = db.describe_schema().await.map_err(ChainError::Schema)?;
        let chat_history = format_chat_history(input.history);
        let mut telemetry = Vec::with_capacity(2);

        let sql_prompt = self
            .prompts
            .render_sql_query(&schema, &chat_history, input.question)
            .map_err(|source| ChainError::Prompt {
                stage: ChainStage::GenerateSql,
                source,
            })?;
        let sql = self
            .complete(
                ChainStage::GenerateSql,
                sql_prompt,
                self.settings.sql_temperature,
                &input,
                &mut telemetry,
            )
            .await?;
        info!(
            request_id = input.request_id.unwrap_or("-"),
            generated_sql = %sql,
            "generated sql query"
        );

        let result = db
            .execute(&sql)
            .await
            .map_err(|source| ChainError::ExecuteSql {
                sql: sql.clone(),
                source,
            })?;

        let answer_prompt = self
            .prompts
            .render_sql_answer(&schema, &chat_history, input.question, &sql, &result)
            .map_err(|source| ChainError::Prompt {
                stage: ChainStage::GenerateAnswer,
                source,
            })?;
        let answer = self
            .complete(
                ChainStage::GenerateAnswer,
                answer_prompt,
                self.settings.answer_temperature,
                &input,
                &mut telemetry,
            )
            .await?;

        Ok(ChainOutcome {
            sql,
            result,
            answer,
            telemetry,
        })
    }

    async fn complete(
        &self,
        stage: ChainStage,
        prompt: String,
        temperature: f32,
        input: &ChainInput<'_>,
        telemetry: &mut Vec<LlmTelemetryEvent>,
    ) -> Result<String, ChainError> {
        let mut request = LlmCompletionRequest::new(prompt, temperature);
        if let Some(requester_id) = input.requester_id {
            request = request.with_requester_id(requester_id);
        }

        let (result, event) = complete_with_telemetry(self.gateway, stage, request).await;
        log_llm_telemetry(input.request_id, &event);
        telemetry.push(event);

        result
            .map(|completion| completion.text)
            .map_err(|source| ChainError::Llm { stage, source })
    }
}
