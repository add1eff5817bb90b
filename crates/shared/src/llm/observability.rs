use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{LlmCompletion, LlmCompletionRequest, LlmGateway, LlmGatewayError};

/// Which LLM call of the chain produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStage {
    GenerateSql,
    GenerateAnswer,
}

impl ChainStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GenerateSql => "generate_sql",
            Self::GenerateAnswer => "generate_answer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmTelemetryEvent {
    pub stage: &'static str,
    pub outcome: &'static str,
    pub latency_ms: u64,
    pub model: Option<String>,
    pub provider_request_id: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub error_type: Option<&'static str>,
}

pub async fn complete_with_telemetry(
    llm_gateway: &dyn LlmGateway,
    stage: ChainStage,
    request: LlmCompletionRequest,
) -> (Result<LlmCompletion, LlmGatewayError>, LlmTelemetryEvent) {
    let started_at = Instant::now();
    let result = llm_gateway.complete(request).await;
    let telemetry = telemetry_for_result(stage, started_at.elapsed(), &result);
    (result, telemetry)
}

fn telemetry_for_result(
    stage: ChainStage,
    latency: Duration,
    result: &Result<LlmCompletion, LlmGatewayError>,
) -> LlmTelemetryEvent {
    let latency_ms = duration_to_millis(latency);
    match result {
        Ok(completion) => {
            let usage = completion.usage.as_ref();
            LlmTelemetryEvent {
                stage: stage.as_str(),
                outcome: "success",
                latency_ms,
                model: Some(completion.model.clone()),
                provider_request_id: completion.provider_request_id.clone(),
                prompt_tokens: usage.map(|usage| usage.prompt_tokens),
                completion_tokens: usage.map(|usage| usage.completion_tokens),
                total_tokens: usage.map(|usage| usage.total_tokens),
                error_type: None,
            }
        }
        Err(err) => LlmTelemetryEvent {
            stage: stage.as_str(),
            outcome: "failure",
            latency_ms,
            model: None,
            provider_request_id: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            error_type: Some(error_type(err)),
        },
    }
}

pub fn log_llm_telemetry(request_id: Option<&str>, telemetry: &LlmTelemetryEvent) {
    let request_id = request_id.unwrap_or("-");
    if telemetry.outcome == "success" {
        info!(
            request_id,
            stage = telemetry.stage,
            outcome = telemetry.outcome,
            latency_ms = telemetry.latency_ms,
            model = telemetry.model.as_deref().unwrap_or("unknown"),
            provider_request_id = telemetry.provider_request_id.as_deref().unwrap_or("-"),
            prompt_tokens = telemetry.prompt_tokens.unwrap_or(0),
            completion_tokens = telemetry.completion_tokens.unwrap_or(0),
            total_tokens = telemetry.total_tokens.unwrap_or(0),
            metric_name = "llm_completion",
            "llm completion metrics"
        );
    } else {
        warn!(
            request_id,
            stage = telemetry.stage,
            outcome = telemetry.outcome,
            latency_ms = telemetry.latency_ms,
            error_type = telemetry.error_type.unwrap_or("unknown"),
            metric_name = "llm_completion",
            "llm completion failed"
        );
    }
}

pub fn error_type(err: &LlmGatewayError) -> &'static str {
    match err {
        LlmGatewayError::Timeout => "timeout",
        LlmGatewayError::ProviderFailure(_) => "provider_failure",
        LlmGatewayError::InvalidProviderPayload(_) => "invalid_provider_payload",
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
