use crate::error::ProviderError;
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    ImageRequest, ImageResponse, SpeechRequest, SpeechResponse, StreamChunk,
};
use crate::providers::{
    ConfigValidation, CostEstimate, HealthStatus, Provider, ProviderConfig, ProviderHealth,
    StreamResult,
};
use async_stream::stream;
use serde::Serialize;

use super::http_client::{map_error_response, AuthStrategy, HttpProviderClient};
use std::collections::HashMap;
use std::time::Instant;

/// Driver for OpenAI's own `/v1/chat/completions` API, and for any
/// self-hosted or gateway endpoint that speaks the same wire format
/// (most OpenAI-compatible providers, including local inference servers).
pub struct OpenAIProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<crate::models::Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url.clone(),
            "https://api.openai.com/v1",
            &config.headers,
            AuthStrategy::Bearer {
                token: config.api_key.clone(),
            },
        )?;

        Ok(Self { http, config })
    }

    fn map_model(&self, model: &str) -> String {
        self.config
            .model_mapping
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }

    fn build_request(&self, request: &ChatRequest, stream: Option<bool>) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.map_model(&request.model),
            messages: request.messages.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            stop: request.stop.clone(),
            stream,
        }
    }
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
            "gpt-4".to_string(),
            "gpt-3.5-turbo".to_string(),
            "o1".to_string(),
            "o1-mini".to_string(),
        ]
    }

    fn estimate_cost(&self, request: &ChatRequest) -> CostEstimate {
        // $ per 1K tokens, input/output. Representative published OpenAI
        // pricing; not updated live.
        let (input_per_1k, output_per_1k) = match self.map_model(&request.model).as_str() {
            "gpt-4o" => (0.005, 0.015),
            "gpt-4o-mini" => (0.00015, 0.0006),
            "gpt-4-turbo" => (0.01, 0.03),
            "gpt-4" => (0.03, 0.06),
            "gpt-3.5-turbo" => (0.0005, 0.0015),
            _ => return CostEstimate::UnsupportedModel,
        };

        // No tokenizer available pre-request; approximate 4 bytes/token for
        // input and fall back to max_tokens (default 256) for output.
        let estimated_input_tokens: f64 = request
            .messages
            .iter()
            .map(|m| m.content.len())
            .sum::<usize>() as f64
            / 4.0;
        let estimated_output_tokens = request.max_tokens.unwrap_or(256) as f64;

        let cost = (estimated_input_tokens / 1000.0) * input_per_1k
            + (estimated_output_tokens / 1000.0) * output_per_1k;

        CostEstimate::Cost(cost)
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.build_request(&request, Some(false));
        self.http.post_json("/chat/completions", &body).await
    }

    async fn stream_chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        let body = self.build_request(&request, Some(true));

        let response = self
            .http
            .post_json_raw("/chat/completions", &body)
            .await?;
        if !response.status().is_success() {
            return Err(map_error_response(response).await);
        }

        let stream = Box::pin(stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = futures::StreamExt::next(&mut bytes_stream).await {
                match chunk_result {
                    Ok(chunk) => {
                        let chunk_str = String::from_utf8_lossy(&chunk);
                        buffer.push_str(&chunk_str);

                        // OpenAI separates frames with a blank line; tolerate a
                        // trailing CR on each data line from proxies that rewrite
                        // line endings.
                        while let Some(line_end) = buffer.find('\n') {
                            let line = buffer[..line_end].trim_end_matches('\r').trim().to_string();
                            buffer = buffer[line_end + 1..].to_string();

                            if line.is_empty() || line.starts_with(':') {
                                continue;
                            }

                            if let Some(json_str) = line.strip_prefix("data: ") {
                                if json_str == "[DONE]" {
                                    return;
                                }

                                match serde_json::from_str::<StreamChunk>(json_str) {
                                    Ok(stream_chunk) => yield Ok(stream_chunk),
                                    Err(e) => yield Err(ProviderError::Serialization(e)),
                                }
                            }
                        }
                    }
                    Err(e) => yield Err(ProviderError::Http(e)),
                }
            }
        });

        Ok(stream)
    }

    async fn embedding(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        self.http.post_json("/embeddings", &request).await
    }

    async fn image_generation(&self, request: ImageRequest) -> Result<ImageResponse, ProviderError> {
        self.http.post_json("/images/generations", &request).await
    }

    async fn audio_transcription(
        &self,
        _request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "audio transcription requires multipart upload, not yet wired for OpenAI"
                .to_string(),
        })
    }

    async fn text_to_speech(&self, request: SpeechRequest) -> Result<SpeechResponse, ProviderError> {
        self.http.post_json("/audio/speech", &request).await
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let start = Instant::now();
        let response = self
            .http
            .get_json::<serde_json::Value>("/models")
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(_) => Ok(ProviderHealth {
                status: HealthStatus::Healthy,
                latency_ms: Some(latency_ms),
                error_rate: 0.0,
                last_check: chrono::Utc::now(),
                details: HashMap::new(),
            }),
            Err(e) => {
                let mut details = HashMap::new();
                details.insert("error".to_string(), e.to_string());

                Ok(ProviderHealth {
                    status: HealthStatus::Degraded,
                    latency_ms: Some(latency_ms),
                    error_rate: 1.0,
                    last_check: chrono::Utc::now(),
                    details,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use std::time::Duration;

    fn test_config() -> ProviderConfig {
        ProviderConfig::new("openai", "sk-test-key").with_base_url("http://127.0.0.1:0")
    }

    #[test]
    fn maps_unmapped_model_through_unchanged() {
        let provider = OpenAIProvider::new(test_config()).unwrap();
        assert_eq!(provider.map_model("gpt-4o-mini"), "gpt-4o-mini");
    }

    #[test]
    fn maps_model_via_configured_mapping() {
        let mut config = test_config();
        config
            .model_mapping
            .insert("fast".to_string(), "gpt-4o-mini".to_string());
        let provider = OpenAIProvider::new(config).unwrap();
        assert_eq!(provider.map_model("fast"), "gpt-4o-mini");
    }

    #[test]
    fn build_request_carries_streaming_flag() {
        let provider = OpenAIProvider::new(test_config()).unwrap();
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::user("hi")],
            temperature: None,
            max_tokens: None,
            top_p: None,
            stream: Some(true),
            stop: None,
            user: None,
            frequency_penalty: None,
            presence_penalty: None,
            tools: None,
            tool_choice: None,
            provider: None,
            tenant_id: None,
            model_family: None,
            capabilities: None,
            max_cost_per_token: None,
            request_id: None,
        };
        let body = provider.build_request(&request, Some(true));
        assert_eq!(body.stream, Some(true));
        let _ = Duration::from_secs(0);
    }

    #[test]
    fn estimate_cost_known_model_scales_with_tokens() {
        let provider = OpenAIProvider::new(test_config()).unwrap();
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::user("hi")],
            temperature: None,
            max_tokens: Some(100),
            top_p: None,
            stream: None,
            stop: None,
            user: None,
            frequency_penalty: None,
            presence_penalty: None,
            tools: None,
            tool_choice: None,
            provider: None,
            tenant_id: None,
            model_family: None,
            capabilities: None,
            max_cost_per_token: None,
            request_id: None,
        };
        match provider.estimate_cost(&request) {
            CostEstimate::Cost(cost) => assert!(cost > 0.0),
            CostEstimate::UnsupportedModel => panic!("expected a cost estimate"),
        }
    }

    #[test]
    fn estimate_cost_unknown_model_is_unsupported() {
        let provider = OpenAIProvider::new(test_config()).unwrap();
        let request = ChatRequest {
            model: "some-future-model".to_string(),
            messages: vec![Message::user("hi")],
            temperature: None,
            max_tokens: None,
            top_p: None,
            stream: None,
            stop: None,
            user: None,
            frequency_penalty: None,
            presence_penalty: None,
            tools: None,
            tool_choice: None,
            provider: None,
            tenant_id: None,
            model_family: None,
            capabilities: None,
            max_cost_per_token: None,
            request_id: None,
        };
        assert_eq!(provider.estimate_cost(&request), CostEstimate::UnsupportedModel);
    }

    #[test]
    fn validate_config_flags_missing_api_key() {
        let mut config = test_config();
        config.api_key = "".to_string();
        let provider = OpenAIProvider::new(test_config()).unwrap();
        assert_eq!(provider.validate_config(&config), ConfigValidation::MissingApiKey);
    }

    #[test]
    fn validate_config_flags_invalid_base_url() {
        let mut config = test_config();
        config.base_url = Some("not a url".to_string());
        let provider = OpenAIProvider::new(test_config()).unwrap();
        assert_eq!(provider.validate_config(&config), ConfigValidation::InvalidBaseUrl);
    }
}
