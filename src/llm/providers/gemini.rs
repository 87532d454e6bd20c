//! Google Gemini provider implementation
//!
//! Uses the `generateContent` REST endpoint. When a request asks for
//! grounding, the `google_search` tool is attached and the web sources from
//! `groundingMetadata` are returned as [`Citation`]s.

use super::{should_retry, status_to_error, RETRY_BACKOFF_MS};
use crate::llm::provider::{
    Citation, CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider,
    MessageRole, ResponseFormat, TokenUsage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Gemini provider configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Gemini provider implementation
pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::NotConfigured(
                "Gemini API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Convert completion request to Gemini format (pure function)
    fn convert_to_gemini_request(request: &CompletionRequest) -> GeminiRequest {
        let system_text: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let system_instruction = (!system_text.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(system_text.join("\n\n")),
            }],
        });

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| GeminiContent {
                role: Some(
                    match m.role {
                        MessageRole::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        // The search tool cannot be combined with a response MIME type
        let response_mime_type = match request.response_format {
            Some(ResponseFormat::Json) if !request.grounding => {
                Some("application/json".to_string())
            }
            _ => None,
        };

        let tools = request.grounding.then(|| {
            vec![GeminiTool {
                google_search: serde_json::json!({}),
            }]
        });

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category: category.to_string(),
                    threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
                })
                .collect(),
            tools,
        }
    }

    /// Parse Gemini response including grounding metadata (pure function)
    fn parse_completion_response(
        gemini_response: GeminiResponse,
        model: &str,
        mut metadata: HashMap<String, String>,
    ) -> Result<CompletionResponse, LlmError> {
        let candidate = gemini_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ApiError("No candidates returned from Gemini".to_string()))?;

        let content = candidate.content.map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        });

        let (citations, grounding_supports) = match candidate.grounding_metadata {
            Some(grounding) => {
                if !grounding.web_search_queries.is_empty() {
                    metadata.insert(
                        "search_queries".to_string(),
                        grounding.web_search_queries.join("; "),
                    );
                }
                let citations = grounding
                    .grounding_chunks
                    .into_iter()
                    .filter_map(|chunk| chunk.web)
                    .map(|web| Citation {
                        title: web.title.unwrap_or_else(|| "Source".to_string()),
                        uri: web.uri.unwrap_or_default(),
                    })
                    .collect();
                let supports = grounding
                    .grounding_supports
                    .into_iter()
                    .filter_map(|s| s.segment.and_then(|seg| seg.text))
                    .filter(|t| !t.is_empty())
                    .collect();
                (citations, supports)
            }
            None => (Vec::new(), Vec::new()),
        };

        let usage = gemini_response
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            model: model.to_string(),
            usage,
            finish_reason: Self::convert_finish_reason_pure(candidate.finish_reason.as_deref()),
            citations,
            grounding_supports,
            metadata,
        })
    }

    /// Convert Gemini finish reason to internal format (pure function)
    fn convert_finish_reason_pure(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("STOP") => FinishReason::Stop,
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => {
                FinishReason::ContentFilter
            }
            _ => FinishReason::Error,
        }
    }

    async fn complete_with_retry(
        &self,
        model: &str,
        gemini_request: GeminiRequest,
        metadata: HashMap<String, String>,
    ) -> Result<CompletionResponse, LlmError> {
        let mut last_error = None;

        for (attempt, &delay_ms) in std::iter::once(&0u64)
            .chain(RETRY_BACKOFF_MS.iter())
            .enumerate()
        {
            if attempt > 0 {
                debug!("Gemini retry attempt {} after {}ms delay", attempt, delay_ms);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.make_api_request(model, &gemini_request).await {
                Ok(gemini_response) => {
                    let response =
                        Self::parse_completion_response(gemini_response, model, metadata)?;
                    if let Some(queries) = response.metadata.get("search_queries") {
                        info!(queries = %queries, "Search queries executed");
                    }
                    debug!(
                        total_tokens = response.usage.total_tokens,
                        citations = response.citations.len(),
                        finish_reason = ?response.finish_reason,
                        "Gemini response"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!("Gemini request attempt {} failed: {}", attempt + 1, e);
                    if !should_retry(&e) {
                        error!("Non-retryable Gemini error, aborting: {}", e);
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        error!("Gemini request failed after all retries");
        Err(last_error
            .unwrap_or_else(|| LlmError::NetworkError("All retry attempts failed".to_string())))
    }

    async fn make_api_request(
        &self,
        model: &str,
        gemini_request: &GeminiRequest,
    ) -> Result<GeminiResponse, LlmError> {
        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.config.base_url, model
            ))
            .query(&[("key", self.config.api_key.as_str())])
            .json(gemini_request)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(format!("HTTP request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_to_error("Gemini", status, &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.without_url().to_string()))
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn available_models(&self) -> Vec<String> {
        vec![
            "gemini-2.0-flash".to_string(),
            "gemini-2.5-flash".to_string(),
            "gemini-2.5-pro".to_string(),
        ]
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let gemini_request = Self::convert_to_gemini_request(&request);
        debug!(
            contents = gemini_request.contents.len(),
            grounding = request.grounding,
            model = %request.model,
            "Gemini request"
        );

        self.complete_with_retry(&request.model, gemini_request, request.metadata)
            .await
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let response = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.without_url().to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LlmError::AuthenticationFailed(
                "Gemini API authentication failed".to_string(),
            ))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

#[derive(Debug, Serialize)]
struct GeminiTool {
    google_search: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
    #[serde(default)]
    grounding_supports: Vec<GroundingSupport>,
    #[serde(default)]
    web_search_queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroundingSupport {
    segment: Option<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::Message;

    #[test]
    fn test_gemini_config_default() {
        let config = GeminiConfig::default();
        assert_eq!(
            config.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_gemini_provider_requires_api_key() {
        let result = GeminiProvider::new(GeminiConfig::default());
        assert!(matches!(result, Err(LlmError::NotConfigured(_))));
    }

    #[test]
    fn test_request_conversion_roles_and_system_instruction() {
        let mut request = CompletionRequest::from_prompt("gemini-2.0-flash", "hello");
        request.messages.insert(0, Message::system("Be kind."));
        request.messages.push(Message {
            role: MessageRole::Assistant,
            content: "hi there".to_string(),
        });

        let json = serde_json::to_value(GeminiProvider::convert_to_gemini_request(&request))
            .unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be kind.");
        assert_eq!(json["contents"].as_array().unwrap().len(), 2);
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_grounded_json_request() {
        let request = CompletionRequest::from_prompt("gemini-2.0-flash", "research")
            .with_json_output()
            .with_grounding(true);

        let json = serde_json::to_value(GeminiProvider::convert_to_gemini_request(&request))
            .unwrap();

        assert!(json["generationConfig"].get("responseMimeType").is_none());
        assert!(json["tools"][0].get("google_search").is_some());
    }

    #[test]
    fn test_parse_grounding_metadata() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"insights\": []}"}]},
                "finishReason": "STOP",
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://www.cdc.gov/sleep", "title": "CDC Sleep"}},
                        {"web": {"uri": "https://example.com/x"}}
                    ],
                    "groundingSupports": [
                        {"segment": {"text": "Adults need 7 or more hours."}}
                    ],
                    "webSearchQueries": ["sleep duration adults"]
                }
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15}
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();

        let parsed =
            GeminiProvider::parse_completion_response(response, "gemini-2.0-flash", HashMap::new())
                .unwrap();

        assert_eq!(parsed.text(), "{\"insights\": []}");
        assert_eq!(parsed.finish_reason, FinishReason::Stop);
        assert_eq!(parsed.citations.len(), 2);
        assert_eq!(parsed.citations[0].title, "CDC Sleep");
        assert_eq!(parsed.citations[1].title, "Source");
        assert_eq!(parsed.grounding_supports, vec!["Adults need 7 or more hours."]);
        assert_eq!(
            parsed.metadata.get("search_queries").map(String::as_str),
            Some("sleep duration adults")
        );
        assert_eq!(parsed.usage.total_tokens, 15);
    }

    #[test]
    fn test_parse_without_candidates_is_error() {
        let response: GeminiResponse = serde_json::from_str("{}").unwrap();
        let result =
            GeminiProvider::parse_completion_response(response, "gemini-2.0-flash", HashMap::new());
        assert!(matches!(result, Err(LlmError::ApiError(_))));
    }

    #[test]
    fn test_finish_reason_conversion() {
        assert_eq!(
            GeminiProvider::convert_finish_reason_pure(Some("MAX_TOKENS")),
            FinishReason::Length
        );
        assert_eq!(
            GeminiProvider::convert_finish_reason_pure(Some("SAFETY")),
            FinishReason::ContentFilter
        );
        assert_eq!(
            GeminiProvider::convert_finish_reason_pure(None),
            FinishReason::Error
        );
    }
}
