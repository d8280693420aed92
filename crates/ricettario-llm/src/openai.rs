//! OpenAI Provider Implementation
//!
//! Chat completions in JSON mode for concurrent extraction, and the files +
//! batches endpoints for discounted bulk jobs.
//!
//! The provider does not retry. Retry policy belongs to the caller, which
//! uses [`LlmError::is_transient`] to decide.
//!
//! # Examples
//!
//! ```no_run
//! use ricettario_llm::OpenAiProvider;
//!
//! let provider = OpenAiProvider::from_env("gpt-4o-mini").unwrap();
//! ```

use crate::{
    BatchRequest, BatchResultLine, BatchService, BatchState, BatchStatus, CompletionService,
    LlmError, Prompt,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default OpenAI API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default timeout for a single HTTP request (60 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const CHAT_ENDPOINT: &str = "/v1/chat/completions";
const COMPLETION_WINDOW: &str = "24h";

/// OpenAI API provider
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ManifestLine<'a> {
    custom_id: &'a str,
    method: &'static str,
    url: &'static str,
    body: ChatRequest<'a>,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Serialize)]
struct CreateBatch<'a> {
    input_file_id: &'a str,
    endpoint: &'static str,
    completion_window: &'static str,
}

#[derive(Deserialize, Default)]
struct RequestCounts {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    completed: usize,
    #[serde(default)]
    failed: usize,
}

#[derive(Deserialize)]
struct BatchObject {
    id: String,
    status: String,
    #[serde(default)]
    request_counts: Option<RequestCounts>,
    #[serde(default)]
    output_file_id: Option<String>,
    #[serde(default)]
    error_file_id: Option<String>,
}

#[derive(Deserialize)]
struct OutputLine {
    custom_id: String,
    #[serde(default)]
    response: Option<OutputResponse>,
    #[serde(default)]
    error: Option<OutputError>,
}

#[derive(Deserialize)]
struct OutputResponse {
    status_code: u16,
    body: serde_json::Value,
}

#[derive(Deserialize)]
struct OutputError {
    #[serde(default)]
    message: String,
}

impl OpenAiProvider {
    /// Create a provider with an explicit API key
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Auth("API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.1,
        })
    }

    /// Create a provider from the `OPENAI_API_KEY` environment variable
    pub fn from_env(model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| LlmError::Auth(format!("{} not set", API_KEY_ENV)))?;
        Self::new(api_key, model)
    }

    /// Set a custom base URL (proxies, compatible servers)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn chat_request<'a>(&'a self, prompt: &'a Prompt) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        }
    }

    /// Serialize a manifest as JSONL, one chat request per line
    fn build_manifest(&self, requests: &[BatchRequest]) -> Result<String, LlmError> {
        let mut out = String::new();
        for request in requests {
            let line = ManifestLine {
                custom_id: &request.custom_id,
                method: "POST",
                url: CHAT_ENDPOINT,
                body: self.chat_request(&request.prompt),
            };
            let json = serde_json::to_string(&line)
                .map_err(|e| LlmError::Other(format!("Failed to encode manifest line: {}", e)))?;
            out.push_str(&json);
            out.push('\n');
        }
        Ok(out)
    }

    async fn get_batch(&self, job_id: &str) -> Result<BatchObject, LlmError> {
        let response = self
            .client
            .get(format!("{}/batches/{}", self.base_url, job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_status(response, &self.model).await?;
        response
            .json::<BatchObject>()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse batch: {}", e)))
    }

    async fn download_file(&self, file_id: &str) -> Result<String, LlmError> {
        let response = self
            .client
            .get(format!("{}/files/{}/content", self.base_url, file_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_status(response, &self.model).await?;
        response
            .text()
            .await
            .map_err(|e| LlmError::Communication(format!("Failed to read file {}: {}", file_id, e)))
    }
}

#[async_trait]
impl CompletionService for OpenAiProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.chat_request(prompt))
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_status(response, &self.model).await?;

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl BatchService for OpenAiProvider {
    async fn submit(&self, requests: &[BatchRequest]) -> Result<String, LlmError> {
        let manifest = self.build_manifest(requests)?;
        debug!("Uploading batch manifest with {} requests", requests.len());

        let part = reqwest::multipart::Part::bytes(manifest.into_bytes())
            .file_name("manifest.jsonl")
            .mime_str("application/jsonl")
            .map_err(|e| LlmError::Other(format!("Invalid manifest part: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "batch")
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;
        let file: FileObject = check_status(response, &self.model)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse file upload: {}", e)))?;

        let response = self
            .client
            .post(format!("{}/batches", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&CreateBatch {
                input_file_id: &file.id,
                endpoint: CHAT_ENDPOINT,
                completion_window: COMPLETION_WINDOW,
            })
            .send()
            .await
            .map_err(map_transport_error)?;
        let batch: BatchObject = check_status(response, &self.model)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse batch: {}", e)))?;

        debug!("Created batch {} from file {}", batch.id, file.id);
        Ok(batch.id)
    }

    async fn status(&self, job_id: &str) -> Result<BatchStatus, LlmError> {
        let batch = self.get_batch(job_id).await?;
        let counts = batch.request_counts.unwrap_or_default();
        Ok(BatchStatus {
            state: BatchState::parse(&batch.status),
            completed: counts.completed,
            failed: counts.failed,
            total: counts.total,
            has_output: batch.output_file_id.is_some() || batch.error_file_id.is_some(),
        })
    }

    async fn results(&self, job_id: &str) -> Result<Vec<BatchResultLine>, LlmError> {
        let batch = self.get_batch(job_id).await?;
        let mut lines = Vec::new();

        if let Some(file_id) = batch.output_file_id.as_deref() {
            lines.extend(parse_output_lines(&self.download_file(file_id).await?));
        }
        if let Some(file_id) = batch.error_file_id.as_deref() {
            lines.extend(parse_output_lines(&self.download_file(file_id).await?));
        }
        Ok(lines)
    }
}

fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Communication(format!("Request failed: {}", e))
    }
}

async fn check_status(response: reqwest::Response, model: &str) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    warn!(status = %status, error = %error_text, "OpenAI API error");
    Err(map_http_status(status, model, error_text))
}

fn map_http_status(status: StatusCode, model: &str, message: String) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth(message),
        StatusCode::NOT_FOUND => LlmError::ModelNotAvailable(model.to_string()),
        StatusCode::REQUEST_TIMEOUT => LlmError::Timeout,
        s if s.is_server_error() => LlmError::Server {
            status: s.as_u16(),
            message,
        },
        s => LlmError::Other(format!("HTTP {}: {}", s, message)),
    }
}

/// Parse a batch output or error file
///
/// Lines that are not valid JSON are skipped; their captions surface later as
/// missing results.
fn parse_output_lines(jsonl: &str) -> Vec<BatchResultLine> {
    jsonl
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str::<OutputLine>(l) {
            Ok(line) => Some(line),
            Err(e) => {
                warn!("Skipping unreadable batch output line: {}", e);
                None
            }
        })
        .map(|line| BatchResultLine {
            outcome: line_outcome(&line),
            custom_id: line.custom_id,
        })
        .collect()
}

fn line_outcome(line: &OutputLine) -> Result<String, String> {
    if let Some(error) = &line.error {
        return Err(error.message.clone());
    }
    let response = line
        .response
        .as_ref()
        .ok_or_else(|| "line has neither response nor error".to_string())?;
    if response.status_code >= 400 {
        let message = response.body["error"]["message"]
            .as_str()
            .unwrap_or("request failed");
        return Err(format!("HTTP {}: {}", response.status_code, message));
    }
    response.body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| "response body has no message content".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = OpenAiProvider::new("sk-test", "gpt-4o-mini")
            .unwrap()
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.model_name(), "gpt-4o-mini");
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            OpenAiProvider::new("  ", "gpt-4o-mini"),
            Err(LlmError::Auth(_))
        ));
    }

    #[test]
    fn test_manifest_lines() {
        let provider = OpenAiProvider::new("sk-test", "gpt-4o-mini").unwrap();
        let manifest = provider
            .build_manifest(&[
                BatchRequest {
                    custom_id: "req-0".into(),
                    prompt: Prompt::new("sys", "one"),
                },
                BatchRequest {
                    custom_id: "req-1".into(),
                    prompt: Prompt::new("sys", "two"),
                },
            ])
            .unwrap();

        let lines: Vec<serde_json::Value> = manifest
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["custom_id"], "req-1");
        assert_eq!(lines[0]["url"], "/v1/chat/completions");
        assert_eq!(lines[0]["body"]["response_format"]["type"], "json_object");
        assert_eq!(lines[0]["body"]["messages"][1]["content"], "one");
    }

    #[test]
    fn test_parse_output_lines() {
        let jsonl = concat!(
            r#"{"custom_id":"req-0","response":{"status_code":200,"body":{"choices":[{"message":{"content":"{\"is_recipe\":true}"}}]}},"error":null}"#,
            "\n",
            r#"{"custom_id":"req-1","response":{"status_code":400,"body":{"error":{"message":"bad request"}}},"error":null}"#,
            "\n",
            "not json\n",
            r#"{"custom_id":"req-2","response":null,"error":{"message":"expired"}}"#,
            "\n"
        );

        let lines = parse_output_lines(jsonl);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].outcome, Ok(r#"{"is_recipe":true}"#.to_string()));
        assert_eq!(lines[1].outcome, Err("HTTP 400: bad request".to_string()));
        assert_eq!(lines[2].custom_id, "req-2");
        assert_eq!(lines[2].outcome, Err("expired".to_string()));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            map_http_status(StatusCode::TOO_MANY_REQUESTS, "m", String::new()),
            LlmError::RateLimitExceeded
        );
        assert!(map_http_status(StatusCode::BAD_GATEWAY, "m", "x".into()).is_transient());
        assert!(!map_http_status(StatusCode::BAD_REQUEST, "m", "x".into()).is_transient());
        assert!(matches!(
            map_http_status(StatusCode::UNAUTHORIZED, "m", "x".into()),
            LlmError::Auth(_)
        ));
    }

    #[tokio::test]
    async fn test_connection_error_is_transient() {
        let provider = OpenAiProvider::new("sk-test", "gpt-4o-mini")
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let result = provider.complete(&Prompt::new("s", "u")).await;
        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test]
    #[ignore] // Only run with a real OPENAI_API_KEY
    async fn test_openai_complete_integration() {
        let provider = OpenAiProvider::from_env("gpt-4o-mini").unwrap();
        let result = provider
            .complete(&Prompt::new("Reply with a JSON object.", r#"Return {"ok": true}"#))
            .await;
        assert!(result.is_ok());
    }
}
