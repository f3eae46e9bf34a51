use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen2.5:0.5b";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Failed to reach the model at {url}: {message}. Make sure Ollama is running.")]
    Request { url: String, message: String },

    #[error("Model API error {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Failed to parse model response from {url}: {message}")]
    Decode { url: String, message: String },
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Client for a local Ollama instance's non-streaming generate endpoint.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    http: Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, AssistantError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssistantError::Request {
                url: base_url.clone(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            base_url,
            model: model.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one prompt through the model and return its text.
    pub async fn generate(&self, prompt: &str) -> Result<String, AssistantError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        log::debug!("Asking {} ({} chars of prompt)", self.model, prompt.len());
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Request {
                url: self.base_url.clone(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            log::error!("Model API error {}: {}", status, text);
            return Err(AssistantError::Status {
                url: self.base_url.clone(),
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: GenerateResponse = resp.json().await.map_err(|e| AssistantError::Decode {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;

        parsed.response.ok_or_else(|| AssistantError::Decode {
            url: self.base_url.clone(),
            message: "no `response` field".into(),
        })
    }

    pub async fn suggest_for_task(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<String, AssistantError> {
        self.generate(&build_task_prompt(title, description)).await
    }

    /// Cheap reachability check against the model list endpoint.
    pub async fn ping(&self) -> Result<(), AssistantError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AssistantError::Request {
                url: self.base_url.clone(),
                message: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(AssistantError::Status {
                url: self.base_url.clone(),
                status: resp.status().as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }
}

pub fn build_task_prompt(title: &str, description: Option<&str>) -> String {
    let detail = match description {
        Some(d) if !d.is_empty() => format!(" - {}", d),
        _ => String::new(),
    };
    format!(
        "You are a helpful task assistant. The user has a task: \"{}\"{}. \n\n\
         Please provide helpful suggestions for this task. For example:\n\
         - Break it down into smaller sub-steps if it's complex\n\
         - Suggest how to approach it\n\
         - Provide relevant tips or resources\n\n\
         Be concise and actionable.",
        title, detail
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OllamaClient {
        OllamaClient::new(&server.uri(), DEFAULT_MODEL, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn prompt_with_and_without_description() {
        let plain = build_task_prompt("Plan trip", None);
        assert!(plain.starts_with("You are a helpful task assistant. The user has a task: \"Plan trip\". \n\n"));
        assert!(plain.ends_with("Be concise and actionable."));
        assert!(plain.contains("\n- Suggest how to approach it\n"));

        let detailed = build_task_prompt("Plan trip", Some("to Lisbon"));
        assert!(detailed.contains("\"Plan trip\" - to Lisbon. "));
        assert_eq!(build_task_prompt("Plan trip", Some("")), plain);
    }

    #[tokio::test]
    async fn generate_posts_non_streaming_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_json(serde_json::json!({
                "model": DEFAULT_MODEL,
                "prompt": "hello",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": DEFAULT_MODEL,
                "response": "Start with a list.",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(client(&server).generate("hello").await.unwrap(), "Start with a list.");
    }

    #[tokio::test]
    async fn error_status_mentions_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let err = client(&server).generate("hello").await.unwrap_err();
        assert!(matches!(err, AssistantError::Status { status: 404, .. }));
        assert!(err.to_string().contains(&server.uri()));
    }

    #[tokio::test]
    async fn missing_response_field_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "done": true })))
            .mount(&server)
            .await;

        let err = client(&server).generate("hello").await.unwrap_err();
        assert!(matches!(err, AssistantError::Decode { .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_request_error() {
        let client = OllamaClient::new("http://127.0.0.1:9", DEFAULT_MODEL, Duration::from_secs(2)).unwrap();
        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(err, AssistantError::Request { .. }));
        assert!(err.to_string().contains("127.0.0.1:9"));
    }

    #[tokio::test]
    async fn ping_hits_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "models": [] })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).ping().await.unwrap();
    }
}
