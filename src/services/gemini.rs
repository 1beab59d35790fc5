//! `GeminiClient`: text adaptation, image variants, subtitle transcription
//! and metadata, all over the `generateContent` REST endpoint.
//!
//! Connection details come from [`GeminiConfig`].  Every call checks the
//! credential first and fails with [`ServiceError::MissingCredential`]
//! without touching the network when it is empty.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::GeminiConfig;
use crate::services::data_uri::DataUri;
use crate::services::error::ServiceError;
use crate::services::prompt::{adaptation_prompt, metadata_prompt};
use crate::services::traits::{
    Adaptation, ImageGenerator, MetadataWriter, SubtitleTranscriber, TextAdapter,
};

const SERVICE: &str = "Gemini";

/// MIME type assumed for inline images in a response that omits it.
const RESPONSE_IMAGE_MIME: &str = "image/png";

pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Build a client from application config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`; a default client is used if the builder fails.
    pub fn from_config(config: &GeminiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn api_key(&self) -> Result<&str, ServiceError> {
        match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ServiceError::MissingCredential(SERVICE)),
        }
    }

    async fn generate(&self, model: &str, body: Value) -> Result<Value, ServiceError> {
        let key = self.api_key()?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        log::debug!("Gemini request to model '{model}'");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::from_response(SERVICE, status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| ServiceError::MalformedResponse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

fn adaptation_body(prompt: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "title":   { "type": "STRING" },
                    "content": { "type": "STRING" }
                },
                "required": ["title", "content"]
            }
        }
    })
}

fn inline_body(prompt: &str, media: &DataUri) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "text": prompt },
                { "inlineData": { "mimeType": media.mime_type, "data": media.data } }
            ]
        }]
    })
}

fn text_body(prompt: &str) -> Value {
    json!({ "contents": [{ "parts": [{ "text": prompt }] }] })
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn first_parts(response: &Value) -> Result<&Vec<Value>, ServiceError> {
    response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| ServiceError::MalformedResponse("no content generated".into()))
}

/// Concatenated text of the first candidate.
pub fn response_text(response: &Value) -> Result<String, ServiceError> {
    let text: String = first_parts(response)?
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();

    if text.trim().is_empty() {
        return Err(ServiceError::MalformedResponse("empty response".into()));
    }
    Ok(text)
}

/// First inline media part of the first candidate.
pub fn response_inline_data(response: &Value) -> Result<DataUri, ServiceError> {
    first_parts(response)?
        .iter()
        .find_map(|part| {
            let inline = &part["inlineData"];
            let data = inline["data"].as_str().filter(|d| !d.is_empty())?;
            let mime = inline["mimeType"].as_str().unwrap_or(RESPONSE_IMAGE_MIME);
            Some(DataUri::new(mime, data))
        })
        .ok_or_else(|| ServiceError::MalformedResponse("no image data found in response".into()))
}

/// Parse the `{title, content}` object the adaptation schema asks for.
/// Tolerates a surrounding Markdown code fence.
pub fn parse_adaptation(text: &str) -> Result<Adaptation, ServiceError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim())
        .map_err(|e| ServiceError::MalformedResponse(format!("invalid JSON from Gemini: {e}")))
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

#[async_trait]
impl TextAdapter for GeminiClient {
    async fn adapt(
        &self,
        title: &str,
        body: &str,
        prompt: &str,
        model: &str,
    ) -> Result<Adaptation, ServiceError> {
        let request = adaptation_body(&adaptation_prompt(prompt, title, body));
        let response = self.generate(model, request).await?;
        parse_adaptation(&response_text(&response)?)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate_image(
        &self,
        source: &DataUri,
        prompt: &str,
    ) -> Result<DataUri, ServiceError> {
        let response = self
            .generate(&self.config.image_model, inline_body(prompt, source))
            .await?;
        response_inline_data(&response)
    }
}

#[async_trait]
impl SubtitleTranscriber for GeminiClient {
    async fn transcribe(&self, audio: &DataUri, prompt: &str) -> Result<String, ServiceError> {
        let response = self
            .generate(&self.config.audio_model, inline_body(prompt, audio))
            .await?;
        Ok(response_text(&response)?.trim().to_string())
    }
}

#[async_trait]
impl MetadataWriter for GeminiClient {
    async fn write_metadata(
        &self,
        title: &str,
        body: &str,
        prompt: &str,
    ) -> Result<String, ServiceError> {
        let request = text_body(&metadata_prompt(prompt, title, body));
        let response = self.generate(&self.config.text_model, request).await?;
        Ok(response_text(&response)?.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(api_key: Option<&str>) -> GeminiConfig {
        GeminiConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: api_key.map(|s| s.to_string()),
            timeout_secs: 1,
            ..GeminiConfig::default()
        }
    }

    #[test]
    fn parses_plain_adaptation() {
        let a = parse_adaptation(r#"{"title": "下雨", "content": "今天下雨。"}"#).unwrap();
        assert_eq!(a.title, "下雨");
        assert_eq!(a.content, "今天下雨。");
    }

    #[test]
    fn parses_fenced_adaptation() {
        let a = parse_adaptation("```json\n{\"title\": \"T\", \"content\": \"C\"}\n```").unwrap();
        assert_eq!(a.title, "T");
    }

    #[test]
    fn adaptation_missing_field_is_malformed() {
        assert!(matches!(
            parse_adaptation(r#"{"title": "only"}"#),
            Err(ServiceError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_adaptation("not json"),
            Err(ServiceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn extracts_text_parts() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "1\n00:00" }, { "text": ",000" }] } }]
        });
        assert_eq!(response_text(&response).unwrap(), "1\n00:00,000");
    }

    #[test]
    fn extracts_inline_image() {
        let response = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "Here you go" },
                { "inlineData": { "data": "iVBOR" } }
            ] } }]
        });
        let uri = response_inline_data(&response).unwrap();
        assert_eq!(uri.mime_type, "image/png");
        assert_eq!(uri.data, "iVBOR");
    }

    #[test]
    fn missing_inline_image_is_malformed() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "I cannot do that" }] } }]
        });
        assert!(matches!(
            response_inline_data(&response),
            Err(ServiceError::MalformedResponse(_))
        ));
        assert!(response_text(&json!({})).is_err());
    }

    #[test]
    fn adaptation_body_requests_json_schema() {
        let body = adaptation_body("p");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            body["generationConfig"]["responseSchema"]["required"],
            json!(["title", "content"])
        );
    }

    #[tokio::test]
    async fn missing_key_fails_before_request() {
        let client = GeminiClient::from_config(&make_config(Some("  ")));
        let err = client.adapt("t", "b", "p", "m").await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingCredential("Gemini")));

        let client = GeminiClient::from_config(&make_config(None));
        let err = client
            .generate_image(&DataUri::new("image/png", "AA"), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingCredential(_)));
    }

    /// Accept one request, answer with `body` and return the request line.
    async fn serve_once(listener: tokio::net::TcpListener, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }

        let reply = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(reply.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&request)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn metadata_is_written_with_text_model() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            r#"{"candidates": [{"content": {"parts": [{"text": " meta "}]}}]}"#,
        ));

        let config = GeminiConfig {
            base_url: format!("http://{addr}"),
            api_key: Some("k".into()),
            text_model: "text-m".into(),
            audio_model: "audio-m".into(),
            timeout_secs: 5,
            ..GeminiConfig::default()
        };
        let client = GeminiClient::from_config(&config);
        assert_eq!(client.write_metadata("t", "b", "p").await.unwrap(), "meta");

        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("POST /v1beta/models/text-m:generateContent"));
    }

    #[test]
    fn client_is_object_safe() {
        let client: Box<dyn TextAdapter> = Box::new(GeminiClient::from_config(&make_config(None)));
        drop(client);
    }
}
