//! `SpeechClient`: ElevenLabs text-to-speech, text-to-dialogue and the voice
//! catalog.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::SpeechConfig;
use crate::services::dialogue::{split_dialogue, DialogueSegment, Speaker};
use crate::services::error::ServiceError;
use crate::services::traits::{SpeechRequest, SpeechSynthesizer, Voice, VoiceCatalog};

const SERVICE: &str = "ElevenLabs";

const SIMILARITY_BOOST: f32 = 0.75;
const MIN_SPEED: f32 = 0.7;
const MAX_SPEED: f32 = 1.2;

pub struct SpeechClient {
    client: reqwest::Client,
    config: SpeechConfig,
}

impl SpeechClient {
    pub fn from_config(config: &SpeechConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_audio(&self, url: &str, key: &str, body: &Value) -> Result<Vec<u8>, ServiceError> {
        let response = self
            .client
            .post(url)
            .header("xi-api-key", key)
            .header("accept", "audio/mpeg")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_response(SERVICE, status.as_u16(), &text));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ServiceError::MalformedResponse("empty audio response".into()));
        }
        Ok(bytes.to_vec())
    }

    async fn fetch_voices(&self, key: &str) -> Result<Vec<Voice>, ServiceError> {
        let response = self
            .client
            .get(self.url("/v1/voices"))
            .header("xi-api-key", key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_response(SERVICE, status.as_u16(), &text));
        }

        let list: VoiceList = response
            .json()
            .await
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;
        Ok(sorted_voices(list))
    }
}

/// Models that accept an explicit `language_code`.
pub fn supports_language_code(model: &str) -> bool {
    model.contains("v2_5") || model == "eleven_v3"
}

pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    }
}

fn single_voice_body(request: &SpeechRequest) -> Value {
    let mut body = json!({
        "text": request.text,
        "model_id": request.model_id,
        "voice_settings": {
            "stability": request.stability,
            "similarity_boost": SIMILARITY_BOOST,
            "speed": clamp_speed(request.speed)
        }
    });

    if let Some(lang) = request.language.as_deref().filter(|l| !l.is_empty()) {
        if supports_language_code(&request.model_id) {
            body["language_code"] = json!(lang);
        }
    }
    body
}

fn dialogue_body(request: &SpeechRequest, segments: &[DialogueSegment], model: &str) -> Value {
    let secondary = request
        .secondary_voice_id
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(&request.voice_id);

    let inputs: Vec<Value> = segments
        .iter()
        .map(|seg| {
            let voice = match seg.speaker {
                Speaker::One => request.voice_id.as_str(),
                Speaker::Two => secondary,
            };
            json!({ "text": seg.text, "voice_id": voice })
        })
        .collect();

    let mut body = json!({
        "inputs": inputs,
        "model_id": model,
        "settings": { "stability": request.stability }
    });

    if let Some(lang) = request.language.as_deref().filter(|l| !l.is_empty()) {
        if supports_language_code(model) {
            body["language_code"] = json!(lang);
        }
    }
    body
}

#[derive(Debug, Deserialize)]
struct VoiceList {
    #[serde(default)]
    voices: Vec<VoiceEntry>,
}

#[derive(Debug, Deserialize)]
struct VoiceEntry {
    voice_id: String,
    #[serde(default)]
    name: String,
}

fn sorted_voices(list: VoiceList) -> Vec<Voice> {
    let mut voices: Vec<Voice> = list
        .voices
        .into_iter()
        .map(|v| Voice {
            id: v.voice_id,
            name: v.name,
        })
        .collect();
    voices.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    voices
}

#[async_trait]
impl SpeechSynthesizer for SpeechClient {
    /// Tagged text goes to `/v1/text-to-dialogue` with the dialogue model;
    /// anything else to `/v1/text-to-speech/{voice}`.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, ServiceError> {
        let key = request.api_key.trim();
        if key.is_empty() {
            return Err(ServiceError::MissingCredential(SERVICE));
        }

        match split_dialogue(&request.text) {
            Some(segments) if !segments.is_empty() => {
                log::debug!("Synthesizing dialogue with {} segments", segments.len());
                let body = dialogue_body(request, &segments, &self.config.dialogue_model);
                self.post_audio(&self.url("/v1/text-to-dialogue"), key, &body)
                    .await
            }
            _ => {
                let url = self.url(&format!("/v1/text-to-speech/{}", request.voice_id));
                self.post_audio(&url, key, &single_voice_body(request)).await
            }
        }
    }
}

#[async_trait]
impl VoiceCatalog for SpeechClient {
    async fn list_voices(&self, api_key: &str) -> Vec<Voice> {
        let key = api_key.trim();
        if key.is_empty() {
            return Vec::new();
        }
        match self.fetch_voices(key).await {
            Ok(voices) => voices,
            Err(e) => {
                log::warn!("Could not list voices: {e}");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
