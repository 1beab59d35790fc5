//! Service seams.
//!
//! Each external capability is an async trait so generation tasks can be run
//! against the real HTTP clients or against test doubles.  Implementors must
//! be `Send + Sync` (they are shared as `Arc<dyn …>`).

use async_trait::async_trait;
use serde::Deserialize;

use super::data_uri::DataUri;
use super::error::ServiceError;

/// A generated text variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Adaptation {
    pub title: String,
    pub content: String,
}

/// Rewrites an article according to a free-form instruction.
#[async_trait]
pub trait TextAdapter: Send + Sync {
    async fn adapt(
        &self,
        title: &str,
        body: &str,
        prompt: &str,
        model: &str,
    ) -> Result<Adaptation, ServiceError>;
}

/// Produces an image variant from a source image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, source: &DataUri, prompt: &str)
        -> Result<DataUri, ServiceError>;
}

/// Everything needed for one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    /// Text to read.  `[Speaker1]` / `[Speaker2]` tags select dialogue mode.
    pub text: String,
    pub api_key: String,
    pub voice_id: String,
    /// Voice for `[Speaker2]`; the primary voice is used when unset.
    pub secondary_voice_id: Option<String>,
    pub model_id: String,
    pub language: Option<String>,
    pub stability: f32,
    pub speed: f32,
}

/// Turns text into audio bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, ServiceError>;
}

/// One entry of the voice catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub id: String,
    pub name: String,
}

/// Lists the voices available to a credential.
#[async_trait]
pub trait VoiceCatalog: Send + Sync {
    /// Sorted by name.  Never fails: a missing credential or a failed
    /// request yields an empty list.
    async fn list_voices(&self, api_key: &str) -> Vec<Voice>;
}

/// Turns narrated audio into subtitle (SRT) text.
#[async_trait]
pub trait SubtitleTranscriber: Send + Sync {
    async fn transcribe(&self, audio: &DataUri, prompt: &str) -> Result<String, ServiceError>;
}

/// Writes free-form descriptive metadata for a text variant.
#[async_trait]
pub trait MetadataWriter: Send + Sync {
    async fn write_metadata(
        &self,
        title: &str,
        body: &str,
        prompt: &str,
    ) -> Result<String, ServiceError>;
}

/// Title and body text pulled from a web page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledArticle {
    pub title: String,
    pub content: String,
}

/// Fetches an article from a URL.
#[async_trait]
pub trait ArticleCrawler: Send + Sync {
    async fn crawl(&self, url: &str) -> Result<CrawledArticle, ServiceError>;
}
