//! External generation services.
//!
//! * [`GeminiClient`] implements [`TextAdapter`], [`ImageGenerator`],
//!   [`SubtitleTranscriber`] and [`MetadataWriter`].
//! * [`SpeechClient`] implements [`SpeechSynthesizer`] and [`VoiceCatalog`].
//! * [`HttpCrawler`] implements [`ArticleCrawler`].
//!
//! Generation tasks hold these as `Arc<dyn …>` so tests can substitute
//! in-process doubles.

pub mod crawl;
pub mod data_uri;
pub mod dialogue;
pub mod error;
pub mod gemini;
pub mod prompt;
pub mod speech;
pub mod traits;

pub use crawl::HttpCrawler;
pub use data_uri::{DataUri, DEFAULT_IMAGE_MIME, SPEECH_MIME};
pub use dialogue::{split_dialogue, DialogueSegment, Speaker};
pub use error::ServiceError;
pub use gemini::GeminiClient;
pub use speech::SpeechClient;
pub use traits::{
    Adaptation, ArticleCrawler, CrawledArticle, ImageGenerator, MetadataWriter, SpeechRequest,
    SpeechSynthesizer, SubtitleTranscriber, TextAdapter, Voice, VoiceCatalog,
};
