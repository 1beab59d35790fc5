//! Generation tasks: each one reads its inputs from the store, calls one
//! external service and writes the result back.
//!
//! # Task flow
//!
//! ```text
//! lock ─▶ validate inputs, begin_task(target) → ticket ─▶ unlock
//!   └─▶ service call (.await, store unlocked)
//!         └─▶ lock ─▶ finish_*(ticket)
//!               ├─ ticket current, entity alive → apply result, clear flag
//!               └─ otherwise                    → discard (debug log)
//! ```
//!
//! A failed call clears the flag under the same ticket rule and returns the
//! error.  Batches run their tasks concurrently and report per entity.

use std::sync::Arc;

use futures::future::join_all;

use crate::config::AppConfig;
use crate::services::{
    ArticleCrawler, DataUri, GeminiClient, HttpCrawler, ImageGenerator, MetadataWriter,
    ServiceError, SpeechClient, SpeechRequest, SpeechSynthesizer, SubtitleTranscriber,
    TextAdapter, Voice, VoiceCatalog, SPEECH_MIME,
};
use crate::store::{lock_store, GenerationKind, SharedStore, TaskTarget, Ticket, Translation};

use super::error::TaskError;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one task's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The result was written to the session.
    Applied,
    /// The result arrived for a superseded ticket or a deleted entity.
    Discarded,
    /// A batch did not run the task.
    Skipped,
}

/// Per-entity results of a batch, in session order.
pub type BatchReport = Vec<(String, Result<TaskOutcome, TaskError>)>;

/// Whether a voice batch regenerates variants that already have audio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchPolicy {
    #[default]
    SkipExisting,
    Overwrite,
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// The external services a [`Generator`] calls.
#[derive(Clone)]
pub struct Services {
    pub text: Arc<dyn TextAdapter>,
    pub images: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub voices: Arc<dyn VoiceCatalog>,
    pub subtitles: Arc<dyn SubtitleTranscriber>,
    pub metadata: Arc<dyn MetadataWriter>,
    pub crawler: Arc<dyn ArticleCrawler>,
}

impl Services {
    /// HTTP-backed services built from application config.
    pub fn from_config(config: &AppConfig) -> Self {
        let gemini = Arc::new(GeminiClient::from_config(&config.gemini));
        let speech = Arc::new(SpeechClient::from_config(&config.speech));
        Self {
            text: gemini.clone(),
            images: gemini.clone(),
            speech: speech.clone(),
            voices: speech,
            subtitles: gemini.clone(),
            metadata: gemini,
            crawler: Arc::new(HttpCrawler::new(config.gemini.timeout_secs)),
        }
    }
}

/// Model names that are passed per call rather than baked into a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Models {
    pub text: String,
    pub speech: String,
}

impl From<&AppConfig> for Models {
    fn from(config: &AppConfig) -> Self {
        Self {
            text: config.gemini.text_model.clone(),
            speech: config.speech.model.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct Generator {
    store: SharedStore,
    services: Services,
    models: Models,
}

impl Generator {
    pub fn new(store: SharedStore, services: Services, models: Models) -> Self {
        Self {
            store,
            services,
            models,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Clear the translation flag for `ticket` and apply `result`.
    fn settle_translation<T>(
        &self,
        ticket: &Ticket,
        result: Result<T, ServiceError>,
        apply: impl FnOnce(&mut Translation, T),
    ) -> Result<TaskOutcome, TaskError> {
        let mut store = lock_store(&self.store);
        match result {
            Ok(value) => Ok(applied(store.finish_translation(ticket, |t| apply(t, value)))),
            Err(e) => {
                log::warn!("{} failed: {e}", ticket.target());
                store.finish_translation(ticket, |_| {});
                Err(e.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Text
    // -----------------------------------------------------------------------

    /// Adapt the article with the prompt of `config_id`.
    pub async fn adapt_text(&self, config_id: &str) -> Result<TaskOutcome, TaskError> {
        let (title, content, prompt, ticket) = {
            let mut store = lock_store(&self.store);
            let state = store.state();
            if state.article.content.trim().is_empty() {
                return Err(TaskError::Precondition("article content is empty"));
            }
            let prompt = state
                .text_config(config_id)
                .ok_or_else(|| TaskError::unknown_config(config_id))?
                .prompt
                .clone();
            let title = state.article.title.clone();
            let content = state.article.content.clone();
            let ticket = store
                .begin_task(TaskTarget::translation(config_id, GenerationKind::Text))
                .ok_or_else(|| TaskError::unknown_config(config_id))?;
            (title, content, prompt, ticket)
        };

        log::info!("Adapting article for '{config_id}'");
        let result = self
            .services
            .text
            .adapt(&title, &content, &prompt, &self.models.text)
            .await;

        self.settle_translation(&ticket, result, |t, adaptation| {
            t.title = adaptation.title;
            t.content = adaptation.content;
        })
    }

    /// Adapt the article for every prompt config.
    pub async fn adapt_all(&self) -> Result<BatchReport, TaskError> {
        let ids = {
            let store = lock_store(&self.store);
            let state = store.state();
            if state.article.content.trim().is_empty() {
                return Err(TaskError::Precondition("article content is empty"));
            }
            config_ids(&state.text_configs)
        };

        let results = join_all(ids.iter().map(|id| self.adapt_text(id))).await;
        Ok(ids.into_iter().zip(results).collect())
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    pub async fn generate_image(&self, id: &str) -> Result<TaskOutcome, TaskError> {
        let (source, prompt, ticket) = {
            let mut store = lock_store(&self.store);
            let state = store.state();
            let source = DataUri::parse_image(
                &state
                    .image(id)
                    .ok_or_else(|| TaskError::unknown_image(id))?
                    .original,
            );
            let prompt = state.image_config.prompt.clone();
            let ticket = store
                .begin_task(TaskTarget::image(id))
                .ok_or_else(|| TaskError::unknown_image(id))?;
            (source, prompt, ticket)
        };

        log::info!("Generating variant of image '{id}'");
        let result = self.services.images.generate_image(&source, &prompt).await;

        let mut store = lock_store(&self.store);
        match result {
            Ok(uri) => Ok(applied(
                store.finish_image(&ticket, |img| img.generated = Some(uri.to_string())),
            )),
            Err(e) => {
                log::warn!("{} failed: {e}", ticket.target());
                store.finish_image(&ticket, |_| {});
                Err(e.into())
            }
        }
    }

    pub async fn generate_all_images(&self) -> BatchReport {
        let ids: Vec<String> = {
            let store = lock_store(&self.store);
            store.state().images.iter().map(|i| i.id.clone()).collect()
        };

        let results = join_all(ids.iter().map(|id| self.generate_image(id))).await;
        ids.into_iter().zip(results).collect()
    }

    // -----------------------------------------------------------------------
    // Voice
    // -----------------------------------------------------------------------

    /// Narrate the variant of `config_id` with the session's voice settings.
    pub async fn synthesize_voice(&self, config_id: &str) -> Result<TaskOutcome, TaskError> {
        let (request, ticket) = {
            let mut store = lock_store(&self.store);
            let state = store.state();
            let translation = state
                .translation(config_id)
                .ok_or_else(|| TaskError::unknown_config(config_id))?;
            if translation.content.trim().is_empty() {
                return Err(TaskError::Precondition("variant has no content to read"));
            }

            let voice = &state.voice_settings;
            let text = if voice.read_title && !translation.title.trim().is_empty() {
                format!("{}. {}", translation.title, translation.content)
            } else {
                translation.content.clone()
            };
            let request = SpeechRequest {
                text,
                api_key: state.speech_api_key.clone(),
                voice_id: voice.voice_id.clone(),
                secondary_voice_id: voice.secondary_voice_id.clone(),
                model_id: self.models.speech.clone(),
                language: Some(voice.language.clone()),
                stability: voice.stability,
                speed: translation.speed.unwrap_or(voice.playback_speed),
            };
            let ticket = store
                .begin_task(TaskTarget::translation(config_id, GenerationKind::Voice))
                .ok_or_else(|| TaskError::unknown_config(config_id))?;
            (request, ticket)
        };

        log::info!("Synthesizing voice for '{config_id}'");
        let result = self.services.speech.synthesize(&request).await;

        self.settle_translation(&ticket, result, |t, audio| {
            t.voice_file = Some(DataUri::from_bytes(SPEECH_MIME, &audio).to_string());
        })
    }

    /// Narrate every variant with content.  Variants without content are
    /// skipped, as are variants with audio under [`BatchPolicy::SkipExisting`].
    pub async fn synthesize_all(&self, policy: BatchPolicy) -> BatchReport {
        let plan: Vec<(String, bool)> = {
            let store = lock_store(&self.store);
            store
                .state()
                .translations
                .iter()
                .map(|t| {
                    let skip = t.content.trim().is_empty()
                        || (policy == BatchPolicy::SkipExisting && t.voice_file.is_some());
                    (t.config_id.clone(), skip)
                })
                .collect()
        };

        let results = join_all(plan.iter().map(|(id, skip)| async move {
            if *skip {
                Ok(TaskOutcome::Skipped)
            } else {
                self.synthesize_voice(id).await
            }
        }))
        .await;

        plan.into_iter().map(|(id, _)| id).zip(results).collect()
    }

    /// Voices available to the session's speech credential.
    pub async fn list_voices(&self) -> Vec<Voice> {
        let key = lock_store(&self.store).state().speech_api_key.clone();
        self.services.voices.list_voices(&key).await
    }

    // -----------------------------------------------------------------------
    // Subtitles / metadata
    // -----------------------------------------------------------------------

    /// Transcribe the variant's audio into SRT.
    pub async fn generate_subtitles(&self, config_id: &str) -> Result<TaskOutcome, TaskError> {
        let (audio, prompt, ticket) = {
            let mut store = lock_store(&self.store);
            let state = store.state();
            let translation = state
                .translation(config_id)
                .ok_or_else(|| TaskError::unknown_config(config_id))?;
            let audio = translation
                .voice_file
                .as_deref()
                .and_then(DataUri::parse)
                .ok_or(TaskError::Precondition("variant has no audio"))?;
            let prompt = state.srt_config.prompt.clone();
            let ticket = store
                .begin_task(TaskTarget::translation(config_id, GenerationKind::Subtitles))
                .ok_or_else(|| TaskError::unknown_config(config_id))?;
            (audio, prompt, ticket)
        };

        log::info!("Generating subtitles for '{config_id}'");
        let result = self.services.subtitles.transcribe(&audio, &prompt).await;

        self.settle_translation(&ticket, result, |t, srt| t.subtitles = Some(srt))
    }

    pub async fn generate_metadata(&self, config_id: &str) -> Result<TaskOutcome, TaskError> {
        let (title, content, prompt, ticket) = {
            let mut store = lock_store(&self.store);
            let state = store.state();
            let translation = state
                .translation(config_id)
                .ok_or_else(|| TaskError::unknown_config(config_id))?;
            if translation.content.trim().is_empty() {
                return Err(TaskError::Precondition("variant has no content"));
            }
            let title = translation.title.clone();
            let content = translation.content.clone();
            let prompt = state.metadata_config.prompt.clone();
            let ticket = store
                .begin_task(TaskTarget::translation(config_id, GenerationKind::Metadata))
                .ok_or_else(|| TaskError::unknown_config(config_id))?;
            (title, content, prompt, ticket)
        };

        log::info!("Writing metadata for '{config_id}'");
        let result = self
            .services
            .metadata
            .write_metadata(&title, &content, &prompt)
            .await;

        self.settle_translation(&ticket, result, |t, text| t.metadata = Some(text))
    }

    /// Metadata for every variant with content; the rest are skipped.
    pub async fn generate_all_metadata(&self) -> BatchReport {
        let plan: Vec<(String, bool)> = {
            let store = lock_store(&self.store);
            store
                .state()
                .translations
                .iter()
                .map(|t| (t.config_id.clone(), t.content.trim().is_empty()))
                .collect()
        };

        let results = join_all(plan.iter().map(|(id, skip)| async move {
            if *skip {
                Ok(TaskOutcome::Skipped)
            } else {
                self.generate_metadata(id).await
            }
        }))
        .await;

        plan.into_iter().map(|(id, _)| id).zip(results).collect()
    }

    // -----------------------------------------------------------------------
    // Article
    // -----------------------------------------------------------------------

    /// Fetch `url` and replace the article title and content with what the
    /// page holds.  The URL is recorded first so it survives a failed fetch.
    pub async fn crawl_article(&self, url: &str) -> Result<(), TaskError> {
        lock_store(&self.store).set_article_url(url);

        log::info!("Crawling {url}");
        let crawled = self.services.crawler.crawl(url).await?;

        let mut store = lock_store(&self.store);
        store.set_article_title(crawled.title);
        store.set_article_content(crawled.content);
        Ok(())
    }
}

fn applied(accepted: bool) -> TaskOutcome {
    if accepted {
        TaskOutcome::Applied
    } else {
        TaskOutcome::Discarded
    }
}

fn config_ids(configs: &[crate::store::PromptConfig]) -> Vec<String> {
    configs.iter().map(|c| c.id.clone()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::services::{Adaptation, CrawledArticle};
    use crate::store::{
        new_shared_store, AppImage, FileStorage, MemoryStorage, Store, StoreOptions,
    };

    /// In-process stand-in for every service.
    #[derive(Default)]
    struct FakeServices {
        fail_for: Mutex<Vec<String>>,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
        last_speech: Mutex<Option<SpeechRequest>>,
    }

    impl FakeServices {
        fn failing(ids: &[&str]) -> Self {
            Self {
                fail_for: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
                ..Self::default()
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        async fn call(&self, key: &str) -> Result<(), ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let fail = self.fail_for.lock().unwrap().iter().any(|f| key.contains(f));
            if fail {
                Err(ServiceError::Api {
                    service: "Fake",
                    status: 500,
                    message: format!("boom for {key}"),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl TextAdapter for FakeServices {
        async fn adapt(
            &self,
            title: &str,
            _body: &str,
            prompt: &str,
            _model: &str,
        ) -> Result<Adaptation, ServiceError> {
            self.call(prompt).await?;
            Ok(Adaptation {
                title: format!("{title} ({prompt})"),
                content: format!("adapted by {prompt}"),
            })
        }
    }

    #[async_trait]
    impl ImageGenerator for FakeServices {
        async fn generate_image(
            &self,
            source: &DataUri,
            _prompt: &str,
        ) -> Result<DataUri, ServiceError> {
            self.call(&source.data).await?;
            Ok(DataUri::new("image/png", format!("gen-{}", source.data)))
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeServices {
        async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, ServiceError> {
            *self.last_speech.lock().unwrap() = Some(request.clone());
            self.call(&request.text).await?;
            Ok(b"mp3".to_vec())
        }
    }

    #[async_trait]
    impl VoiceCatalog for FakeServices {
        async fn list_voices(&self, api_key: &str) -> Vec<Voice> {
            if api_key.is_empty() {
                return Vec::new();
            }
            vec![Voice {
                id: "v1".into(),
                name: "Rachel".into(),
            }]
        }
    }

    #[async_trait]
    impl SubtitleTranscriber for FakeServices {
        async fn transcribe(&self, audio: &DataUri, _prompt: &str) -> Result<String, ServiceError> {
            self.call(&audio.data).await?;
            Ok(format!("1\n00:00:00,000 --> 00:00:01,000\n{}", audio.mime_type))
        }
    }

    #[async_trait]
    impl MetadataWriter for FakeServices {
        async fn write_metadata(
            &self,
            title: &str,
            _body: &str,
            _prompt: &str,
        ) -> Result<String, ServiceError> {
            self.call(title).await?;
            Ok(format!("meta for {title}"))
        }
    }

    #[async_trait]
    impl ArticleCrawler for FakeServices {
        async fn crawl(&self, url: &str) -> Result<CrawledArticle, ServiceError> {
            self.call(url).await?;
            Ok(CrawledArticle {
                title: "Crawled".into(),
                content: format!("from {url}"),
            })
        }
    }

    fn services(fake: Arc<FakeServices>) -> Services {
        Services {
            text: fake.clone(),
            images: fake.clone(),
            speech: fake.clone(),
            voices: fake.clone(),
            subtitles: fake.clone(),
            metadata: fake.clone(),
            crawler: fake,
        }
    }

    fn models() -> Models {
        Models {
            text: "text-model".into(),
            speech: "speech-model".into(),
        }
    }

    fn generator_with(fake: Arc<FakeServices>) -> Generator {
        let store = Store::open(Box::new(MemoryStorage::new()), StoreOptions::default());
        Generator::new(new_shared_store(store), services(fake), models())
    }

    fn with_article(generator: &Generator) {
        let mut store = lock_store(generator.store());
        store.set_article_title("Rain");
        store.set_article_content("It rained all day.");
    }

    fn translation(generator: &Generator, id: &str) -> Translation {
        lock_store(generator.store())
            .state()
            .translation(id)
            .cloned()
            .expect("translation")
    }

    fn seed_variant(generator: &Generator, id: &str, audio: Option<&str>) {
        lock_store(generator.store()).update_translation(Translation {
            title: format!("T-{id}"),
            content: format!("C-{id}"),
            voice_file: audio.map(str::to_string),
            ..Translation::empty(id)
        });
    }

    #[tokio::test]
    async fn adapt_text_applies_result_and_clears_flag() {
        let generator = generator_with(Arc::new(FakeServices::default()));
        with_article(&generator);

        let outcome = generator.adapt_text("zh_lv1").await.unwrap();
        assert_eq!(outcome, TaskOutcome::Applied);

        let t = translation(&generator, "zh_lv1");
        assert!(t.title.starts_with("Rain ("));
        assert!(t.content.starts_with("adapted by"));
        assert!(!t.in_progress.any());
    }

    #[tokio::test]
    async fn adapt_text_requires_article_content() {
        let fake = Arc::new(FakeServices::default());
        let generator = generator_with(fake.clone());

        let err = generator.adapt_text("zh_lv1").await.unwrap_err();
        assert!(matches!(err, TaskError::Precondition(_)));
        assert!(generator.adapt_all().await.is_err());
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_config_is_rejected() {
        let generator = generator_with(Arc::new(FakeServices::default()));
        with_article(&generator);
        let err = generator.adapt_text("missing").await.unwrap_err();
        assert!(matches!(err, TaskError::UnknownEntity { .. }));
        assert!(matches!(
            generator.generate_image("missing").await,
            Err(TaskError::UnknownEntity { kind: "image", .. })
        ));
    }

    #[tokio::test]
    async fn failure_clears_flag_and_keeps_content() {
        let generator = generator_with(Arc::new(FakeServices::failing(&["C-zh_lv1"])));
        seed_variant(&generator, "zh_lv1", None);

        let err = generator.synthesize_voice("zh_lv1").await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        let t = translation(&generator, "zh_lv1");
        assert!(t.voice_file.is_none());
        assert!(!t.is_generating(GenerationKind::Voice));
        assert_eq!(t.content, "C-zh_lv1");
    }

    #[tokio::test]
    async fn batch_failure_is_isolated() {
        let prompt_of_lv2 = {
            let generator = generator_with(Arc::new(FakeServices::default()));
            let store = lock_store(generator.store());
            store.state().text_config("zh_lv2").unwrap().prompt.clone()
        };
        let generator = generator_with(Arc::new(FakeServices::failing(&[&prompt_of_lv2])));
        with_article(&generator);

        let report = generator.adapt_all().await.unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].0, "zh_lv1");
        assert!(matches!(report[0].1, Ok(TaskOutcome::Applied)));
        assert!(report[1].1.is_err());

        assert!(translation(&generator, "zh_lv1").content.starts_with("adapted"));
        let failed = translation(&generator, "zh_lv2");
        assert!(failed.content.is_empty());
        assert!(!failed.in_progress.any());
    }

    #[tokio::test]
    async fn late_result_for_deleted_config_is_discarded() {
        let gate = Arc::new(Notify::new());
        let generator = generator_with(Arc::new(FakeServices::gated(gate.clone())));
        with_article(&generator);

        let (outcome, _) = tokio::join!(generator.adapt_text("zh_lv2"), async {
            lock_store(generator.store()).delete_text_config("zh_lv2");
            gate.notify_one();
        });

        assert_eq!(outcome.unwrap(), TaskOutcome::Discarded);
        let store = lock_store(generator.store());
        assert!(store.state().translation("zh_lv2").is_none());
        assert_eq!(store.state().translations.len(), 1);
    }

    #[tokio::test]
    async fn late_result_after_translation_reset_is_discarded() {
        let gate = Arc::new(Notify::new());
        let generator = generator_with(Arc::new(FakeServices::gated(gate.clone())));
        with_article(&generator);

        let (outcome, _) = tokio::join!(generator.adapt_text("zh_lv1"), async {
            lock_store(generator.store()).reset_translations();
            gate.notify_one();
        });

        assert_eq!(outcome.unwrap(), TaskOutcome::Discarded);
        let t = translation(&generator, "zh_lv1");
        assert!(t.content.is_empty());
        assert!(!t.in_progress.any());
    }

    #[tokio::test]
    async fn late_result_after_project_import_is_discarded() {
        let gate = Arc::new(Notify::new());
        let generator = generator_with(Arc::new(FakeServices::gated(gate.clone())));
        with_article(&generator);

        let (outcome, _) = tokio::join!(generator.adapt_text("zh_lv1"), async {
            lock_store(generator.store())
                .load_project(
                    r#"{"translations": [{"configId": "zh_lv1", "title": "imported", "content": "kept"}]}"#,
                )
                .unwrap();
            gate.notify_one();
        });

        assert_eq!(outcome.unwrap(), TaskOutcome::Discarded);
        let t = translation(&generator, "zh_lv1");
        assert_eq!((t.title.as_str(), t.content.as_str()), ("imported", "kept"));
        assert!(!t.in_progress.any());
    }

    #[tokio::test]
    async fn narration_survives_reopening_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let open = |fake: Arc<FakeServices>| {
            let store = Store::open(
                Box::new(FileStorage::new(dir.path())),
                StoreOptions::default(),
            );
            Generator::new(new_shared_store(store), services(fake), models())
        };

        {
            let generator = open(Arc::new(FakeServices::default()));
            seed_variant(&generator, "zh_lv1", None);
            assert_eq!(
                generator.synthesize_voice("zh_lv1").await.unwrap(),
                TaskOutcome::Applied
            );
        }

        let fake = Arc::new(FakeServices::default());
        let generator = open(fake.clone());
        assert_eq!(
            translation(&generator, "zh_lv1").voice_file.as_deref(),
            Some("data:audio/mpeg;base64,bXAz")
        );

        generator.generate_subtitles("zh_lv1").await.unwrap();
        assert!(translation(&generator, "zh_lv1").subtitles.is_some());

        let report = generator.synthesize_all(BatchPolicy::SkipExisting).await;
        assert!(matches!(report[0].1, Ok(TaskOutcome::Skipped)));
    }

    #[tokio::test]
    async fn image_variant_is_stored_as_data_uri() {
        let generator = generator_with(Arc::new(FakeServices::default()));
        lock_store(generator.store()).add_image(AppImage::new("i1", "QUJD"));

        assert_eq!(
            generator.generate_image("i1").await.unwrap(),
            TaskOutcome::Applied
        );
        let store = lock_store(generator.store());
        let img = store.state().image("i1").unwrap();
        assert_eq!(img.generated.as_deref(), Some("data:image/png;base64,gen-QUJD"));
        assert!(!img.is_generating);
    }

    #[tokio::test]
    async fn voice_request_uses_settings_and_variant_speed() {
        let fake = Arc::new(FakeServices::default());
        let generator = generator_with(fake.clone());
        {
            let mut store = lock_store(generator.store());
            store.set_speech_api_key("xi");
            store.update_voice_settings(crate::store::VoiceSettingsPatch {
                read_title: Some(true),
                playback_speed: Some(0.9),
                ..Default::default()
            });
            store.update_translation(Translation {
                title: "Title".into(),
                content: "Body".into(),
                speed: Some(1.1),
                ..Translation::empty("zh_lv1")
            });
        }

        generator.synthesize_voice("zh_lv1").await.unwrap();

        let request = fake.last_speech.lock().unwrap().clone().unwrap();
        assert_eq!(request.text, "Title. Body");
        assert_eq!(request.api_key, "xi");
        assert_eq!(request.model_id, "speech-model");
        assert_eq!(request.speed, 1.1);

        let t = translation(&generator, "zh_lv1");
        assert_eq!(t.voice_file.as_deref(), Some("data:audio/mpeg;base64,bXAz"));
    }

    #[tokio::test]
    async fn synthesize_all_respects_policy() {
        let fake = Arc::new(FakeServices::default());
        let generator = generator_with(fake.clone());
        seed_variant(&generator, "zh_lv1", Some("data:audio/mpeg;base64,AAAA"));
        seed_variant(&generator, "zh_lv2", None);

        let report = generator.synthesize_all(BatchPolicy::SkipExisting).await;
        assert!(matches!(report[0].1, Ok(TaskOutcome::Skipped)));
        assert!(matches!(report[1].1, Ok(TaskOutcome::Applied)));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);

        let report = generator.synthesize_all(BatchPolicy::Overwrite).await;
        assert!(report.iter().all(|(_, r)| matches!(r, Ok(TaskOutcome::Applied))));
        assert_eq!(
            translation(&generator, "zh_lv1").voice_file.as_deref(),
            Some("data:audio/mpeg;base64,bXAz")
        );
    }

    #[tokio::test]
    async fn subtitles_require_audio() {
        let generator = generator_with(Arc::new(FakeServices::default()));
        seed_variant(&generator, "zh_lv1", None);
        assert!(matches!(
            generator.generate_subtitles("zh_lv1").await,
            Err(TaskError::Precondition(_))
        ));

        seed_variant(&generator, "zh_lv1", Some("data:audio/mpeg;base64,AAAA"));
        generator.generate_subtitles("zh_lv1").await.unwrap();
        let srt = translation(&generator, "zh_lv1").subtitles.unwrap();
        assert!(srt.ends_with("audio/mpeg"));
    }

    #[tokio::test]
    async fn metadata_for_all_skips_empty_variants() {
        let generator = generator_with(Arc::new(FakeServices::default()));
        seed_variant(&generator, "zh_lv2", None);

        let report = generator.generate_all_metadata().await;
        assert!(matches!(report[0].1, Ok(TaskOutcome::Skipped)));
        assert!(matches!(report[1].1, Ok(TaskOutcome::Applied)));
        assert_eq!(
            translation(&generator, "zh_lv2").metadata.as_deref(),
            Some("meta for T-zh_lv2")
        );
    }

    #[tokio::test]
    async fn crawl_replaces_article() {
        let generator = generator_with(Arc::new(FakeServices::default()));
        generator.crawl_article("https://news.example/a").await.unwrap();

        let store = lock_store(generator.store());
        let article = &store.state().article;
        assert_eq!(article.title, "Crawled");
        assert_eq!(article.content, "from https://news.example/a");
        assert_eq!(article.url.as_deref(), Some("https://news.example/a"));
    }

    #[tokio::test]
    async fn voices_use_session_credential() {
        let generator = generator_with(Arc::new(FakeServices::default()));
        assert!(generator.list_voices().await.is_empty());
        lock_store(generator.store()).set_speech_api_key("xi");
        assert_eq!(generator.list_voices().await.len(), 1);
    }
}
