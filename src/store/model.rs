//! Entities owned by the session state and their documented defaults.
//!
//! Wire names follow the persisted snapshot format (camelCase).  In-progress
//! flags are `#[serde(skip)]`: they describe tasks of the running process and
//! are never written to, or restored from, a snapshot.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

const ZH_LV1_PROMPT: &str = "Gather the title, the content of this news, translated into Chinese and \
rewrite into a shorter version for Chinese language learning for beginner level, about 200 Chinese \
characters. using narrators perspective, do not incude and dialog. Show translated/edited title and \
contnet in Chinese, do not append English or pingyin.";

const ZH_LV2_PROMPT: &str = "Gather the title, the content of this news, translated into Chinese and \
rewrite into a shorter version for Chinese language learning for intermediate level, about 500 Chinese \
characters. using narrators perspective, do not incude and dialog. Show translated/edited title and \
contnet in Chinese, do not append English or pingyin.";

pub const DEFAULT_IMAGE_PROMPT: &str = "Generate this image in \"Editorial Vector\" Style";

pub const DEFAULT_SRT_PROMPT: &str = "\
Listen to this audio file and generate an SRT (SubRip Subtitle) file content for it.
Ensure the timestamps are accurate and the text matches the spoken audio.
Ensure each subtitle block contains only ONE line of text.
Each line should not have more than 30 characters, try not to break at middle of clauses
Chinese characters should be in simplified Chinese
Only output the srt content";

pub const DEFAULT_METADATA_PROMPT: &str = "\
I'm making a YouTube video to teach Chinese with news in slow speed. Please write suggested title and \
description. Give three suggestions for title. helps evaluate the HSK level.  Response in text that \
youtube supports in description, for example *text* for bold.

Here is the transcription:

";

/// The pre-seeded, ordered prompt configs of a fresh session.
pub fn default_text_configs() -> Vec<PromptConfig> {
    vec![
        PromptConfig::new("zh_lv1", "zh_lv1", ZH_LV1_PROMPT),
        PromptConfig::new("zh_lv2", "zh_lv2", ZH_LV2_PROMPT),
    ]
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// The source article being adapted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Article {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// PromptConfig / PromptSetting
// ---------------------------------------------------------------------------

/// A named instruction template driving one generated text variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prompt: String,
}

impl PromptConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prompt: prompt.into(),
        }
    }
}

/// A singleton prompt record (image, subtitle and metadata prompts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSetting {
    #[serde(default)]
    pub prompt: String,
}

impl PromptSetting {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationKind / InProgress
// ---------------------------------------------------------------------------

/// The four independent generation tasks a [`Translation`] can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationKind {
    Text,
    Voice,
    Subtitles,
    Metadata,
}

impl GenerationKind {
    pub fn label(&self) -> &'static str {
        match self {
            GenerationKind::Text => "text",
            GenerationKind::Voice => "voice",
            GenerationKind::Subtitles => "subtitles",
            GenerationKind::Metadata => "metadata",
        }
    }
}

/// Transient per-kind busy flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InProgress {
    pub text: bool,
    pub voice: bool,
    pub subtitles: bool,
    pub metadata: bool,
}

impl InProgress {
    pub fn get(&self, kind: GenerationKind) -> bool {
        match kind {
            GenerationKind::Text => self.text,
            GenerationKind::Voice => self.voice,
            GenerationKind::Subtitles => self.subtitles,
            GenerationKind::Metadata => self.metadata,
        }
    }

    pub fn set(&mut self, kind: GenerationKind, value: bool) {
        match kind {
            GenerationKind::Text => self.text = value,
            GenerationKind::Voice => self.voice = value,
            GenerationKind::Subtitles => self.subtitles = value,
            GenerationKind::Metadata => self.metadata = value,
        }
    }

    pub fn any(&self) -> bool {
        self.text || self.voice || self.subtitles || self.metadata
    }
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

/// Generated output for one [`PromptConfig`], keyed by `config_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub config_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Synthesized audio as a data URI.  Kept out of the snapshot and
    /// stored beside it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_file: Option<String>,
    /// Subtitle (SRT) text.
    #[serde(
        default,
        rename = "srtContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub subtitles: Option<String>,
    /// Free-form descriptive metadata text.
    #[serde(
        default,
        rename = "youtubeMetadata",
        alias = "metadata",
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<String>,
    /// Per-item speech speed multiplier; falls back to the global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip)]
    pub in_progress: InProgress,
}

impl Translation {
    /// An empty translation linked to `config_id`, as created by
    /// reconciliation.
    pub fn empty(config_id: impl Into<String>) -> Self {
        Self {
            config_id: config_id.into(),
            ..Self::default()
        }
    }

    /// A copy with the audio data removed, used for persistence.
    pub fn without_audio(&self) -> Self {
        Self {
            voice_file: None,
            ..self.clone()
        }
    }

    pub fn is_generating(&self, kind: GenerationKind) -> bool {
        self.in_progress.get(kind)
    }
}

// ---------------------------------------------------------------------------
// AppImage
// ---------------------------------------------------------------------------

/// A user-supplied image and its optional generated variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppImage {
    pub id: String,
    /// Original image data as a data URI.
    #[serde(rename = "originalUrl")]
    pub original: String,
    /// Generated variant as a data URI.
    #[serde(
        default,
        rename = "generatedUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub generated: Option<String>,
    #[serde(skip)]
    pub is_generating: bool,
}

impl AppImage {
    pub fn new(id: impl Into<String>, original: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            original: original.into(),
            generated: None,
            is_generating: false,
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceSettings
// ---------------------------------------------------------------------------

/// Speech synthesis settings shared by every variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceSettings {
    pub voice_id: String,
    /// Voice for `[Speaker2]` segments in two-speaker dialogue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_voice_id: Option<String>,
    pub language: String,
    pub stability: f32,
    pub playback_speed: f32,
    pub read_title: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.into(),
            secondary_voice_id: None,
            language: "en".into(),
            stability: 0.5,
            playback_speed: 1.0,
            read_title: false,
        }
    }
}

/// A partial [`VoiceSettings`] update; `None` fields are left untouched.
///
/// An empty `secondary_voice_id` clears the secondary voice.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceSettingsPatch {
    pub voice_id: Option<String>,
    pub secondary_voice_id: Option<String>,
    pub language: Option<String>,
    pub stability: Option<f32>,
    pub playback_speed: Option<f32>,
    pub read_title: Option<bool>,
}

impl VoiceSettings {
    /// Shallow-merge `patch` into a copy of `self`.
    pub fn merged(&self, patch: &VoiceSettingsPatch) -> Self {
        let mut next = self.clone();
        if let Some(voice_id) = &patch.voice_id {
            next.voice_id = voice_id.clone();
        }
        if let Some(secondary) = &patch.secondary_voice_id {
            next.secondary_voice_id = Some(secondary.clone()).filter(|s| !s.is_empty());
        }
        if let Some(language) = &patch.language {
            next.language = language.clone();
        }
        if let Some(stability) = patch.stability {
            next.stability = stability;
        }
        if let Some(speed) = patch.playback_speed {
            next.playback_speed = speed;
        }
        if let Some(read_title) = patch.read_title {
            next.read_title = read_title;
        }
        next
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
