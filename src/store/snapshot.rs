//! Versioned snapshot codec.
//!
//! The persisted session and the exported project file share one JSON shape:
//!
//! ```text
//! {
//!   "version": 2,
//!   "article": {...}, "translations": [...], "images": [...],
//!   "isAuthenticated": false, "textConfigs": [...],
//!   "imageConfig": {...}, "srtConfig": {...}, "youtubeConfig": {...},
//!   "elevenLabsApiKey": "...", "voiceSettings": {...}
//! }
//! ```
//!
//! Encoding strips every translation's audio; the store keeps it beside the
//! snapshot.  Decoding accepts documents written before `version` existed
//! and fills every absent field with its documented default.
//!
//! | version | notes                                                      |
//! |---------|------------------------------------------------------------|
//! | none    | legacy; may lack `voiceSettings`, `srtConfig`, auth flag   |
//! | 2       | current                                                    |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{
    default_text_configs, AppImage, Article, PromptConfig, PromptSetting, Translation,
    VoiceSettings, DEFAULT_IMAGE_PROMPT, DEFAULT_METADATA_PROMPT, DEFAULT_SRT_PROMPT,
};
use super::state::{AppState, ProjectPatch};

/// Version written by [`encode_snapshot`].
pub const SNAPSHOT_VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// SnapshotError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Input is not valid JSON, or a recognized field has the wrong shape.
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON, but the top level is not an object.
    #[error("snapshot must be a JSON object")]
    NotAnObject,

    /// Written by a newer build.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotOut<'a> {
    version: u32,
    article: &'a Article,
    translations: Vec<Translation>,
    images: &'a [AppImage],
    is_authenticated: bool,
    text_configs: &'a [PromptConfig],
    image_config: &'a PromptSetting,
    srt_config: &'a PromptSetting,
    youtube_config: &'a PromptSetting,
    eleven_labs_api_key: &'a str,
    voice_settings: &'a VoiceSettings,
}

/// Serialize `state` for persistence or export.
///
/// Audio data is removed from every translation; the in-memory state is not
/// touched.
pub fn encode_snapshot(state: &AppState) -> Result<String, SnapshotError> {
    let out = SnapshotOut {
        version: SNAPSHOT_VERSION,
        article: &state.article,
        translations: state
            .translations
            .iter()
            .map(Translation::without_audio)
            .collect(),
        images: &state.images,
        is_authenticated: state.is_authenticated,
        text_configs: &state.text_configs,
        image_config: &state.image_config,
        srt_config: &state.srt_config,
        youtube_config: &state.metadata_config,
        eleven_labs_api_key: &state.speech_api_key,
        voice_settings: &state.voice_settings,
    };
    Ok(serde_json::to_string_pretty(&out)?)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    version: Option<u32>,
    article: Option<Article>,
    translations: Option<Vec<Translation>>,
    images: Option<Vec<AppImage>>,
    is_authenticated: Option<bool>,
    text_configs: Option<Vec<PromptConfig>>,
    image_config: Option<PromptSetting>,
    srt_config: Option<PromptSetting>,
    #[serde(alias = "metadataConfig")]
    youtube_config: Option<PromptSetting>,
    #[serde(alias = "speechApiKey")]
    eleven_labs_api_key: Option<String>,
    voice_settings: Option<VoiceSettings>,
}

fn parse_object(raw: &str) -> Result<serde_json::Value, SnapshotError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err(SnapshotError::NotAnObject);
    }
    Ok(value)
}

/// Decode a persisted snapshot into a complete [`AppState`].
///
/// Pure.  Absent fields get their defaults:
/// * `voiceSettings` → [`VoiceSettings::default`]
/// * `isAuthenticated` → `false`
/// * `srtConfig` / `imageConfig` / `youtubeConfig` → default prompts
/// * `textConfigs` → the default `zh_lv1`, `zh_lv2` configs
/// * everything else → empty
///
/// The result is reconciled and carries no in-progress flags.
pub fn decode_snapshot(raw: &str) -> Result<AppState, SnapshotError> {
    let value = parse_object(raw)?;
    let snap: RawSnapshot = serde_json::from_value(value)?;

    if let Some(version) = snap.version {
        if version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
    }

    let state = AppState {
        article: Arc::new(snap.article.unwrap_or_default()),
        translations: Arc::new(snap.translations.unwrap_or_default()),
        images: Arc::new(snap.images.unwrap_or_default()),
        is_authenticated: snap.is_authenticated.unwrap_or(false),
        text_configs: Arc::new(snap.text_configs.unwrap_or_else(default_text_configs)),
        image_config: snap
            .image_config
            .unwrap_or_else(|| PromptSetting::new(DEFAULT_IMAGE_PROMPT)),
        srt_config: snap
            .srt_config
            .unwrap_or_else(|| PromptSetting::new(DEFAULT_SRT_PROMPT)),
        metadata_config: snap
            .youtube_config
            .unwrap_or_else(|| PromptSetting::new(DEFAULT_METADATA_PROMPT)),
        speech_api_key: snap.eleven_labs_api_key.unwrap_or_default(),
        voice_settings: snap.voice_settings.unwrap_or_default(),
    };

    Ok(state.reconciled())
}

/// Decode a user-supplied project file into a [`ProjectPatch`].
///
/// Unrecognized fields are ignored; nothing is validated beyond structure.
pub fn decode_project(raw: &str) -> Result<ProjectPatch, SnapshotError> {
    let value = parse_object(raw)?;
    Ok(serde_json::from_value(value)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
