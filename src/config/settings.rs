//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section uses `#[serde(default)]`, so a partial `settings.toml` only
//! overrides the keys it names.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

/// Login gate settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Expected password.  `None` (or an empty string) lets any input log in.
    pub password: Option<String>,
}

impl AuthConfig {
    /// The expected password, treating an empty string as "not configured".
    pub fn expected_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

// ---------------------------------------------------------------------------
// GeminiConfig
// ---------------------------------------------------------------------------

/// Settings for the generative-text / image / audio API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Base URL of the API endpoint.
    pub base_url: String,
    /// API key; requests fail with a missing-credential error when unset.
    pub api_key: Option<String>,
    /// Model used for text adaptation and metadata.
    pub text_model: String,
    /// Model used for image variants.
    pub image_model: String,
    /// Model used for subtitles (audio input).
    pub audio_model: String,
    /// Maximum seconds to wait for a response.
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: None,
            text_model: "gemini-3-flash-preview".into(),
            image_model: "gemini-2.5-flash-image".into(),
            audio_model: "gemini-2.5-flash".into(),
            timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for the text-to-speech API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Base URL of the API endpoint (without the `/v1` suffix).
    pub base_url: String,
    /// Initial credential for a fresh session.  The session may override it.
    pub api_key: Option<String>,
    /// Model used for single-voice synthesis.
    pub model: String,
    /// Model used for two-speaker dialogue synthesis.
    pub dialogue_model: String,
    /// Maximum seconds to wait for a response.
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".into(),
            api_key: None,
            model: "eleven_multilingual_v2".into(),
            dialogue_model: "eleven_v3".into(),
            timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Where and how session snapshots are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot directory.  `None` uses [`AppPaths::session_dir`].
    pub dir: Option<PathBuf>,
    /// Storage key; the snapshot file is `<dir>/<key>.json`.
    pub key: String,
    /// Upper bound on the size of one snapshot in bytes.  Narration audio is
    /// stored beside the snapshot and does not count.
    pub quota_bytes: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            key: crate::store::STORAGE_KEY.into(),
            quota_bytes: Some(5 * 1024 * 1024),
        }
    }
}

impl StorageConfig {
    /// The effective snapshot directory.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().session_dir)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use article_adapter::config::AppConfig;
///
/// // Load (returns Default when file is missing), then apply env overrides.
/// let config = AppConfig::load().unwrap().with_env_overrides();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Login gate.
    pub auth: AuthConfig,
    /// Generative text / image / audio API.
    pub gemini: GeminiConfig,
    /// Text-to-speech API.
    pub speech: SpeechConfig,
    /// Snapshot persistence.
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fill credentials and the password from the process environment.
    ///
    /// Environment values win over the file.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an
    /// injectable lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| lookup(n).filter(|v| !v.is_empty()))
        };

        if let Some(key) = first(&["GEMINI_API_KEY", "API_KEY"]) {
            self.gemini.api_key = Some(key);
        }
        if let Some(key) = first(&["ELEVENLABS_API_KEY", "EL_API_KEY"]) {
            self.speech.api_key = Some(key);
        }
        if let Some(password) = first(&["PASSWORD"]) {
            self.auth.password = Some(password);
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
