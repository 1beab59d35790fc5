//! `data:<mime>;base64,<payload>` URIs, the form in which images and audio
//! are held in the session.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::error::ServiceError;

/// MIME type assumed for images stored without a data-URI prefix.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// MIME type of synthesized speech.
pub const SPEECH_MIME: &str = "audio/mpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

impl DataUri {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Encode raw bytes.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(mime_type, STANDARD.encode(bytes))
    }

    /// Parse a strict `data:<mime>;base64,<payload>` URI.
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (mime_type, data) = rest.split_once(";base64,")?;
        if mime_type.is_empty() || !mime_type.contains('/') {
            return None;
        }
        Some(Self::new(mime_type, data))
    }

    /// Parse an image reference; a bare base64 string is taken as
    /// [`DEFAULT_IMAGE_MIME`].
    pub fn parse_image(value: &str) -> Self {
        Self::parse(value).unwrap_or_else(|| Self::new(DEFAULT_IMAGE_MIME, value))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ServiceError> {
        STANDARD
            .decode(self.data.trim())
            .map_err(|e| ServiceError::MalformedResponse(format!("invalid base64 payload: {e}")))
    }

    /// File extension matching the MIME type (`"bin"` when unknown).
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" => "wav",
            _ => "bin",
        }
    }

    /// Guess a MIME type from a file extension.
    pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            "mp3" => Some("audio/mpeg"),
            "wav" => Some("audio/wav"),
            _ => None,
        }
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.data)
    }
}
