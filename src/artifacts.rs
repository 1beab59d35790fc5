//! Download artifacts: text variants, narration, subtitles and images written
//! to a directory under predictable names.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::services::{DataUri, ServiceError};
use crate::store::AppState;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{kind} '{id}' has nothing to download")]
    Missing { kind: &'static str, id: String },

    #[error("could not decode {0}: {1}")]
    Payload(String, #[source] ServiceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Replace characters that cannot appear in a file name.
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// `{articleId}_{configName}.txt` when the article has an id, otherwise
/// `adapted-{configId}.txt`.  The config id stands in for a missing name.
pub fn text_file_name(state: &AppState, config_id: &str) -> String {
    match state.article.id.as_deref().filter(|id| !id.is_empty()) {
        Some(article_id) => {
            let name = state
                .text_config(config_id)
                .map(|c| c.name.as_str())
                .unwrap_or(config_id);
            file_safe(&format!("{article_id}_{name}.txt"))
        }
        None => file_safe(&format!("adapted-{config_id}.txt")),
    }
}

pub fn audio_file_name(config_id: &str) -> String {
    file_safe(&format!("audio-{config_id}.mp3"))
}

pub fn subtitle_file_name(config_id: &str) -> String {
    file_safe(&format!("subs-{config_id}.srt"))
}

pub fn image_file_name(id: &str, uri: &DataUri) -> String {
    file_safe(&format!("image-{id}.{}", uri.extension()))
}

fn write_into(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    log::info!("Wrote {}", path.display());
    Ok(path)
}

/// Write `"{title}\n\n{content}"` of a text variant.
pub fn write_text(dir: &Path, state: &AppState, config_id: &str) -> Result<PathBuf, ArtifactError> {
    let t = state
        .translation(config_id)
        .filter(|t| !t.content.is_empty() || !t.title.is_empty())
        .ok_or_else(|| ArtifactError::Missing {
            kind: "text variant",
            id: config_id.to_string(),
        })?;
    let body = format!("{}\n\n{}", t.title, t.content);
    write_into(dir, &text_file_name(state, config_id), body.as_bytes())
}

pub fn write_audio(dir: &Path, state: &AppState, config_id: &str) -> Result<PathBuf, ArtifactError> {
    let uri = state
        .translation(config_id)
        .and_then(|t| t.voice_file.as_deref())
        .and_then(DataUri::parse)
        .ok_or_else(|| ArtifactError::Missing {
            kind: "audio of",
            id: config_id.to_string(),
        })?;
    let bytes = uri
        .to_bytes()
        .map_err(|e| ArtifactError::Payload(format!("audio of '{config_id}'"), e))?;
    write_into(dir, &audio_file_name(config_id), &bytes)
}

pub fn write_subtitles(
    dir: &Path,
    state: &AppState,
    config_id: &str,
) -> Result<PathBuf, ArtifactError> {
    let srt = state
        .translation(config_id)
        .and_then(|t| t.subtitles.as_deref())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ArtifactError::Missing {
            kind: "subtitles of",
            id: config_id.to_string(),
        })?;
    write_into(dir, &subtitle_file_name(config_id), srt.as_bytes())
}

/// Write the generated variant of an image, or the original when none has
/// been generated.
pub fn write_image(dir: &Path, state: &AppState, id: &str) -> Result<PathBuf, ArtifactError> {
    let image = state.image(id).ok_or_else(|| ArtifactError::Missing {
        kind: "image",
        id: id.to_string(),
    })?;
    let uri = DataUri::parse_image(image.generated.as_deref().unwrap_or(&image.original));
    let bytes = uri
        .to_bytes()
        .map_err(|e| ArtifactError::Payload(format!("image '{id}'"), e))?;
    write_into(dir, &image_file_name(id, &uri), &bytes)
}

/// Write every artifact the session currently holds.  Entities with nothing
/// to write are skipped.
pub fn write_all(dir: &Path, state: &AppState) -> Result<Vec<PathBuf>, ArtifactError> {
    let mut written = Vec::new();
    for t in state.translations.iter() {
        if !t.content.is_empty() || !t.title.is_empty() {
            written.push(write_text(dir, state, &t.config_id)?);
        }
        if t.voice_file.is_some() {
            written.push(write_audio(dir, state, &t.config_id)?);
        }
        if t.subtitles.as_deref().is_some_and(|s| !s.is_empty()) {
            written.push(write_subtitles(dir, state, &t.config_id)?);
        }
    }
    for image in state.images.iter() {
        written.push(write_image(dir, state, &image.id)?);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{reduce, Action, AppImage, Translation};

    fn state_with_variant() -> AppState {
        let state = AppState::initial("");
        reduce(
            &state,
            Action::UpdateTranslation(Translation {
                title: "下雨".into(),
                content: "今天下雨。".into(),
                voice_file: Some("data:audio/mpeg;base64,SUQz".into()),
                subtitles: Some("1\n00:00:00,000 --> 00:00:01,000\n下雨".into()),
                ..Translation::empty("zh_lv1")
            }),
        )
    }

    #[test]
    fn text_name_depends_on_article_id() {
        let state = state_with_variant();
        assert_eq!(text_file_name(&state, "zh_lv1"), "adapted-zh_lv1.txt");

        let state = reduce(&state, Action::SetArticleId("a42".into()));
        let name = state.text_config("zh_lv1").unwrap().name.clone();
        assert_eq!(
            text_file_name(&state, "zh_lv1"),
            file_safe(&format!("a42_{name}.txt"))
        );
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        assert_eq!(file_safe("a/b:c?.txt"), "a_b_c_.txt");
        assert_eq!(audio_file_name("x"), "audio-x.mp3");
        assert_eq!(subtitle_file_name("x"), "subs-x.srt");
    }

    #[test]
    fn writes_variant_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let state = state_with_variant();

        let text = write_text(&target, &state, "zh_lv1").unwrap();
        assert_eq!(std::fs::read_to_string(text).unwrap(), "下雨\n\n今天下雨。");

        let audio = write_audio(&target, &state, "zh_lv1").unwrap();
        assert_eq!(std::fs::read(audio).unwrap(), b"ID3");

        let srt = write_subtitles(&target, &state, "zh_lv1").unwrap();
        assert!(std::fs::read_to_string(srt).unwrap().ends_with("下雨"));
    }

    #[test]
    fn missing_audio_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::initial("");
        assert!(matches!(
            write_audio(dir.path(), &state, "zh_lv1"),
            Err(ArtifactError::Missing { .. })
        ));
    }

    #[test]
    fn image_prefers_generated_variant() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = AppImage::new("i1", "QUJD");
        image.generated = Some("data:image/png;base64,UE5H".into());
        let state = reduce(&AppState::initial(""), Action::AddImage(image));

        let path = write_image(dir.path(), &state, "i1").unwrap();
        assert!(path.ends_with("image-i1.png"));
        assert_eq!(std::fs::read(path).unwrap(), b"PNG");
    }

    #[test]
    fn write_all_skips_empty_variants() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_all(dir.path(), &state_with_variant()).unwrap();
        // zh_lv1 has text, audio and subtitles; zh_lv2 is empty
        assert_eq!(written.len(), 3);
    }
}
