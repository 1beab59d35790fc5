//! `[Speaker1]` / `[Speaker2]` tag splitting for two-voice narration.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    One,
    Two,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueSegment {
    pub speaker: Speaker,
    pub text: String,
}

fn speaker_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"\[Speaker([12])\]").expect("valid speaker tag pattern"))
}

/// Split tagged text into speaker segments.
///
/// Returns `None` when the text carries no tag.  Text before the first tag
/// belongs to speaker 1; empty segments are dropped.
pub fn split_dialogue(text: &str) -> Option<Vec<DialogueSegment>> {
    let tag = speaker_tag();
    if !tag.is_match(text) {
        return None;
    }

    let mut segments = Vec::new();
    let mut speaker = Speaker::One;
    let mut cursor = 0;

    let mut push = |speaker: Speaker, chunk: &str| {
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            segments.push(DialogueSegment {
                speaker,
                text: chunk.to_string(),
            });
        }
    };

    for caps in tag.captures_iter(text) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((cursor, cursor));
        push(speaker, &text[cursor..whole.0]);
        speaker = if &caps[1] == "2" { Speaker::Two } else { Speaker::One };
        cursor = whole.1;
    }
    push(speaker, &text[cursor..]);

    Some(segments)
}
