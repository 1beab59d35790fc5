//! Prompt assembly for the text model.

/// Combine an adaptation instruction with the source article.
pub fn adaptation_prompt(instruction: &str, title: &str, content: &str) -> String {
    format!(
        "{}\n\nORIGINAL TITLE:\n{}\n\nORIGINAL CONTENT:\n{}",
        instruction.trim(),
        title.trim(),
        content.trim()
    )
}

/// Metadata prompts end with a lead-in ("...based on this content:\n\n"),
/// so the variant follows directly.
pub fn metadata_prompt(instruction: &str, title: &str, content: &str) -> String {
    format!("{instruction}{title}\n\n{content}")
}
