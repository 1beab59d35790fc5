//! Session state value and its pure transitions.
//!
//! [`AppState`] is an immutable value: [`reduce`] takes the current state and
//! an [`Action`] and returns the next state.  Large slices sit behind `Arc`,
//! so a transition that touches one slice leaves every other slice
//! pointer-equal to the previous state.
//!
//! ```text
//!   AppState ──reduce(action)──▶ AppState'
//!                                   │
//!          text_configs changed? ───┴──▶ reconcile(translations, text_configs)
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

use super::model::{
    default_text_configs, AppImage, Article, PromptConfig, PromptSetting, Translation,
    VoiceSettings, VoiceSettingsPatch, DEFAULT_IMAGE_PROMPT, DEFAULT_METADATA_PROMPT,
    DEFAULT_SRT_PROMPT,
};

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// The whole working project of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub article: Arc<Article>,
    pub translations: Arc<Vec<Translation>>,
    pub images: Arc<Vec<AppImage>>,
    pub is_authenticated: bool,
    pub text_configs: Arc<Vec<PromptConfig>>,
    pub image_config: PromptSetting,
    pub srt_config: PromptSetting,
    pub metadata_config: PromptSetting,
    /// Speech API credential.  Held in plain text.
    pub speech_api_key: String,
    pub voice_settings: VoiceSettings,
}

impl AppState {
    /// A fresh session: empty article, default prompts, one empty
    /// translation per default config.
    pub fn initial(speech_api_key: impl Into<String>) -> Self {
        let state = Self {
            article: Arc::new(Article::default()),
            translations: Arc::new(Vec::new()),
            images: Arc::new(Vec::new()),
            is_authenticated: false,
            text_configs: Arc::new(default_text_configs()),
            image_config: PromptSetting::new(DEFAULT_IMAGE_PROMPT),
            srt_config: PromptSetting::new(DEFAULT_SRT_PROMPT),
            metadata_config: PromptSetting::new(DEFAULT_METADATA_PROMPT),
            speech_api_key: speech_api_key.into(),
            voice_settings: VoiceSettings::default(),
        };
        state.reconciled()
    }

    /// Returns `self` with translations reconciled against the configs.
    pub fn reconciled(mut self) -> Self {
        self.translations = reconcile(&self.translations, &self.text_configs);
        self
    }

    pub fn translation(&self, config_id: &str) -> Option<&Translation> {
        self.translations.iter().find(|t| t.config_id == config_id)
    }

    pub fn text_config(&self, id: &str) -> Option<&PromptConfig> {
        self.text_configs.iter().find(|c| c.id == id)
    }

    pub fn image(&self, id: &str) -> Option<&AppImage> {
        self.images.iter().find(|i| i.id == id)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::initial(String::new())
    }
}

// ---------------------------------------------------------------------------
// ProjectPatch
// ---------------------------------------------------------------------------

/// The recognized top-level fields of an imported project file.
///
/// Fields that are `None` leave the current state untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    pub article: Option<Article>,
    pub translations: Option<Vec<Translation>>,
    pub text_configs: Option<Vec<PromptConfig>>,
    pub image_config: Option<PromptSetting>,
    pub srt_config: Option<PromptSetting>,
    pub voice_settings: Option<VoiceSettings>,
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Every mutation the session supports.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetArticleId(String),
    SetArticleTitle(String),
    SetArticleContent(String),
    SetArticleUrl(String),
    AddTextConfig(PromptConfig),
    UpdateTextConfig(PromptConfig),
    DeleteTextConfig(String),
    SetImagePrompt(String),
    SetSrtPrompt(String),
    SetMetadataPrompt(String),
    UpdateTranslation(Translation),
    ResetTranslations,
    AddImage(AppImage),
    UpdateImage(AppImage),
    RemoveImage(String),
    SetSpeechApiKey(String),
    UpdateVoiceSettings(VoiceSettingsPatch),
    SetAuthenticated(bool),
    ResetArticle,
    LoadProject(ProjectPatch),
}

impl Action {
    /// Whether applying this action replaces translations wholesale, which
    /// makes every outstanding translation task stale.
    pub fn replaces_translations(&self) -> bool {
        match self {
            Action::ResetTranslations | Action::ResetArticle => true,
            Action::LoadProject(patch) => patch.translations.is_some(),
            _ => false,
        }
    }

    /// Whether applying this action replaces images wholesale.
    pub fn replaces_images(&self) -> bool {
        matches!(self, Action::ResetArticle)
    }
}

// ---------------------------------------------------------------------------
// reduce
// ---------------------------------------------------------------------------

/// Apply `action` to `state`, returning the next state.
///
/// Pure: no I/O, no logging.  Actions that target a missing entity return a
/// state equal (and pointer-equal slice by slice) to the input.
pub fn reduce(state: &AppState, action: Action) -> AppState {
    let mut next = state.clone();

    match action {
        Action::SetArticleId(id) => Arc::make_mut(&mut next.article).id = Some(id),
        Action::SetArticleTitle(title) => Arc::make_mut(&mut next.article).title = title,
        Action::SetArticleContent(content) => {
            Arc::make_mut(&mut next.article).content = content
        }
        Action::SetArticleUrl(url) => Arc::make_mut(&mut next.article).url = Some(url),

        Action::AddTextConfig(config) => {
            if state.text_config(&config.id).is_some() {
                return next;
            }
            Arc::make_mut(&mut next.text_configs).push(config);
            next = next.reconciled();
        }
        Action::UpdateTextConfig(config) => {
            if state.text_config(&config.id).is_none() {
                return next;
            }
            for slot in Arc::make_mut(&mut next.text_configs).iter_mut() {
                if slot.id == config.id {
                    *slot = config.clone();
                }
            }
        }
        Action::DeleteTextConfig(id) => {
            if state.text_config(&id).is_none() {
                return next;
            }
            Arc::make_mut(&mut next.text_configs).retain(|c| c.id != id);
            next = next.reconciled();
        }

        Action::SetImagePrompt(prompt) => next.image_config = PromptSetting::new(prompt),
        Action::SetSrtPrompt(prompt) => next.srt_config = PromptSetting::new(prompt),
        Action::SetMetadataPrompt(prompt) => next.metadata_config = PromptSetting::new(prompt),

        Action::UpdateTranslation(translation) => {
            if state.translation(&translation.config_id).is_none() {
                return next;
            }
            for slot in Arc::make_mut(&mut next.translations).iter_mut() {
                if slot.config_id == translation.config_id {
                    *slot = translation.clone();
                }
            }
        }
        Action::ResetTranslations => {
            next.translations = Arc::new(empty_translations(&next.text_configs));
        }

        Action::AddImage(image) => Arc::make_mut(&mut next.images).push(image),
        Action::UpdateImage(image) => {
            if state.image(&image.id).is_none() {
                return next;
            }
            for slot in Arc::make_mut(&mut next.images).iter_mut() {
                if slot.id == image.id {
                    *slot = image.clone();
                }
            }
        }
        Action::RemoveImage(id) => {
            if state.image(&id).is_none() {
                return next;
            }
            Arc::make_mut(&mut next.images).retain(|i| i.id != id);
        }

        Action::SetSpeechApiKey(key) => next.speech_api_key = key,
        Action::UpdateVoiceSettings(patch) => {
            next.voice_settings = next.voice_settings.merged(&patch)
        }
        Action::SetAuthenticated(value) => next.is_authenticated = value,

        Action::ResetArticle => {
            next.article = Arc::new(Article::default());
            next.images = Arc::new(Vec::new());
            next.translations = Arc::new(empty_translations(&next.text_configs));
        }

        Action::LoadProject(patch) => {
            if let Some(article) = patch.article {
                next.article = Arc::new(article);
            }
            if let Some(translations) = patch.translations {
                next.translations = Arc::new(translations);
            }
            if let Some(configs) = patch.text_configs {
                next.text_configs = Arc::new(configs);
            }
            if let Some(image_config) = patch.image_config {
                next.image_config = image_config;
            }
            if let Some(srt_config) = patch.srt_config {
                next.srt_config = srt_config;
            }
            if let Some(voice_settings) = patch.voice_settings {
                next.voice_settings = voice_settings;
            }
            next = next.reconciled();
        }
    }

    next
}

fn empty_translations(configs: &[PromptConfig]) -> Vec<Translation> {
    configs.iter().map(|c| Translation::empty(&c.id)).collect()
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

/// Bring the translation key set in line with the config key set.
///
/// * configs without a translation get an empty one (appended in config
///   order);
/// * translations whose config is gone are dropped;
/// * duplicate translations for one config collapse to the first.
///
/// Returns the input `Arc` unchanged when nothing had to change, which makes
/// a second run a no-op.
pub fn reconcile(
    translations: &Arc<Vec<Translation>>,
    configs: &[PromptConfig],
) -> Arc<Vec<Translation>> {
    let config_ids: HashSet<&str> = configs.iter().map(|c| c.id.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();

    let mut kept: Vec<Translation> = translations
        .iter()
        .filter(|t| config_ids.contains(t.config_id.as_str()) && seen.insert(t.config_id.clone()))
        .cloned()
        .collect();
    let removed = translations.len() - kept.len();

    let mut added = 0;
    for config in configs {
        if seen.insert(config.id.clone()) {
            kept.push(Translation::empty(&config.id));
            added += 1;
        }
    }

    if removed == 0 && added == 0 {
        Arc::clone(translations)
    } else {
        Arc::new(kept)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(state: &AppState) -> Vec<String> {
        state
            .translations
            .iter()
            .map(|t| t.config_id.clone())
            .collect()
    }

    fn key_sets_match(state: &AppState) -> bool {
        let t: HashSet<_> = state.translations.iter().map(|t| &t.config_id).collect();
        let c: HashSet<_> = state.text_configs.iter().map(|c| &c.id).collect();
        t == c && t.len() == state.translations.len()
    }

    #[test]
    fn initial_state_has_one_empty_translation_per_default_config() {
        let state = AppState::default();
        assert_eq!(ids(&state), vec!["zh_lv1", "zh_lv2"]);
        assert!(state
            .translations
            .iter()
            .all(|t| t.title.is_empty() && t.content.is_empty()));
        assert!(!state.is_authenticated);
        assert!(state.images.is_empty());
    }

    #[test]
    fn delete_config_removes_exactly_its_translation() {
        let state = AppState::default();
        let next = reduce(&state, Action::DeleteTextConfig("zh_lv2".into()));
        assert_eq!(ids(&next), vec!["zh_lv1"]);
        assert!(key_sets_match(&next));
    }

    #[test]
    fn add_config_creates_empty_translation() {
        let state = AppState::default();
        let next = reduce(
            &state,
            Action::AddTextConfig(PromptConfig::new("x", "X", "do x")),
        );
        let t = next.translation("x").expect("translation for x");
        assert_eq!(t, &Translation::empty("x"));
        assert!(key_sets_match(&next));
    }

    #[test]
    fn add_config_with_existing_id_is_ignored() {
        let state = AppState::default();
        let next = reduce(
            &state,
            Action::AddTextConfig(PromptConfig::new("zh_lv1", "dup", "dup")),
        );
        assert_eq!(next, state);
        assert_eq!(next.text_configs.len(), 2);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let configs = vec![
            PromptConfig::new("a", "a", ""),
            PromptConfig::new("b", "b", ""),
        ];
        let messy = Arc::new(vec![
            Translation::empty("orphan"),
            Translation {
                title: "kept".into(),
                ..Translation::empty("b")
            },
            Translation::empty("b"),
        ]);

        let once = reconcile(&messy, &configs);
        let twice = reconcile(&once, &configs);

        assert!(Arc::ptr_eq(&once, &twice));
        let got: Vec<_> = once.iter().map(|t| t.config_id.as_str()).collect();
        assert_eq!(got, vec!["b", "a"]);
        assert_eq!(once[0].title, "kept");
    }

    #[test]
    fn update_translation_replaces_by_config_id() {
        let state = AppState::default();
        let updated = Translation {
            title: "T".into(),
            content: "C".into(),
            ..Translation::empty("zh_lv1")
        };
        let next = reduce(&state, Action::UpdateTranslation(updated.clone()));
        assert_eq!(next.translation("zh_lv1"), Some(&updated));
        assert_eq!(next.translation("zh_lv2"), state.translation("zh_lv2"));
    }

    #[test]
    fn update_translation_for_unknown_id_is_silent_noop() {
        let state = AppState::default();
        let next = reduce(
            &state,
            Action::UpdateTranslation(Translation::empty("missing")),
        );
        assert_eq!(next, state);
        assert!(Arc::ptr_eq(&next.translations, &state.translations));
    }

    #[test]
    fn untouched_slices_stay_pointer_equal() {
        let state = AppState::default();
        let next = reduce(&state, Action::SetArticleTitle("Hello".into()));
        assert_eq!(next.article.title, "Hello");
        assert!(Arc::ptr_eq(&next.translations, &state.translations));
        assert!(Arc::ptr_eq(&next.images, &state.images));
        assert!(Arc::ptr_eq(&next.text_configs, &state.text_configs));
        assert!(!Arc::ptr_eq(&next.article, &state.article));
    }

    #[test]
    fn image_add_update_remove() {
        let state = AppState::default();
        let s1 = reduce(&state, Action::AddImage(AppImage::new("i1", "data:a")));
        let mut edited = s1.image("i1").cloned().unwrap();
        edited.generated = Some("data:b".into());
        let s2 = reduce(&s1, Action::UpdateImage(edited));
        assert_eq!(s2.image("i1").unwrap().generated.as_deref(), Some("data:b"));

        let s3 = reduce(&s2, Action::RemoveImage("i1".into()));
        assert!(s3.images.is_empty());

        let s4 = reduce(&s3, Action::RemoveImage("i1".into()));
        assert_eq!(s4, s3);
    }

    #[test]
    fn reset_article_clears_article_images_and_translation_output() {
        let mut state = AppState::default();
        state = reduce(&state, Action::SetArticleTitle("A".into()));
        state = reduce(&state, Action::AddImage(AppImage::new("i1", "data:a")));
        state = reduce(
            &state,
            Action::UpdateTranslation(Translation {
                content: "done".into(),
                ..Translation::empty("zh_lv1")
            }),
        );

        let next = reduce(&state, Action::ResetArticle);
        assert_eq!(*next.article, Article::default());
        assert!(next.images.is_empty());
        assert_eq!(ids(&next), vec!["zh_lv1", "zh_lv2"]);
        assert!(next.translations.iter().all(|t| t.content.is_empty()));
    }

    #[test]
    fn singleton_prompts_are_replaced() {
        let state = AppState::default();
        let next = reduce(&state, Action::SetSrtPrompt("srt!".into()));
        let next = reduce(&next, Action::SetMetadataPrompt("meta!".into()));
        assert_eq!(next.srt_config.prompt, "srt!");
        assert_eq!(next.metadata_config.prompt, "meta!");
        assert_eq!(next.image_config, state.image_config);
    }

    #[test]
    fn load_project_merges_only_present_fields() {
        let mut state = AppState::default();
        state = reduce(&state, Action::SetArticleTitle("keep me?".into()));
        let voice_before = state.voice_settings.clone();

        let patch = ProjectPatch {
            text_configs: Some(vec![PromptConfig::new("only", "only", "p")]),
            ..Default::default()
        };
        let next = reduce(&state, Action::LoadProject(patch));

        assert_eq!(next.article.title, "keep me?");
        assert_eq!(next.voice_settings, voice_before);
        assert_eq!(ids(&next), vec!["only"]);
        assert!(key_sets_match(&next));
    }

    #[test]
    fn invariant_holds_after_arbitrary_config_churn() {
        let mut state = AppState::default();
        let steps = vec![
            Action::AddTextConfig(PromptConfig::new("a", "a", "")),
            Action::DeleteTextConfig("zh_lv1".into()),
            Action::AddTextConfig(PromptConfig::new("b", "b", "")),
            Action::UpdateTextConfig(PromptConfig::new("a", "renamed", "new")),
            Action::DeleteTextConfig("nope".into()),
            Action::ResetTranslations,
            Action::DeleteTextConfig("b".into()),
        ];
        for action in steps {
            state = reduce(&state, action);
            assert!(key_sets_match(&state));
        }
        assert_eq!(state.text_config("a").unwrap().name, "renamed");
    }

    #[test]
    fn action_classification() {
        assert!(Action::ResetArticle.replaces_translations());
        assert!(Action::ResetArticle.replaces_images());
        assert!(!Action::LoadProject(ProjectPatch::default()).replaces_translations());
        assert!(!Action::SetArticleTitle("x".into()).replaces_translations());
    }
}
