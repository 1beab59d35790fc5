//! The session store: owns the [`AppState`], persists it, gates logins and
//! arbitrates generation results.
//!
//! [`SharedStore`] is a type alias for `Arc<Mutex<Store>>`, cheap to clone
//! and safe to hand to concurrently running generation tasks.  Every method
//! is synchronous; never hold the lock across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::AppConfig;

use super::model::{AppImage, PromptConfig, Translation, VoiceSettingsPatch};
use super::snapshot::{decode_project, decode_snapshot, encode_snapshot, SnapshotError};
use super::state::{reduce, Action, AppState};
use super::storage::{SnapshotStorage, StorageError};
use super::ticket::{TaskTarget, Ticket, TicketBook};

/// Storage key used when none is configured.
pub const STORAGE_KEY: &str = "article_adapter_session_v1";

// ---------------------------------------------------------------------------
// StoreOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Key the snapshot is stored under.
    pub key: String,
    /// Expected login password.  `None` accepts any input.
    pub expected_password: Option<String>,
    /// Speech credential for sessions that have none of their own.
    pub default_speech_api_key: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            key: STORAGE_KEY.into(),
            expected_password: None,
            default_speech_api_key: String::new(),
        }
    }
}

impl From<&AppConfig> for StoreOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            key: config.storage.key.clone(),
            expected_password: config.auth.expected_password().map(str::to_string),
            default_speech_api_key: config.speech.api_key.clone().unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct Store {
    state: AppState,
    storage: Box<dyn SnapshotStorage>,
    key: String,
    expected_password: Option<String>,
    tickets: TicketBook,
    last_written: Option<String>,
    /// Audio as last stored beside the snapshot, by config id.
    stored_audio: HashMap<String, String>,
    persist_error: Option<StorageError>,
}

impl Store {
    /// Restore the session stored under `options.key`, or start a fresh one.
    ///
    /// A snapshot that cannot be read or decoded is logged and replaced by a
    /// fresh session; opening never fails.  Audio stored beside a restored
    /// snapshot is loaded back into its variants.
    pub fn open(storage: Box<dyn SnapshotStorage>, options: StoreOptions) -> Self {
        let restored = match storage.read(&options.key) {
            Ok(Some(raw)) => match decode_snapshot(&raw) {
                Ok(state) => Some((state, raw)),
                Err(e) => {
                    log::warn!("store: discarding unreadable snapshot '{}': {e}", options.key);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("store: could not read snapshot '{}': {e}", options.key);
                None
            }
        };

        let (mut state, last_written) = match restored {
            Some((state, raw)) => {
                log::info!("store: restored session '{}'", options.key);
                (state, Some(raw))
            }
            None => (AppState::initial(options.default_speech_api_key.clone()), None),
        };

        // Audio left over from a discarded session is tracked but not loaded,
        // so the first persist removes it.
        let restoring = last_written.is_some();
        let mut stored_audio = HashMap::new();
        for t in Arc::make_mut(&mut state.translations).iter_mut() {
            match storage.read_audio(&options.key, &t.config_id) {
                Ok(Some(audio)) => {
                    stored_audio.insert(t.config_id.clone(), audio.clone());
                    if restoring {
                        t.voice_file = Some(audio);
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("store: could not read audio of '{}': {e}", t.config_id),
            }
        }

        if state.speech_api_key.is_empty() {
            state.speech_api_key = options.default_speech_api_key.clone();
        }

        let mut store = Self {
            state,
            storage,
            key: options.key,
            expected_password: options.expected_password,
            tickets: TicketBook::new(),
            last_written,
            stored_audio,
            persist_error: None,
        };
        store.persist();
        store
    }

    /// Read access to the whole state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Apply `action`; persists when the state changed.  Returns whether it
    /// changed.
    pub fn dispatch(&mut self, action: Action) -> bool {
        if action.replaces_translations() {
            self.tickets
                .retain(|t| !matches!(t, TaskTarget::Translation { .. }));
        }
        if action.replaces_images() {
            self.tickets.retain(|t| !matches!(t, TaskTarget::Image { .. }));
        }

        let next = reduce(&self.state, action);
        if next == self.state {
            return false;
        }
        self.state = next;

        let state = &self.state;
        self.tickets.retain(|target| match target {
            TaskTarget::Translation { config_id, .. } => state.translation(config_id).is_some(),
            TaskTarget::Image { id } => state.image(id).is_some(),
        });

        self.persist();
        true
    }

    /// Write the reduced snapshot and sync audio beside it.  Failures are
    /// logged and kept in [`persist_error`](Self::persist_error); the
    /// in-memory state is never rolled back.
    fn persist(&mut self) {
        let audio = self.sync_audio();
        let snapshot = self.write_snapshot();
        self.persist_error = snapshot.err().or(audio.err());
    }

    fn write_snapshot(&mut self) -> Result<(), StorageError> {
        let encoded = match encode_snapshot(&self.state) {
            Ok(encoded) => encoded,
            Err(e) => {
                log::warn!("store: failed to encode snapshot: {e}");
                return Ok(());
            }
        };
        if self.last_written.as_deref() == Some(encoded.as_str()) {
            return Ok(());
        }
        match self.storage.write(&self.key, &encoded) {
            Ok(()) => {
                self.last_written = Some(encoded);
                Ok(())
            }
            Err(e) => {
                log::warn!("store: failed to persist snapshot '{}': {e}", self.key);
                Err(e)
            }
        }
    }

    /// Store changed audio and drop audio that no longer exists.  Entries
    /// that fail are retried on the next persist.
    fn sync_audio(&mut self) -> Result<(), StorageError> {
        let mut result = Ok(());

        for t in self.state.translations.iter() {
            let Some(audio) = &t.voice_file else { continue };
            if self.stored_audio.get(&t.config_id) == Some(audio) {
                continue;
            }
            match self.storage.write_audio(&self.key, &t.config_id, Some(audio.as_str())) {
                Ok(()) => {
                    self.stored_audio.insert(t.config_id.clone(), audio.clone());
                }
                Err(e) => {
                    log::warn!("store: failed to store audio of '{}': {e}", t.config_id);
                    result = Err(e);
                }
            }
        }

        let state = &self.state;
        let gone: Vec<String> = self
            .stored_audio
            .keys()
            .filter(|id| state.translation(id).and_then(|t| t.voice_file.as_ref()).is_none())
            .cloned()
            .collect();
        for id in gone {
            match self.storage.write_audio(&self.key, &id, None) {
                Ok(()) => {
                    self.stored_audio.remove(&id);
                }
                Err(e) => {
                    log::warn!("store: failed to remove audio of '{id}': {e}");
                    result = Err(e);
                }
            }
        }

        result
    }

    /// The error of the latest persistence attempt, if it failed.  Changes
    /// made since the last successful write exist only in memory.
    pub fn persist_error(&self) -> Option<&StorageError> {
        self.persist_error.as_ref()
    }

    // -----------------------------------------------------------------------
    // Article
    // -----------------------------------------------------------------------

    pub fn set_article_id(&mut self, id: impl Into<String>) {
        self.dispatch(Action::SetArticleId(id.into()));
    }

    pub fn set_article_title(&mut self, title: impl Into<String>) {
        self.dispatch(Action::SetArticleTitle(title.into()));
    }

    pub fn set_article_content(&mut self, content: impl Into<String>) {
        self.dispatch(Action::SetArticleContent(content.into()));
    }

    pub fn set_article_url(&mut self, url: impl Into<String>) {
        self.dispatch(Action::SetArticleUrl(url.into()));
    }

    /// Clear the article and images; every translation becomes empty.
    pub fn reset_article(&mut self) {
        self.dispatch(Action::ResetArticle);
    }

    // -----------------------------------------------------------------------
    // Prompt configs
    // -----------------------------------------------------------------------

    pub fn add_text_config(&mut self, config: PromptConfig) -> bool {
        self.dispatch(Action::AddTextConfig(config))
    }

    pub fn update_text_config(&mut self, config: PromptConfig) -> bool {
        self.dispatch(Action::UpdateTextConfig(config))
    }

    pub fn delete_text_config(&mut self, id: &str) -> bool {
        self.dispatch(Action::DeleteTextConfig(id.to_string()))
    }

    pub fn set_image_prompt(&mut self, prompt: impl Into<String>) {
        self.dispatch(Action::SetImagePrompt(prompt.into()));
    }

    pub fn set_srt_prompt(&mut self, prompt: impl Into<String>) {
        self.dispatch(Action::SetSrtPrompt(prompt.into()));
    }

    pub fn set_metadata_prompt(&mut self, prompt: impl Into<String>) {
        self.dispatch(Action::SetMetadataPrompt(prompt.into()));
    }

    // -----------------------------------------------------------------------
    // Translations / images
    // -----------------------------------------------------------------------

    /// Replace the translation with the same `config_id`.  Unknown ids are
    /// silently ignored.
    pub fn update_translation(&mut self, translation: Translation) {
        self.dispatch(Action::UpdateTranslation(translation));
    }

    pub fn reset_translations(&mut self) {
        self.dispatch(Action::ResetTranslations);
    }

    pub fn add_image(&mut self, image: AppImage) {
        self.dispatch(Action::AddImage(image));
    }

    pub fn update_image(&mut self, image: AppImage) {
        self.dispatch(Action::UpdateImage(image));
    }

    pub fn remove_image(&mut self, id: &str) -> bool {
        self.dispatch(Action::RemoveImage(id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Voice / credentials / auth
    // -----------------------------------------------------------------------

    pub fn update_voice_settings(&mut self, patch: VoiceSettingsPatch) {
        self.dispatch(Action::UpdateVoiceSettings(patch));
    }

    pub fn set_speech_api_key(&mut self, key: impl Into<String>) {
        self.dispatch(Action::SetSpeechApiKey(key.into()));
    }

    /// Compare `password` with the expected one.  With none configured any
    /// input succeeds.  A failed attempt leaves the flag untouched.
    pub fn login(&mut self, password: &str) -> bool {
        let accepted = match &self.expected_password {
            None => true,
            Some(expected) => password == expected,
        };
        if accepted {
            self.dispatch(Action::SetAuthenticated(true));
        } else {
            log::info!("store: login rejected");
        }
        accepted
    }

    pub fn logout(&mut self) {
        self.dispatch(Action::SetAuthenticated(false));
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated
    }

    // -----------------------------------------------------------------------
    // Project import / export
    // -----------------------------------------------------------------------

    /// Merge a project file into the session.  Malformed input is rejected
    /// before anything changes.
    pub fn load_project(&mut self, raw: &str) -> Result<(), SnapshotError> {
        let patch = decode_project(raw)?;
        self.dispatch(Action::LoadProject(patch));
        Ok(())
    }

    /// The project file for the current session (audio stripped).
    pub fn export_project(&self) -> Result<String, SnapshotError> {
        encode_snapshot(&self.state)
    }

    // -----------------------------------------------------------------------
    // Generation tasks
    // -----------------------------------------------------------------------

    /// Mark `target` busy and issue its ticket.  `None` when the entity does
    /// not exist.
    pub fn begin_task(&mut self, target: TaskTarget) -> Option<Ticket> {
        match &target {
            TaskTarget::Translation { config_id, kind } => {
                let mut busy = self.state.translation(config_id)?.clone();
                busy.in_progress.set(*kind, true);
                self.dispatch(Action::UpdateTranslation(busy));
            }
            TaskTarget::Image { id } => {
                let mut busy = self.state.image(id)?.clone();
                busy.is_generating = true;
                self.dispatch(Action::UpdateImage(busy));
            }
        }
        Some(self.tickets.issue(target))
    }

    /// Apply a finished translation task.  The in-progress flag is cleared
    /// and `apply` runs against the translation as it is *now*.
    ///
    /// Returns `false`, changing nothing, when the ticket is stale or the
    /// translation is gone.
    pub fn finish_translation(
        &mut self,
        ticket: &Ticket,
        apply: impl FnOnce(&mut Translation),
    ) -> bool {
        let TaskTarget::Translation { config_id, kind } = ticket.target() else {
            return false;
        };
        if !self.accept(ticket) {
            return false;
        }
        let mut updated = match self.state.translation(config_id) {
            Some(t) => t.clone(),
            None => return false,
        };
        updated.in_progress.set(*kind, false);
        apply(&mut updated);
        self.dispatch(Action::UpdateTranslation(updated));
        true
    }

    /// Image counterpart of [`finish_translation`](Self::finish_translation).
    pub fn finish_image(&mut self, ticket: &Ticket, apply: impl FnOnce(&mut AppImage)) -> bool {
        let TaskTarget::Image { id } = ticket.target() else {
            return false;
        };
        if !self.accept(ticket) {
            return false;
        }
        let mut updated = match self.state.image(id) {
            Some(i) => i.clone(),
            None => return false,
        };
        updated.is_generating = false;
        apply(&mut updated);
        self.dispatch(Action::UpdateImage(updated));
        true
    }

    fn accept(&mut self, ticket: &Ticket) -> bool {
        if !self.tickets.is_current(ticket) {
            log::debug!("store: discarding stale result for {}", ticket.target());
            return false;
        }
        self.tickets.retire(ticket);
        true
    }
}

// ---------------------------------------------------------------------------
// SharedStore
// ---------------------------------------------------------------------------

/// Thread-safe handle to a [`Store`].
pub type SharedStore = Arc<Mutex<Store>>;

pub fn new_shared_store(store: Store) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Lock `store`, recovering the guard if a previous holder panicked.
///
/// Every store method leaves the state consistent before returning, so a
/// poisoned lock still guards a valid state.
pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
