//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\article-adapter\
//!   macOS:   ~/Library/Application Support/article-adapter/
//!   Linux:   ~/.config/article-adapter/
//!
//! Data dir (session snapshots, exported artifacts):
//!   Windows: %LOCALAPPDATA%\article-adapter\
//!   macOS:   ~/Library/Application Support/article-adapter/
//!   Linux:   ~/.local/share/article-adapter/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory holding one `<storage-key>.json` snapshot per session.
    pub session_dir: PathBuf,
    /// Default target directory for downloaded artifacts.
    pub downloads_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "article-adapter";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let session_dir = data_dir.join("sessions");
        let downloads_dir = data_dir.join("downloads");

        Self {
            config_dir,
            settings_file,
            session_dir,
            downloads_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.session_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths.session_dir.ends_with("sessions"));
    }
}
