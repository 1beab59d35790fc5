//! Article adapter: rewrites a news article into several audience-specific
//! variants and derives narration, subtitles, metadata and illustrative
//! images from them.
//!
//! * [`store`] holds the session state, persists it and arbitrates results.
//! * [`services`] talks to the generation APIs.
//! * [`tasks`] runs generation against the store.
//! * [`artifacts`] writes downloadable files.
//! * [`config`] loads `settings.toml`.

pub mod artifacts;
pub mod config;
pub mod services;
pub mod store;
pub mod tasks;
