//! Application entry point: the `article-adapter` command line.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (defaults on first run) and apply env overrides.
//! 3. Open the session [`Store`] on a [`FileStorage`].
//! 4. Check the login gate, then run the requested command on a tokio
//!    runtime.
//! 5. Fail when the session could not be saved.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use article_adapter::{
    artifacts,
    config::{AppConfig, AppPaths},
    services::DataUri,
    store::{
        lock_store, new_shared_store, AppImage, FileStorage, PromptConfig, SharedStore, Store,
        StoreOptions, Translation, VoiceSettingsPatch,
    },
    tasks::{BatchPolicy, BatchReport, Generator, Models, Services, TaskOutcome},
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "article-adapter", version, about = "Adapt news articles into graded variants with narration, subtitles and images")]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the settings file with its current values.
    Init {
        /// Replace an existing settings file.
        #[arg(long)]
        force: bool,
    },
    /// Unlock the session.
    Login {
        #[arg(default_value = "")]
        password: String,
    },
    /// Lock the session.
    Logout,
    /// Show the article, variants and images.
    Status,
    /// Edit the source article.
    #[command(subcommand)]
    Article(ArticleCommand),
    /// Manage prompt configs and the singleton prompts.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Voice settings and credential.
    #[command(subcommand)]
    Voice(VoiceCommand),
    /// Manage source images.
    #[command(subcommand)]
    Image(ImageCommand),
    /// Run generation tasks.
    #[command(subcommand)]
    Generate(GenerateCommand),
    /// Write the project file, and optionally every artifact.
    Export {
        /// Project file to write; printed to stdout when omitted.
        path: Option<PathBuf>,
        /// Also write text, audio, subtitle and image files, by default into
        /// the downloads directory.
        #[arg(long = "artifacts", value_name = "DIR", num_args = 0..=1)]
        artifacts_dir: Option<Option<PathBuf>>,
    },
    /// Merge a project file into the session.
    Import { path: PathBuf },
}

#[derive(Debug, Subcommand)]
enum ArticleCommand {
    /// Set article fields.
    Set(ArticleFields),
    /// Fetch title and content from a URL.
    Crawl { url: String },
    /// Clear the article, images and every variant.
    Reset,
}

#[derive(Debug, Args)]
struct ArticleFields {
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long, conflicts_with = "content_file")]
    content: Option<String>,
    #[arg(long)]
    content_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// List prompt configs.
    List,
    Add {
        id: String,
        name: String,
        prompt: String,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
    },
    Delete { id: String },
    /// Set the image-variant prompt.
    ImagePrompt { prompt: String },
    /// Set the subtitle prompt.
    SubtitlePrompt { prompt: String },
    /// Set the metadata prompt.
    MetadataPrompt { prompt: String },
}

#[derive(Debug, Subcommand)]
enum VoiceCommand {
    Show,
    Update(VoiceFields),
    /// List voices available to the credential.
    List,
    /// Set the speech credential.
    Key { key: String },
    /// Override the playback speed of one variant.
    Speed { config_id: String, speed: f32 },
}

#[derive(Debug, Args)]
struct VoiceFields {
    #[arg(long)]
    voice_id: Option<String>,
    /// Voice for `[Speaker2]`; an empty value clears it.
    #[arg(long)]
    secondary_voice_id: Option<String>,
    #[arg(long)]
    language: Option<String>,
    #[arg(long)]
    stability: Option<f32>,
    #[arg(long)]
    playback_speed: Option<f32>,
    #[arg(long)]
    read_title: Option<bool>,
}

#[derive(Debug, Subcommand)]
enum ImageCommand {
    List,
    Add {
        file: PathBuf,
        #[arg(long)]
        id: Option<String>,
    },
    Remove { id: String },
}

#[derive(Debug, Subcommand)]
enum GenerateCommand {
    /// Adapt text for one config, or all with `--all`.
    Text(Target),
    Images {
        #[arg(long)]
        id: Option<String>,
    },
    Voice {
        #[command(flatten)]
        target: Target,
        /// Regenerate variants that already have audio.
        #[arg(long)]
        overwrite: bool,
    },
    Subtitles { config_id: String },
    Metadata(Target),
}

#[derive(Debug, Args)]
struct Target {
    #[arg(required_unless_present = "all")]
    config_id: Option<String>,
    #[arg(long)]
    all: bool,
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // 2. Configuration
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };
    if let Command::Init { force } = cli.command {
        return init_settings(&config, cli.config.as_deref(), force);
    }
    let config = config.with_env_overrides();

    // 3. Session store
    let storage = FileStorage::new(config.storage.resolved_dir())
        .with_quota(config.storage.quota_bytes);
    let store = Store::open(Box::new(storage), StoreOptions::from(&config));
    let store = new_shared_store(store);

    // 4. Login gate
    match &cli.command {
        Command::Login { password } => {
            if lock_store(&store).login(password) {
                ensure_saved(&store)?;
                println!("Logged in.");
                return Ok(());
            }
            bail!("incorrect password");
        }
        _ if !lock_store(&store).is_authenticated() => {
            bail!("not logged in; run `article-adapter login <password>` first");
        }
        _ => {}
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let generator = Generator::new(
        Arc::clone(&store),
        Services::from_config(&config),
        Models::from(&config),
    );
    let outcome = rt.block_on(run(cli.command, &generator, &store));

    // 5. Persistence
    ensure_saved(&store)?;
    outcome
}

/// Fail when the latest change to the session was not written.
fn ensure_saved(store: &SharedStore) -> Result<()> {
    match lock_store(store).persist_error() {
        Some(e) => bail!("changes were not saved: {e}"),
        None => Ok(()),
    }
}

/// Write `config` to `path`, or the platform settings file.  Environment
/// overrides are never written.
fn init_settings(config: &AppConfig, path: Option<&Path>, force: bool) -> Result<()> {
    let target = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppPaths::new().settings_file);
    if target.exists() && !force {
        bail!("{} already exists; pass --force to replace it", target.display());
    }
    match path {
        Some(path) => config.save_to(path)?,
        None => config.save()?,
    }
    println!("Settings written to {}", target.display());
    Ok(())
}

async fn run(command: Command, generator: &Generator, store: &SharedStore) -> Result<()> {
    match command {
        Command::Init { .. } | Command::Login { .. } => {}
        Command::Logout => {
            lock_store(store).logout();
            println!("Logged out.");
        }
        Command::Status => print_status(store),
        Command::Article(cmd) => run_article(cmd, generator, store).await?,
        Command::Config(cmd) => run_config(cmd, store)?,
        Command::Voice(cmd) => run_voice(cmd, generator, store).await?,
        Command::Image(cmd) => run_image(cmd, store)?,
        Command::Generate(cmd) => run_generate(cmd, generator).await?,
        Command::Export {
            path,
            artifacts_dir,
        } => {
            let store = lock_store(store);
            let project = store.export_project()?;
            match path {
                Some(path) => {
                    std::fs::write(&path, project)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Project written to {}", path.display());
                }
                None => println!("{project}"),
            }
            if let Some(dir) = artifacts_dir {
                let dir = dir.unwrap_or_else(|| AppPaths::new().downloads_dir);
                let written = artifacts::write_all(&dir, store.state())?;
                println!("{} artifacts written to {}", written.len(), dir.display());
            }
        }
        Command::Import { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            lock_store(store)
                .load_project(&raw)
                .with_context(|| format!("importing {}", path.display()))?;
            println!("Project loaded.");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn print_status(store: &SharedStore) {
    let store = lock_store(store);
    let state = store.state();

    println!("Article: {}", display_or_dash(&state.article.title));
    if let Some(id) = &state.article.id {
        println!("  id:  {id}");
    }
    if let Some(url) = &state.article.url {
        println!("  url: {url}");
    }
    println!("  {} characters", state.article.content.chars().count());

    println!("Variants:");
    for t in state.translations.iter() {
        let name = state
            .text_config(&t.config_id)
            .map(|c| c.name.as_str())
            .unwrap_or(&t.config_id);
        println!(
            "  {:<10} {:<24} text:{} audio:{} subs:{} meta:{}",
            t.config_id,
            name,
            mark(!t.content.is_empty()),
            mark(t.voice_file.is_some()),
            mark(t.subtitles.is_some()),
            mark(t.metadata.is_some()),
        );
    }

    println!("Images:");
    for image in state.images.iter() {
        println!("  {:<16} generated:{}", image.id, mark(image.generated.is_some()));
    }
}

fn mark(present: bool) -> &'static str {
    if present {
        "yes"
    } else {
        "-"
    }
}

fn display_or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

async fn run_article(cmd: ArticleCommand, generator: &Generator, store: &SharedStore) -> Result<()> {
    match cmd {
        ArticleCommand::Set(fields) => {
            let content = match (&fields.content, &fields.content_file) {
                (Some(c), _) => Some(c.clone()),
                (None, Some(path)) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("reading {}", path.display()))?,
                ),
                (None, None) => None,
            };
            let mut store = lock_store(store);
            if let Some(id) = fields.id {
                store.set_article_id(id);
            }
            if let Some(title) = fields.title {
                store.set_article_title(title);
            }
            if let Some(url) = fields.url {
                store.set_article_url(url);
            }
            if let Some(content) = content {
                store.set_article_content(content);
            }
        }
        ArticleCommand::Crawl { url } => {
            generator.crawl_article(&url).await?;
            println!("Article fetched from {url}");
        }
        ArticleCommand::Reset => {
            lock_store(store).reset_article();
            println!("Article reset.");
        }
    }
    Ok(())
}

fn run_config(cmd: ConfigCommand, store: &SharedStore) -> Result<()> {
    let mut store = lock_store(store);
    match cmd {
        ConfigCommand::List => {
            let state = store.state();
            for c in state.text_configs.iter() {
                println!("{} ({})\n  {}\n", c.id, c.name, c.prompt.replace('\n', "\n  "));
            }
            println!("image prompt:    {}", state.image_config.prompt);
            println!("subtitle prompt: {}", state.srt_config.prompt.replace('\n', " "));
            println!("metadata prompt: {}", state.metadata_config.prompt.replace('\n', " "));
        }
        ConfigCommand::Add { id, name, prompt } => {
            if !store.add_text_config(PromptConfig::new(&id, name, prompt)) {
                bail!("a config with id '{id}' already exists");
            }
        }
        ConfigCommand::Update { id, name, prompt } => {
            let Some(mut config) = store.state().text_config(&id).cloned() else {
                bail!("unknown config '{id}'");
            };
            if let Some(name) = name {
                config.name = name;
            }
            if let Some(prompt) = prompt {
                config.prompt = prompt;
            }
            store.update_text_config(config);
        }
        ConfigCommand::Delete { id } => {
            if !store.delete_text_config(&id) {
                bail!("unknown config '{id}'");
            }
        }
        ConfigCommand::ImagePrompt { prompt } => store.set_image_prompt(prompt),
        ConfigCommand::SubtitlePrompt { prompt } => store.set_srt_prompt(prompt),
        ConfigCommand::MetadataPrompt { prompt } => store.set_metadata_prompt(prompt),
    }
    Ok(())
}

async fn run_voice(cmd: VoiceCommand, generator: &Generator, store: &SharedStore) -> Result<()> {
    match cmd {
        VoiceCommand::Show => {
            let store = lock_store(store);
            let v = &store.state().voice_settings;
            println!("voice:       {}", v.voice_id);
            println!("secondary:   {}", v.secondary_voice_id.as_deref().unwrap_or("-"));
            println!("language:    {}", v.language);
            println!("stability:   {}", v.stability);
            println!("speed:       {}", v.playback_speed);
            println!("read title:  {}", v.read_title);
            println!("credential:  {}", mark(!store.state().speech_api_key.is_empty()));
        }
        VoiceCommand::Update(fields) => {
            lock_store(store).update_voice_settings(VoiceSettingsPatch {
                voice_id: fields.voice_id,
                secondary_voice_id: fields.secondary_voice_id,
                language: fields.language,
                stability: fields.stability,
                playback_speed: fields.playback_speed,
                read_title: fields.read_title,
            });
        }
        VoiceCommand::List => {
            let voices = generator.list_voices().await;
            if voices.is_empty() {
                println!("No voices available (check the speech credential).");
            }
            for v in voices {
                println!("{:<24} {}", v.id, v.name);
            }
        }
        VoiceCommand::Key { key } => lock_store(store).set_speech_api_key(key),
        VoiceCommand::Speed { config_id, speed } => {
            let mut store = lock_store(store);
            let Some(current) = store.state().translation(&config_id).cloned() else {
                bail!("unknown config '{config_id}'");
            };
            store.update_translation(Translation {
                speed: Some(speed),
                ..current
            });
        }
    }
    Ok(())
}

fn run_image(cmd: ImageCommand, store: &SharedStore) -> Result<()> {
    let mut store = lock_store(store);
    match cmd {
        ImageCommand::List => {
            for image in store.state().images.iter() {
                let uri = DataUri::parse_image(&image.original);
                println!(
                    "{:<16} {} generated:{}",
                    image.id,
                    uri.mime_type,
                    mark(image.generated.is_some())
                );
            }
        }
        ImageCommand::Add { file, id } => {
            let image = image_from_file(&file, id)?;
            let id = image.id.clone();
            store.add_image(image);
            println!("Added image '{id}'");
        }
        ImageCommand::Remove { id } => {
            if !store.remove_image(&id) {
                bail!("unknown image '{id}'");
            }
        }
    }
    Ok(())
}

fn image_from_file(path: &Path, id: Option<String>) -> Result<AppImage> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mime = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(DataUri::mime_for_extension)
        .unwrap_or(article_adapter::services::DEFAULT_IMAGE_MIME);
    let id = id.unwrap_or_else(|| {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        format!("img-{millis}")
    });
    Ok(AppImage::new(id, DataUri::from_bytes(mime, &bytes).to_string()))
}

async fn run_generate(cmd: GenerateCommand, generator: &Generator) -> Result<()> {
    match cmd {
        GenerateCommand::Text(target) => match target.config_id.filter(|_| !target.all) {
            Some(id) => report_one(&id, generator.adapt_text(&id).await)?,
            None => report_batch(generator.adapt_all().await?)?,
        },
        GenerateCommand::Images { id } => match id {
            Some(id) => report_one(&id, generator.generate_image(&id).await)?,
            None => report_batch(generator.generate_all_images().await)?,
        },
        GenerateCommand::Voice { target, overwrite } => {
            match target.config_id.filter(|_| !target.all) {
                Some(id) => report_one(&id, generator.synthesize_voice(&id).await)?,
                None => {
                    let policy = if overwrite {
                        BatchPolicy::Overwrite
                    } else {
                        BatchPolicy::SkipExisting
                    };
                    report_batch(generator.synthesize_all(policy).await)?
                }
            }
        }
        GenerateCommand::Subtitles { config_id } => {
            report_one(&config_id, generator.generate_subtitles(&config_id).await)?
        }
        GenerateCommand::Metadata(target) => match target.config_id.filter(|_| !target.all) {
            Some(id) => report_one(&id, generator.generate_metadata(&id).await)?,
            None => report_batch(generator.generate_all_metadata().await)?,
        },
    }
    Ok(())
}

fn report_one<E>(id: &str, result: std::result::Result<TaskOutcome, E>) -> Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let outcome = result.with_context(|| format!("'{id}' failed"))?;
    println!("{id}: {}", outcome_label(outcome));
    Ok(())
}

fn report_batch(report: BatchReport) -> Result<()> {
    let mut failures = 0;
    for (id, result) in report {
        match result {
            Ok(outcome) => println!("{id}: {}", outcome_label(outcome)),
            Err(e) => {
                failures += 1;
                println!("{id}: failed: {e}");
            }
        }
    }
    if failures > 0 {
        bail!("{failures} task(s) failed");
    }
    Ok(())
}

fn outcome_label(outcome: TaskOutcome) -> &'static str {
    match outcome {
        TaskOutcome::Applied => "done",
        TaskOutcome::Discarded => "discarded (superseded)",
        TaskOutcome::Skipped => "skipped",
    }
}
