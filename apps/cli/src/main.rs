use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{info, warn, LevelFilter};
use reqwest::Client;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::path::PathBuf;

use mod_sync_core::{
    ClientConfig, HttpBackend, JobRequest, LocalSettings, ModTarget, ModelCatalog, NewProject,
    ProjectResolver, ProviderCredentials, Resolution, ResolverMode, RouteDecision, RunError,
    Session, SettingsReconciler, SyncClient, TranslationProvider, UploadSource,
};

#[derive(Parser)]
#[command(name = "mod-sync")]
#[command(about = "Run remote mod translation jobs and sync the results", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the backend URL from the config file
    #[arg(long, global = true)]
    backend: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a translation job and follow it to completion
    Translate {
        #[arg(long)]
        mod_path: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        mod_id: Option<String>,
        #[arg(short, long, default_value = "google")]
        provider: String,
        /// Save the packaged archive here when the job finishes
        #[arg(long)]
        save_to: Option<PathBuf>,
    },
    /// Find, create, or enter the sync project to use
    #[command(subcommand)]
    Projects(ProjectsCommand),
    /// Push a mod and its translation to the sync project
    Upload {
        #[arg(long)]
        mod_path: String,
        #[arg(long)]
        translation_path: Option<String>,
        #[arg(long)]
        project: Option<u64>,
    },
    /// Pull translations from the sync project into a local mod
    Download {
        #[arg(long)]
        dest: String,
        #[arg(long)]
        project: Option<u64>,
    },
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Print the effective client config
    Config {
        /// Write the effective config back to disk
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand)]
enum ProjectsCommand {
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    Create {
        name: String,
    },
    /// Pick a project id and store it in settings
    Select {
        id: String,
        /// Accept the id without checking the project list
        #[arg(long)]
        manual: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    /// Set the sync token and toggles, then save to the backend
    Sync {
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        enable: Option<bool>,
        #[arg(long)]
        auto_upload: Option<bool>,
    },
    /// List the models a provider offers
    Models {
        #[arg(short, long)]
        provider: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.clone().or_else(ClientConfig::default_path);
    let mut config = match &config_path {
        Some(path) => ClientConfig::load_from_file(path).map_err(anyhow::Error::msg)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = cli.backend {
        config.backend_url = url;
    }

    let http = Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("failed to build HTTP client")?;
    let reconciler = SettingsReconciler::new(http.clone(), config.backend_url.clone());

    match cli.command {
        Command::Translate {
            mod_path,
            name,
            mod_id,
            provider,
            save_to,
        } => {
            let provider = TranslationProvider::try_from(provider.as_str())
                .map_err(anyhow::Error::msg)?;
            let settings = load_settings(&reconciler).await;
            let target = ModTarget {
                path: mod_path,
                name,
                id: mod_id,
            };
            translate(&config, settings, &target, provider, save_to).await
        }
        Command::Projects(command) => {
            let settings = load_settings(&reconciler).await;
            let sync = sync_client(&http, &config, &settings);
            projects(command, sync, settings, &reconciler).await
        }
        Command::Upload {
            mod_path,
            translation_path,
            project,
        } => {
            let settings = load_settings(&reconciler).await;
            let sync = sync_client(&http, &config, &settings);
            let source = UploadSource {
                mod_path,
                translation_path,
            };
            let project = match project {
                Some(id) => Some(id),
                None => settings.sync_project()?,
            };
            let report = sync.upload(project, &source).await?;
            println!("Uploaded {} file(s)", report.uploaded_count);
            for failure in &report.errors {
                println!("  rejected {}: {}", failure.file, failure.error);
            }
            Ok(())
        }
        Command::Download { dest, project } => {
            let settings = load_settings(&reconciler).await;
            let sync = sync_client(&http, &config, &settings);
            let project = match project {
                Some(id) => Some(id),
                None => settings.sync_project()?,
            };
            let report = sync.download(project, &dest).await?;
            println!("Synced {} file(s) into {}", report.files_synced, dest);
            Ok(())
        }
        Command::Settings(SettingsCommand::Show) => {
            let settings = load_settings(&reconciler).await;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Command::Settings(SettingsCommand::Sync {
            token,
            enable,
            auto_upload,
        }) => {
            let mut settings = load_settings(&reconciler).await;
            if let Some(token) = token {
                settings.sync_token = token;
            }
            if let Some(enable) = enable {
                settings.enable_sync = enable;
            }
            if let Some(auto_upload) = auto_upload {
                settings.auto_upload_sync = auto_upload;
            }
            save_settings(&reconciler, &settings).await?;
            println!("Settings saved");
            Ok(())
        }
        Command::Settings(SettingsCommand::Models { provider }) => {
            let provider = TranslationProvider::try_from(provider.as_str())
                .map_err(anyhow::Error::msg)?;
            let settings = load_settings(&reconciler).await;
            let catalog = ModelCatalog::new(http.clone(), config.backend_url.clone());
            let models = catalog
                .list(provider, &ProviderCredentials::from_settings(&settings))
                .await?;
            if models.is_empty() {
                println!("No models reported for {provider}");
            }
            for model in models {
                println!("{model}");
            }
            Ok(())
        }
        Command::Config { save } => {
            println!("{}", config.to_json().map_err(anyhow::Error::msg)?);
            if save {
                let path = config_path.context("no config directory on this platform")?;
                config.save_to_file(&path).map_err(anyhow::Error::msg)?;
                println!("Saved to {}", path.display());
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    // Only fails if a logger is already installed.
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

/// Backend settings, falling back to the local cache when it is unreachable.
async fn load_settings(reconciler: &SettingsReconciler) -> LocalSettings {
    let cache = ClientConfig::settings_cache_path();
    match reconciler.load().await {
        Ok(settings) => {
            if let Some(path) = &cache {
                if let Err(error) = settings.write_cache(path) {
                    warn!("{}", error);
                }
            }
            settings
        }
        Err(error) => {
            warn!("could not load settings from backend: {}", error);
            cache
                .and_then(LocalSettings::read_cache)
                .unwrap_or_default()
        }
    }
}

async fn save_settings(
    reconciler: &SettingsReconciler,
    settings: &LocalSettings,
) -> anyhow::Result<LocalSettings> {
    let stored = reconciler
        .save(settings)
        .await
        .context("failed to save settings")?;
    if let Some(path) = ClientConfig::settings_cache_path() {
        if let Err(error) = stored.write_cache(path) {
            warn!("{}", error);
        }
    }
    Ok(stored)
}

fn sync_client(http: &Client, config: &ClientConfig, settings: &LocalSettings) -> SyncClient {
    SyncClient::new(
        http.clone(),
        config.backend_url.clone(),
        Some(settings.sync_token.clone()),
    )
}

async fn translate(
    config: &ClientConfig,
    settings: LocalSettings,
    target: &ModTarget,
    provider: TranslationProvider,
    save_to: Option<PathBuf>,
) -> anyhow::Result<()> {
    let request = JobRequest::from_settings(&settings, target, provider);
    let mut session =
        Session::from_config(config, settings).context("failed to set up the backend client")?;

    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let progress = |snapshot: &mod_sync_core::ProgressSnapshot| {
        info!(
            "{:>3}% files {}/{} entries {}/{} {}",
            snapshot.percent,
            snapshot.processed_files,
            snapshot.total_files,
            snapshot.entries_translated,
            snapshot.total_entries,
            snapshot.current_file
        );
    };

    let outcome = match session.run_job(&request, progress, cancel).await {
        Ok(outcome) => outcome,
        Err(RunError::Cancelled(job_id)) => {
            println!("Stopped following job {job_id}; it keeps running on the backend");
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    match &outcome.decision {
        RouteDecision::AutoSync { project_id } => match &outcome.upload {
            Some(Ok(report)) => println!(
                "Uploaded {} file(s) to project {}",
                report.uploaded_count,
                project_id.map_or_else(|| "?".to_string(), |id| id.to_string())
            ),
            Some(Err(error)) => println!("Auto-upload failed: {error}"),
            None => {}
        },
        RouteDecision::NoArtifact => println!("Job finished without a result to package"),
        RouteDecision::Package { .. } => {}
    }

    match &outcome.package {
        Some(Ok(reference)) => {
            println!("Archive ready: {}", reference.url);
            if let Some(destination) = save_to {
                let backend = HttpBackend::new(config.backend_url.clone(), config.request_timeout())
                    .context("failed to set up the backend client")?;
                let bytes = backend
                    .download_archive(&reference.task_id, &reference.archive_path, &destination)
                    .await?;
                println!("Saved {} ({} bytes)", destination.display(), bytes);
            }
        }
        Some(Err(error)) => println!("Packaging failed: {error}"),
        None => {}
    }

    if outcome.shutdown_requested {
        println!("Auto-shutdown was requested; power off the host yourself if you still want it");
    }
    Ok(())
}

async fn projects(
    command: ProjectsCommand,
    sync: SyncClient,
    mut settings: LocalSettings,
    reconciler: &SettingsReconciler,
) -> anyhow::Result<()> {
    let mut resolver = ProjectResolver::open(sync);

    match command {
        ProjectsCommand::List { search } => {
            resolver.refresh().await?;
            if let Some(query) = search {
                resolver.set_search(query);
            }
            let visible = resolver.visible_projects();
            if visible.is_empty() {
                println!("No projects found");
            }
            for project in visible {
                let visibility = if project.is_public { "public" } else { "private" };
                println!("{:>8}  {:<8} {}", project.id, visibility, project.name);
            }
            return Ok(());
        }
        ProjectsCommand::Create { name } => {
            resolver.switch_mode(ResolverMode::Create);
            let project = NewProject::new(
                name,
                settings.source_language.clone(),
                settings.target_language.clone(),
            );
            let created = resolver.create(&project).await?;
            println!("Created project {} ({})", created.id, created.name);
        }
        ProjectsCommand::Select { id, manual } => {
            if manual {
                resolver.submit_manual(&id)?;
            } else {
                let project_id = mod_sync_core::projects::parse_manual_id(&id)?;
                resolver.refresh().await?;
                resolver.select(project_id)?;
            }
        }
    }

    match resolver.finish() {
        Resolution::Selected(project_id) => {
            settings.sync_project_id = project_id.to_string();
            save_settings(reconciler, &settings).await?;
            println!("Sync project set to {project_id}");
            Ok(())
        }
        Resolution::Abandoned => bail!("no project selected"),
    }
}
