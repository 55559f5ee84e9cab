//! Command-line surface: argument parsing and one handler per subcommand.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::api::{ApiClient, ClientConfig};
use crate::app::{ImportTarget, ModOrganizer};
use crate::application::DownloadEvent;
use crate::domain::modlist::ModlistFormat;
use crate::domain::{AppError, DownloadPhase};
use crate::settings::SettingsStore;

const SIGHT_NOTICE: &str = "Please note: sights are temperamental and may not work. \
     Reloading the game can fix them, but their function cannot be guaranteed.";

/// Mod Organizer - collect and install War Thunder user mods
#[derive(Parser, Debug)]
#[command(
    name = "mod-organizer",
    version,
    about = "Collect War Thunder camouflage, mission and sight mods and install them into the game folders"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (trace level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Settings file path
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Select the game root and production folders
    Folders {
        /// War Thunder root folder
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Production folder (required for sight mods)
        #[arg(long, value_name = "DIR")]
        production: Option<PathBuf>,
    },

    /// Queue the download link of a mod post
    Add {
        /// Url of the post page. Defaults to the portal feed, which is also
        /// the base for relative links in a saved page.
        page_url: Option<String>,

        /// Read page markup from a saved file instead of fetching it
        #[arg(long, value_name = "FILE")]
        html: Option<PathBuf>,
    },

    /// Show the mod list
    List,

    /// Select or deselect the mod at position N
    Toggle { index: usize },

    /// Remove the mod at position N
    Remove { index: usize },

    /// Empty the mod list
    Clear,

    /// Download and install every selected mod
    Download,

    /// Show every installed mod grouped by category
    Modlist,

    /// Write the master list to a text modlist
    Export { file: PathBuf },

    /// Read a modlist (.txt, or legacy JSON)
    Import {
        file: PathBuf,

        /// Replace the master list instead of queueing the entries
        #[arg(long)]
        replace_master: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn log_level(&self) -> &'static str {
        if self.global.very_verbose {
            "trace"
        } else if self.global.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let path = match cli.global.settings {
        Some(path) => path,
        None => SettingsStore::default_path()?,
    };
    let store = SettingsStore::new(path);
    let settings = store
        .load()
        .with_context(|| format!("Failed to load settings from {}", store.path().display()))?;

    let client = ApiClient::new(ClientConfig::default()).context("Failed to build HTTP client")?;
    let mut organizer = ModOrganizer::new(client, settings);

    let result = execute(&mut organizer, cli.command).await;

    // A failed import still keeps the entries read before the error.
    let partial_import = matches!(
        &result,
        Err(e) if matches!(e.downcast_ref::<AppError>(), Some(AppError::Import(_)))
    );
    if partial_import || matches!(result, Ok(true)) {
        store.save(&organizer.to_settings())?;
        info!(path = %store.path().display(), "settings saved");
    }
    result.map(|_| ())
}

/// Returns whether persisted state changed.
async fn execute(organizer: &mut ModOrganizer, command: Commands) -> Result<bool> {
    match command {
        Commands::Folders { root, production } => {
            let folders = organizer.set_folders(root, production)?;
            println!("Skins:    {}", folders.user_skins.display());
            println!("Missions: {}", folders.user_missions.display());
            match &folders.sights_target {
                Some(sights) => println!("Sights:   {}", sights.display()),
                None => println!("Sights:   no production folder selected"),
            }
            Ok(true)
        }
        Commands::Add { page_url, html } => {
            let page_url =
                page_url.unwrap_or_else(|| organizer.api_client().config().home_url.clone());
            let markup = match html {
                Some(file) => fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?,
                None => organizer
                    .api_client()
                    .fetch_page(&page_url)
                    .await
                    .with_context(|| format!("Failed to load {}", page_url))?,
            };
            let added = organizer.add_from_page(&markup, &page_url)?;
            println!("Added {}", added.label());
            Ok(true)
        }
        Commands::List => {
            print_mod_list(organizer);
            Ok(false)
        }
        Commands::Toggle { index } => {
            let selected = organizer
                .toggle(position(index)?)
                .map_err(|_| AppError::NoSuchItem(index))?;
            println!("#{} {}", index, if selected { "selected" } else { "deselected" });
            Ok(true)
        }
        Commands::Remove { index } => {
            let removed = organizer
                .remove(position(index)?)
                .map_err(|_| AppError::NoSuchItem(index))?;
            println!("Removed {}", removed.label());
            Ok(true)
        }
        Commands::Clear => {
            organizer.clear();
            println!("Mod list cleared");
            Ok(true)
        }
        Commands::Download => {
            download(organizer).await?;
            Ok(true)
        }
        Commands::Modlist => {
            let entries = organizer.master_list();
            if entries.is_empty() {
                println!("No mods in master list yet.");
            } else {
                print!("{}", organizer.export_modlist());
                println!("\nTotal mods: {}", entries.len());
            }
            Ok(false)
        }
        Commands::Export { file } => {
            fs::write(&file, organizer.export_modlist())
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!("Modlist exported to {}", file.display());
            Ok(false)
        }
        Commands::Import {
            file,
            replace_master,
        } => {
            let input = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let target = if replace_master {
                ImportTarget::MasterList
            } else {
                ImportTarget::ModList
            };

            let count = organizer
                .import_modlist(&input, ModlistFormat::from_path(&file), target)
                .with_context(|| format!("Import of {} incomplete", file.display()))?;
            println!("Imported {} mods from {}", count, file.display());
            Ok(true)
        }
    }
}

/// 1-based list position to index.
fn position(index: usize) -> Result<usize> {
    index
        .checked_sub(1)
        .ok_or_else(|| AppError::NoSuchItem(index).into())
}

fn print_mod_list(organizer: &ModOrganizer) {
    if organizer.folders().is_none() {
        println!("No game folder selected; run `folders --root <DIR>` first");
    }
    let mods = organizer.mod_list();
    if mods.is_empty() {
        println!("Mod list is empty");
        return;
    }
    for (i, reference) in mods.iter().enumerate() {
        let mark = if reference.selected { "x" } else { " " };
        println!("{:>3}. [{}] {}", i + 1, mark, reference.label());
    }
}

async fn download(organizer: &mut ModOrganizer) -> Result<()> {
    let (mut stream, cancel) = organizer.start_download()?;

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current download");
            cancel.cancel();
        }
    });

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut failures = 0usize;
    while let Some(event) = stream.next().await {
        match &event {
            DownloadEvent::Progress {
                label,
                current,
                total,
            } => {
                bar.set_length(*total as u64);
                bar.set_position(*current as u64);
                bar.set_message(label.clone());
            }
            DownloadEvent::Finished(outcome) => {
                bar.inc(1);
                if outcome.success {
                    bar.println(format!("ok    {}", outcome.message));
                } else {
                    failures += 1;
                    bar.println(format!("FAIL  {}: {}", outcome.url, outcome.message));
                }
            }
            DownloadEvent::AllDone { cancelled: true } => {
                bar.abandon_with_message("Download cancelled");
            }
            DownloadEvent::AllDone { cancelled: false } => {
                bar.finish_with_message("All downloads finished!");
            }
        }
        organizer.update(&event);
    }
    interrupt.abort();

    if organizer.phase() == DownloadPhase::Cancelled {
        println!("Stopped before finishing; remaining mods are still selected");
    }

    if failures > 0 {
        println!("{} download(s) failed", failures);
    }
    if organizer.has_sight_mods() {
        println!("{}", SIGHT_NOTICE);
    }
    Ok(())
}
