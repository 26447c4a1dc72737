use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use photo_drop_uploader::commands::{self, ConfigOverrides};
use photo_drop_uploader::config;
use photo_drop_uploader::errors::AppError;
use photo_drop_uploader::uploader::UploadEvent;

const BAR_WIDTH: usize = 30;

#[derive(Parser)]
#[command(name = "photo-drop-uploader")]
#[command(about = "Downsize images to fit and post them to a webhook")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload images one at a time, resizing any that are too big
    Upload {
        #[arg(required = true, help = "Image files to upload")]
        files: Vec<PathBuf>,

        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        #[command(flatten)]
        settings: SettingsArgs,
    },
    Reset,
}

#[derive(Args, Debug, Default)]
struct SettingsArgs {
    /// Webhook endpoint to post to
    #[arg(long)]
    webhook_url: Option<String>,

    /// Post into this thread
    #[arg(long)]
    thread_id: Option<String>,

    /// Per-file size limit in megabytes
    #[arg(long, value_name = "MB")]
    max_size_mb: Option<f64>,
}

impl From<SettingsArgs> for ConfigOverrides {
    fn from(args: SettingsArgs) -> Self {
        ConfigOverrides {
            webhook_url: args.webhook_url,
            thread_id: args.thread_id,
            max_file_size_mb: args.max_size_mb,
        }
    }
}

fn render_event(event: &UploadEvent) {
    match event {
        UploadEvent::Log(entry) => println!("{}", entry),
        UploadEvent::Progress(percent) => {
            let filled = BAR_WIDTH * (*percent as usize) / 100;
            println!(
                "[{}{}] {:>3}%",
                "#".repeat(filled),
                "-".repeat(BAR_WIDTH - filled),
                percent
            );
        }
        UploadEvent::ProgressReset => {}
        UploadEvent::Completed(summary) => {
            println!("{} sent, {} failed", summary.succeeded, summary.failed);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = config::load_config();
    let level = loaded
        .as_ref()
        .map(|c| c.log_level_filter())
        .unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Upload { files, settings } => {
            let saved = loaded.context("Failed to load configuration; `config reset` restores defaults")?;
            let config = ConfigOverrides::from(settings).apply(&saved);

            let summary = match commands::upload_files(&config, &files, render_event).await {
                Err(AppError::MissingEndpoint) => {
                    bail!("No webhook URL set. Pass --webhook-url or run `config set --webhook-url <URL>` first.")
                }
                other => other?,
            };

            if summary.failed > 0 {
                bail!("{} upload(s) failed", summary.failed);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => println!("{}", commands::show_config()?),
            ConfigAction::Set { settings } => {
                let config = commands::update_config(&settings.into())?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Reset => {
                commands::reset_config()?;
                println!("Configuration reset to defaults");
            }
        },
    }

    Ok(())
}
