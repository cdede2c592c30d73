//! Command-line surface. Without a subcommand the window opens.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::model::{ContainerFormat, DownloadType, Quality, RequestError, RequestSpec};

#[derive(Debug, Parser)]
#[command(name = "yt_downloader", version, about = "Download videos and audio through yt-dlp")]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Fetcher executable, overrides the settings file
    #[arg(long, global = true)]
    pub fetcher: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download one URL and print the fetcher's output
    Download(DownloadArgs),
    /// Print title, duration and uploader without downloading
    Info {
        url: String,
    },
}

#[derive(Debug, clap::Args)]
pub struct DownloadArgs {
    pub url: String,

    /// Destination directory [default: from settings]
    #[arg(long, short)]
    pub dest: Option<PathBuf>,

    /// best, worst, or a height such as 1080p [default: from settings]
    #[arg(long, short)]
    pub quality: Option<Quality>,

    /// mp4, webm, mkv, mp3, wav or flac [default: from settings]
    #[arg(long, short)]
    pub format: Option<ContainerFormat>,

    /// Extract audio only
    #[arg(long, short)]
    pub audio: bool,
}

impl DownloadArgs {
    /// Fills unset flags from `settings` and validates the result
    pub fn to_request(&self, settings: &Settings) -> Result<RequestSpec, RequestError> {
        let download_type = if self.audio {
            DownloadType::AudioOnly
        } else {
            settings.download_type
        };
        RequestSpec::validated(
            &self.url,
            self.dest.clone().unwrap_or_else(|| settings.download_dir.clone()),
            download_type,
            self.quality.unwrap_or(settings.quality),
            self.format.unwrap_or(settings.format),
        )
    }
}

impl Cli {
    /// Applies command-line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(fetcher) = &self.fetcher {
            settings.fetcher = fetcher.clone();
        }
    }
}
