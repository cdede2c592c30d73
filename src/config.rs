use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::downloader::{DEFAULT_TAIL_LINES, Supervisor};
use crate::model::{ContainerFormat, DownloadType, Quality};

/// Environment variable naming a settings file
pub const CONFIG_ENV: &str = "YT_DOWNLOADER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// User settings; every key is optional in the file
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Fetcher executable, looked up on PATH when relative
    pub fetcher: PathBuf,
    /// Arguments placed before every planned command line
    pub fetcher_args: Vec<String>,
    /// Destination preselected in the form
    pub download_dir: PathBuf,
    pub quality: Quality,
    pub format: ContainerFormat,
    pub download_type: DownloadType,
    /// Trailing output lines kept for failure reports
    pub tail_lines: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let fetcher = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
        Self {
            fetcher: PathBuf::from(fetcher),
            fetcher_args: Vec::new(),
            download_dir: default_download_dir(),
            quality: Quality::Best,
            format: ContainerFormat::Mp4,
            download_type: DownloadType::Video,
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

impl Settings {
    /// Loads `path`, else the file named by `YT_DOWNLOADER_CONFIG`, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) => PathBuf::from(path),
                None => return Ok(Self::default()),
            },
        };
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        info!("Loaded settings from {}", path.display());
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(&self.fetcher)
            .with_base_args(self.fetcher_args.clone())
            .with_tail_lines(self.tail_lines)
    }
}

/// `~/Downloads`, or the current directory when no home is known
pub fn default_download_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn reads_every_key() {
        let settings = Settings::from_toml(
            r#"
            fetcher = "/opt/bin/python3"
            fetcher_args = ["-m", "yt_dlp"]
            download_dir = "/srv/media"
            quality = "1080p"
            format = "mkv"
            download_type = "audio"
            tail_lines = 50
            "#,
        )
        .unwrap();
        assert_eq!(settings.fetcher, PathBuf::from("/opt/bin/python3"));
        assert_eq!(settings.fetcher_args, vec!["-m", "yt_dlp"]);
        assert_eq!(settings.download_dir, PathBuf::from("/srv/media"));
        assert_eq!(settings.quality, Quality::Height(1080));
        assert_eq!(settings.format, ContainerFormat::Mkv);
        assert_eq!(settings.download_type, DownloadType::AudioOnly);
        assert_eq!(settings.tail_lines, 50);
    }

    #[test]
    fn picker_labels_are_accepted() {
        let settings = Settings::from_toml(r#"quality = "4K (2160p)""#).unwrap();
        assert_eq!(settings.quality, Quality::Height(2160));
    }

    #[test]
    fn rejects_unknown_keys_and_values() {
        assert!(matches!(
            Settings::from_toml("colour = \"red\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(Settings::from_toml("format = \"avi\"").is_err());
        assert!(Settings::from_toml("quality = \"ultra\"").is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/settings.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
