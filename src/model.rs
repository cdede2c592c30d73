use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Whether the fetcher should keep the video stream or extract audio only
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadType {
    /// Video with its best audio track
    #[default]
    Video,
    /// Audio extracted into an audio container
    #[serde(rename = "audio", alias = "audio_only")]
    AudioOnly,
}

impl fmt::Display for DownloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadType::Video => f.write_str("Video"),
            DownloadType::AudioOnly => f.write_str("Audio Only"),
        }
    }
}

/// Target quality tier for video downloads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Quality {
    /// Best available streams, no height bound
    #[default]
    Best,
    /// Worst available streams, no height bound
    Worst,
    /// Best streams whose height does not exceed the given number of lines
    Height(u32),
}

impl Quality {
    /// Height caps offered to the user, highest first
    pub const HEIGHTS: [u32; 9] = [4320, 2160, 1440, 1080, 720, 480, 360, 240, 144];

    /// Every selectable quality in the order the picker lists them
    pub fn all() -> Vec<Quality> {
        let mut all = vec![Quality::Best];
        all.extend(Self::HEIGHTS.iter().map(|&h| Quality::Height(h)));
        all.push(Quality::Worst);
        all
    }

    /// True for `Height(n)` when `n` is one of the offered caps
    pub fn is_supported(&self) -> bool {
        match self {
            Quality::Height(h) => Self::HEIGHTS.contains(h),
            _ => true,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => f.write_str("best"),
            Quality::Worst => f.write_str("worst"),
            Quality::Height(4320) => f.write_str("8K (4320p)"),
            Quality::Height(2160) => f.write_str("4K (2160p)"),
            Quality::Height(h) => write!(f, "{h}p"),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    /// Accepts the picker labels ("8K (4320p)", "720p", "best") as well as
    /// bare numbers ("1080")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "best" => return Ok(Quality::Best),
            "worst" => return Ok(Quality::Worst),
            _ => {}
        }
        // "8k (4320p)" -> "4320p"
        let inner = match (s.find('('), s.rfind(')')) {
            (Some(open), Some(close)) if open < close => &s[open + 1..close],
            _ => s.as_str(),
        };
        inner
            .trim()
            .trim_end_matches('p')
            .parse::<u32>()
            .map(Quality::Height)
            .map_err(|_| format!("unknown quality: {s}"))
    }
}

impl TryFrom<String> for Quality {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Container (file extension) of the finished download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Mp4,
    Webm,
    Mkv,
    Mp3,
    Wav,
    Flac,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 6] = [
        ContainerFormat::Mp4,
        ContainerFormat::Webm,
        ContainerFormat::Mkv,
        ContainerFormat::Mp3,
        ContainerFormat::Wav,
        ContainerFormat::Flac,
    ];

    /// Extension as the fetcher spells it
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Webm => "webm",
            ContainerFormat::Mkv => "mkv",
            ContainerFormat::Mp3 => "mp3",
            ContainerFormat::Wav => "wav",
            ContainerFormat::Flac => "flac",
        }
    }

    /// Audio-only containers usable as an extraction target
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            ContainerFormat::Mp3 | ContainerFormat::Wav | ContainerFormat::Flac
        )
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ContainerFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('.').to_ascii_lowercase();
        ContainerFormat::ALL
            .into_iter()
            .find(|f| f.extension() == s)
            .ok_or_else(|| format!("unknown format: {s}"))
    }
}

/// Everything needed to plan one download
#[derive(Clone, Debug, PartialEq)]
pub struct RequestSpec {
    /// Source URL, already trimmed and checked for emptiness
    pub url: String,
    /// Existing directory the file is written into
    pub destination_dir: PathBuf,
    pub download_type: DownloadType,
    pub quality: Quality,
    pub container_format: ContainerFormat,
}

/// Reasons a form cannot become a [`RequestSpec`]
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("Please enter a video URL")]
    EmptyUrl,
    #[error("Download path does not exist: {}", .0.display())]
    MissingDestination(PathBuf),
}

impl RequestSpec {
    /// Trims the URL and checks that it is non-empty and that the
    /// destination is an existing directory.
    pub fn validated(
        url: &str,
        destination_dir: impl Into<PathBuf>,
        download_type: DownloadType,
        quality: Quality,
        container_format: ContainerFormat,
    ) -> Result<Self, RequestError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RequestError::EmptyUrl);
        }
        let destination_dir = destination_dir.into();
        if !destination_dir.is_dir() {
            return Err(RequestError::MissingDestination(destination_dir));
        }
        Ok(Self {
            url: url.to_owned(),
            destination_dir,
            download_type,
            quality,
            container_format,
        })
    }
}

/// One unit of output from a running job
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// A line exactly as the fetcher printed it
    RawLine(String),
    /// Percentage parsed from the preceding raw line (0.0 to 100.0)
    PercentUpdate(f64),
}

/// Why a job did not succeed
#[derive(Clone, Debug, PartialEq)]
pub enum FailureReason {
    /// The fetcher ran and exited with a nonzero code
    Exited(i32),
    /// The fetcher was stopped by a signal it did not ask for
    Signalled,
    /// The fetcher could not be started at all
    SpawnFailed(String),
    /// The caller cancelled the job and the process was reaped
    Cancelled,
    /// The caller cancelled the job but the process could not be killed
    KillFailed(String),
    /// Reading output or waiting for exit failed
    Io(String),
    /// The worker went away without reporting
    Lost,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Exited(code) => write!(f, "exited with code {code}"),
            FailureReason::Signalled => f.write_str("terminated by signal"),
            FailureReason::SpawnFailed(err) => write!(f, "could not start fetcher: {err}"),
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::KillFailed(err) => write!(f, "cancel requested but kill failed: {err}"),
            FailureReason::Io(err) => write!(f, "I/O error: {err}"),
            FailureReason::Lost => f.write_str("worker stopped without reporting"),
        }
    }
}

/// Terminal result of a job, delivered once after its last event
#[derive(Clone, Debug, PartialEq)]
pub enum JobOutcome {
    Success,
    Failure {
        reason: FailureReason,
        /// Trailing raw lines, oldest first
        last_lines: Vec<String>,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }

    /// Exit code for `Exited` failures, `Some(0)` for success
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            JobOutcome::Success => Some(0),
            JobOutcome::Failure {
                reason: FailureReason::Exited(code),
                ..
            } => Some(*code),
            JobOutcome::Failure { .. } => None,
        }
    }
}

/// Represents the current state of a download
#[derive(Clone, Debug, PartialEq)]
pub enum DownloadStatus {
    /// Download is in progress
    Downloading,
    /// Download has completed successfully
    Done,
    /// Download or query ended without success
    Failed(String),
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::Downloading => f.write_str("Downloading..."),
            DownloadStatus::Done => f.write_str("Download completed successfully!"),
            DownloadStatus::Failed(why) => write!(f, "Download failed: {why}"),
        }
    }
}

/// Data structure for tracking the download shown in the UI
pub struct DownloadTask {
    /// Request the job was planned from
    pub request: RequestSpec,
    /// Current status of the download
    pub status: DownloadStatus,
    /// Progress percentage (0.0 to 100.0)
    pub progress: f32,
}

impl DownloadTask {
    pub fn new(request: RequestSpec) -> Self {
        Self {
            request,
            status: DownloadStatus::Downloading,
            progress: 0.0,
        }
    }

    /// Folds one event into the task; returns the raw line, if any, for the log view
    pub fn apply(&mut self, event: ProgressEvent) -> Option<String> {
        match event {
            ProgressEvent::RawLine(line) => Some(line),
            ProgressEvent::PercentUpdate(pct) => {
                self.progress = pct as f32;
                None
            }
        }
    }

    pub fn finish(&mut self, outcome: &JobOutcome) {
        self.status = match outcome {
            JobOutcome::Success => {
                self.progress = 100.0;
                DownloadStatus::Done
            }
            JobOutcome::Failure { reason, .. } => DownloadStatus::Failed(reason.to_string()),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_labels_parse_back() {
        for q in Quality::all() {
            assert_eq!(q.to_string().parse::<Quality>(), Ok(q));
        }
        assert_eq!("1080".parse::<Quality>(), Ok(Quality::Height(1080)));
        assert_eq!(" 4K (2160p) ".parse::<Quality>(), Ok(Quality::Height(2160)));
        assert!("ultra".parse::<Quality>().is_err());
    }

    #[test]
    fn unlisted_heights_are_not_supported() {
        assert!(Quality::Height(720).is_supported());
        assert!(!Quality::Height(1000).is_supported());
        assert!(Quality::Best.is_supported());
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("MKV".parse::<ContainerFormat>(), Ok(ContainerFormat::Mkv));
        assert_eq!(".flac".parse::<ContainerFormat>(), Ok(ContainerFormat::Flac));
        assert!("avi".parse::<ContainerFormat>().is_err());
        let audio: Vec<_> = ContainerFormat::ALL.into_iter().filter(|f| f.is_audio()).collect();
        assert_eq!(
            audio,
            vec![ContainerFormat::Mp3, ContainerFormat::Wav, ContainerFormat::Flac]
        );
    }

    #[test]
    fn validation_checks_url_and_destination() {
        let dir = std::env::temp_dir();
        let request = RequestSpec::validated(
            "  https://example.com/v  ",
            &dir,
            DownloadType::Video,
            Quality::Best,
            ContainerFormat::Mp4,
        )
        .unwrap();
        assert_eq!(request.url, "https://example.com/v");
        assert_eq!(request.destination_dir, dir);

        assert_eq!(
            RequestSpec::validated("   ", &dir, DownloadType::Video, Quality::Best, ContainerFormat::Mp4),
            Err(RequestError::EmptyUrl)
        );
        let missing = PathBuf::from("/nonexistent/downloads");
        assert_eq!(
            RequestSpec::validated("u", &missing, DownloadType::Video, Quality::Best, ContainerFormat::Mp4),
            Err(RequestError::MissingDestination(missing.clone()))
        );
    }

    #[test]
    fn task_tracks_percent_and_outcome() {
        let mut task = DownloadTask::new(RequestSpec {
            url: "https://example.com/v".into(),
            destination_dir: PathBuf::from("/tmp"),
            download_type: DownloadType::Video,
            quality: Quality::Best,
            container_format: ContainerFormat::Mp4,
        });
        assert_eq!(task.apply(ProgressEvent::PercentUpdate(12.5)), None);
        assert_eq!(task.progress, 12.5);
        assert_eq!(
            task.apply(ProgressEvent::RawLine("x".into())),
            Some("x".to_string())
        );
        task.finish(&JobOutcome::Success);
        assert_eq!(task.status, DownloadStatus::Done);
        assert_eq!(task.progress, 100.0);

        task.finish(&JobOutcome::Failure {
            reason: FailureReason::Exited(2),
            last_lines: vec![],
        });
        assert_eq!(
            task.status,
            DownloadStatus::Failed("exited with code 2".into())
        );
    }
}
