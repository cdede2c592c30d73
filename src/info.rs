//! Metadata query: title, duration and uploader without downloading.

use std::fmt;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use crate::downloader::Supervisor;
use crate::model::{FailureReason, JobOutcome, ProgressEvent};
use crate::planner::plan_info;

/// Fields printed by the fetcher for a single video
#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    pub title: String,
    /// Raw duration as printed, seconds or "NA"
    pub duration: String,
    pub uploader: String,
}

impl VideoInfo {
    /// Parses the printed duration; fractional seconds are accepted.
    pub fn parsed_duration(&self) -> Option<Duration> {
        self.duration
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

impl fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Title: {}", self.title)?;
        match self.parsed_duration() {
            Some(d) => {
                let secs = d.as_secs();
                writeln!(
                    f,
                    "Duration: {} ({}:{:02})",
                    self.duration,
                    secs / 60,
                    secs % 60
                )?;
            }
            None => writeln!(f, "Duration: {}", self.duration)?,
        }
        writeln!(f, "Uploader: {}", self.uploader)
    }
}

#[derive(Debug, Error)]
pub enum InfoError {
    #[error("fetcher {reason}")]
    Failed {
        reason: FailureReason,
        last_lines: Vec<String>,
    },
    #[error("Could not retrieve complete video info ({0} of 3 fields)")]
    Incomplete(usize),
}

/// Runs the metadata query for `url` and reads the first three output lines.
///
/// `WARNING:` and `ERROR:` diagnostics are logged and never taken as fields.
/// They still reach `last_lines` of a failure.
pub async fn fetch_info(supervisor: &Supervisor, url: &str) -> Result<VideoInfo, InfoError> {
    info!("Getting info for: {url}");
    let mut handle = supervisor.run(plan_info(url));

    let mut fields = Vec::with_capacity(3);
    while fields.len() < 3 {
        match handle.next_event().await {
            Some(ProgressEvent::RawLine(line)) if is_diagnostic(&line) => {
                warn!("{line}");
            }
            Some(ProgressEvent::RawLine(line)) => fields.push(line),
            Some(ProgressEvent::PercentUpdate(_)) => {}
            None => break,
        }
    }

    match handle.wait().await {
        JobOutcome::Success => {}
        JobOutcome::Failure { reason, last_lines } => {
            return Err(InfoError::Failed { reason, last_lines });
        }
    }

    let mut fields = fields.into_iter();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(title), Some(duration), Some(uploader)) => Ok(VideoInfo {
            title,
            duration,
            uploader,
        }),
        (a, b, _) => Err(InfoError::Incomplete(
            usize::from(a.is_some()) + usize::from(b.is_some()),
        )),
    }
}

fn is_diagnostic(line: &str) -> bool {
    line.starts_with("WARNING:") || line.starts_with("ERROR:")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn duration_parses_seconds() {
        let info = VideoInfo {
            title: "t".into(),
            duration: "212.5".into(),
            uploader: "u".into(),
        };
        assert_eq!(info.parsed_duration(), Some(Duration::from_millis(212_500)));
        let na = VideoInfo {
            duration: "NA".into(),
            ..info.clone()
        };
        assert_eq!(na.parsed_duration(), None);
        assert_eq!(info.to_string(), "Title: t\nDuration: 212.5 (3:32)\nUploader: u\n");
        assert_eq!(na.to_string(), "Title: t\nDuration: NA\nUploader: u\n");
    }

    // `sh -c <body> fetcher --print title ...`: the planned arguments land in
    // $1.. and the body ignores them
    fn fake_fetcher(body: &str) -> Supervisor {
        Supervisor::new("sh")
            .with_tail_lines(5)
            .with_base_args(vec!["-c".into(), body.into(), "fetcher".into()])
    }

    #[tokio::test]
    async fn reads_three_fields() {
        let supervisor = fake_fetcher("echo 'Some Title'; echo 212; echo 'Channel Name'");
        let info = fetch_info(&supervisor, "https://example.com/v").await.unwrap();
        assert_eq!(
            info,
            VideoInfo {
                title: "Some Title".into(),
                duration: "212".into(),
                uploader: "Channel Name".into(),
            }
        );
    }

    #[tokio::test]
    async fn short_output_is_incomplete() {
        let supervisor = fake_fetcher("echo 'Only Title'");
        let err = fetch_info(&supervisor, "u").await.unwrap_err();
        assert!(matches!(err, InfoError::Incomplete(1)));
    }

    #[tokio::test]
    async fn failing_fetcher_surfaces_reason() {
        let supervisor = fake_fetcher("echo 'ERROR: Unsupported URL' >&2; exit 1");
        match fetch_info(&supervisor, "u").await.unwrap_err() {
            InfoError::Failed { reason, last_lines } => {
                assert_eq!(reason, FailureReason::Exited(1));
                assert_eq!(last_lines, vec!["ERROR: Unsupported URL"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn warnings_are_not_fields() {
        let supervisor = fake_fetcher(
            "echo 'WARNING: falling back to generic extractor' >&2; echo T; echo 1; echo U",
        );
        let info = fetch_info(&supervisor, "u").await.unwrap();
        assert_eq!(info.title, "T");
        assert_eq!(info.duration, "1");
        assert_eq!(info.uploader, "U");
    }

    #[tokio::test]
    async fn empty_title_is_kept() {
        let supervisor = fake_fetcher("echo ''; echo 5; echo U");
        let info = fetch_info(&supervisor, "u").await.unwrap();
        assert_eq!(info.title, "");
        assert_eq!(info.duration, "5");
        assert_eq!(info.uploader, "U");
    }
}
