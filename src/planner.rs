//! Turns a [`RequestSpec`] into the fetcher's command line.
//!
//! Argument order is fixed: output template, format or audio arguments,
//! optional merge format, URL last.

use crate::model::{ContainerFormat, DownloadType, Quality, RequestSpec};

/// Output file name pattern; the fetcher fills in title and extension
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

pub fn plan(request: &RequestSpec) -> Vec<String> {
    let mut args = vec![
        "-o".to_owned(),
        request
            .destination_dir
            .join(OUTPUT_TEMPLATE)
            .to_string_lossy()
            .into_owned(),
    ];

    match request.download_type {
        DownloadType::AudioOnly => {
            // non-audio containers silently become mp3
            let codec = if request.container_format.is_audio() {
                request.container_format
            } else {
                ContainerFormat::Mp3
            };
            args.push("-x".to_owned());
            args.push("--audio-format".to_owned());
            args.push(codec.extension().to_owned());
        }
        DownloadType::Video => {
            let ext = request.container_format.extension();
            args.push("-f".to_owned());
            args.push(format_selection(request.quality, ext));
            if request.container_format != ContainerFormat::Webm {
                args.push("--merge-output-format".to_owned());
                args.push(ext.to_owned());
            }
        }
    }

    args.push(request.url.clone());
    args
}

/// Builds the `/`-separated preference list for video downloads
pub fn format_selection(quality: Quality, ext: &str) -> String {
    match quality {
        Quality::Best => {
            format!("bestvideo[ext={ext}]+bestaudio/bestvideo+bestaudio/best[ext={ext}]/best")
        }
        Quality::Worst => format!("worstvideo[ext={ext}]+bestaudio/worstvideo+bestaudio/worst"),
        Quality::Height(h) if quality.is_supported() => format!(
            "bestvideo[height<={h}][ext={ext}]+bestaudio/bestvideo[height<={h}]+bestaudio/best[height<={h}]"
        ),
        Quality::Height(_) => format!("bestvideo[ext={ext}]+bestaudio/bestvideo+bestaudio/best"),
    }
}

/// Arguments for the metadata-only query: three printed fields, no download
pub fn plan_info(url: &str) -> Vec<String> {
    let mut args = Vec::new();
    for field in ["title", "duration", "uploader"] {
        args.push("--print".to_owned());
        args.push(field.to_owned());
    }
    args.push(url.to_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(download_type: DownloadType, quality: Quality, format: ContainerFormat) -> RequestSpec {
        RequestSpec {
            url: "https://www.youtube.com/watch?v=abc".into(),
            destination_dir: PathBuf::from("/home/me/Downloads"),
            download_type,
            quality,
            container_format: format,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn url_is_last_and_template_first() {
        for download_type in [DownloadType::Video, DownloadType::AudioOnly] {
            for quality in Quality::all() {
                for format in ContainerFormat::ALL {
                    let args = plan(&request(download_type, quality, format));
                    assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
                    assert_eq!(args[0], "-o");
                    assert_eq!(
                        PathBuf::from(&args[1]),
                        PathBuf::from("/home/me/Downloads/%(title)s.%(ext)s")
                    );
                }
            }
        }
    }

    #[test]
    fn audio_only_falls_back_to_mp3() {
        for format in ContainerFormat::ALL {
            let args = plan(&request(DownloadType::AudioOnly, Quality::Best, format));
            assert!(args.contains(&"-x".to_string()));
            let expected = if format.is_audio() { format.extension() } else { "mp3" };
            assert_eq!(value_after(&args, "--audio-format"), Some(expected));
            assert_eq!(value_after(&args, "-f"), None);
            assert_eq!(value_after(&args, "--merge-output-format"), None);
        }
    }

    #[test]
    fn height_cap_appears_in_every_alternative() {
        for h in Quality::HEIGHTS {
            let args = plan(&request(DownloadType::Video, Quality::Height(h), ContainerFormat::Mkv));
            let expr = value_after(&args, "-f").unwrap();
            let alternatives: Vec<_> = expr.split('/').collect();
            assert_eq!(alternatives.len(), 3);
            for alt in alternatives {
                assert!(alt.contains(&format!("[height<={h}]")), "{alt}");
            }
            assert!(expr.starts_with(&format!("bestvideo[height<={h}][ext=mkv]+bestaudio/")));
        }
    }

    #[test]
    fn best_and_worst_expressions() {
        let args = plan(&request(DownloadType::Video, Quality::Best, ContainerFormat::Mp4));
        assert_eq!(
            value_after(&args, "-f"),
            Some("bestvideo[ext=mp4]+bestaudio/bestvideo+bestaudio/best[ext=mp4]/best")
        );
        let args = plan(&request(DownloadType::Video, Quality::Worst, ContainerFormat::Webm));
        assert_eq!(
            value_after(&args, "-f"),
            Some("worstvideo[ext=webm]+bestaudio/worstvideo+bestaudio/worst")
        );
    }

    #[test]
    fn unlisted_height_uses_unconstrained_fallback() {
        assert_eq!(
            format_selection(Quality::Height(1000), "mp4"),
            "bestvideo[ext=mp4]+bestaudio/bestvideo+bestaudio/best"
        );
    }

    #[test]
    fn merge_format_unless_webm() {
        for quality in Quality::all() {
            for format in ContainerFormat::ALL {
                let args = plan(&request(DownloadType::Video, quality, format));
                let merge = value_after(&args, "--merge-output-format");
                if format == ContainerFormat::Webm {
                    assert_eq!(merge, None);
                } else {
                    assert_eq!(merge, Some(format.extension()));
                }
            }
        }
    }

    #[test]
    fn full_vector_for_720p_mp4() {
        let args = plan(&request(DownloadType::Video, Quality::Height(720), ContainerFormat::Mp4));
        assert_eq!(&args[2..4], ["-f", "bestvideo[height<=720][ext=mp4]+bestaudio/bestvideo[height<=720]+bestaudio/best[height<=720]"]);
        assert_eq!(&args[4..], ["--merge-output-format", "mp4", "https://www.youtube.com/watch?v=abc"]);
    }

    #[test]
    fn info_query_prints_three_fields() {
        assert_eq!(
            plan_info("u"),
            ["--print", "title", "--print", "duration", "--print", "uploader", "u"]
        );
    }
}
