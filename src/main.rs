//! Main application for the YouTube Downloader GUI

// Command-line flags and subcommands
mod cli;
// Settings file and defaults
mod config;
// Fetcher process supervision
mod downloader;
// Metadata-only query
mod info;
// Data models for requests, events and outcomes
mod model;
// Request to command-line planning
mod planner;
// Progress parsing utilities
mod progress;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use eframe::{App, Frame, egui};
use egui::Visuals;
use env_logger::Env;
use log::{error, info, warn};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use tokio::{runtime::Runtime, sync::oneshot};

use cli::{Cli, Command, DownloadArgs};
use config::Settings;
use downloader::{JobHandle, Supervisor, check_fetcher};
use info::{InfoError, VideoInfo, fetch_info};
use model::{
    ContainerFormat, DownloadTask, DownloadType, JobOutcome, ProgressEvent, Quality, RequestSpec,
};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Program entry point: parses flags, then runs a subcommand or the window
fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut settings);

    let runtime = match RUNTIME.get_or_try_init(Runtime::new) {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Could not start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match &cli.command {
        Some(Command::Download(args)) => runtime.block_on(run_download(&settings, args)),
        Some(Command::Info { url }) => runtime.block_on(run_info(&settings, url)),
        None => run_window(runtime, settings),
    }
}

/// Headless download: prints raw output, Ctrl-C cancels
async fn run_download(settings: &Settings, args: &DownloadArgs) -> ExitCode {
    let request = match args.to_request(settings) {
        Ok(request) => request,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let argv = planner::plan(&request);
    info!(
        "Starting download with command: {} {}",
        settings.fetcher.display(),
        argv.join(" ")
    );

    let mut job = settings.supervisor().run(argv);
    if let Some(pid) = job.pid() {
        info!("Fetcher running as pid {pid}");
    }
    let canceller = job.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling download");
            canceller.cancel();
        }
    });

    while let Some(event) = job.next_event().await {
        if let ProgressEvent::RawLine(line) = event {
            println!("{line}");
        }
    }

    let outcome = job.wait().await;
    if outcome.is_success() {
        info!("Download completed!");
    } else if let JobOutcome::Failure { reason, .. } = &outcome {
        error!("Download failed: {reason}");
    }
    match outcome.exit_code() {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(code.clamp(1, 255) as u8),
        None => ExitCode::FAILURE,
    }
}

async fn run_info(settings: &Settings, url: &str) -> ExitCode {
    match fetch_info(&settings.supervisor(), url).await {
        Ok(info) => {
            print!("{info}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            if let InfoError::Failed { last_lines, .. } = &err {
                for line in last_lines {
                    eprintln!("{line}");
                }
            }
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run_window(runtime: &'static Runtime, settings: Settings) -> ExitCode {
    // Configure default native options for egui window
    let options = eframe::NativeOptions::default();
    // Run the application
    let result = eframe::run_native(
        "YouTube Downloader",
        options,
        Box::new(move |cc| {
            // Use dark theme visuals
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp::new(runtime, settings))
        }),
    );
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Window error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Application state for the GUI
struct DownloaderApp {
    runtime: &'static Runtime,
    supervisor: Supervisor,
    /// Input field for the video URL
    url_input: String,
    /// Destination folder for downloads
    download_folder: String,
    selected_quality: Quality,
    selected_format: ContainerFormat,
    download_type: DownloadType,
    /// Status line under the progress bar
    status: String,
    /// Accumulated fetcher output
    output: String,
    /// Last started download, kept after it finishes for its progress value
    task: Option<DownloadTask>,
    /// Running download, at most one
    job: Option<JobHandle>,
    /// Pending metadata query
    info_rx: Option<oneshot::Receiver<Result<VideoInfo, InfoError>>>,
    /// Pending startup `--version` check
    check_rx: Option<oneshot::Receiver<Result<String, downloader::FetcherCheckError>>>,
}

impl DownloaderApp {
    fn new(runtime: &'static Runtime, settings: Settings) -> Self {
        let supervisor = settings.supervisor();

        let (check_tx, check_rx) = oneshot::channel();
        let probe = supervisor.clone();
        runtime.spawn(async move {
            let _ = check_tx.send(check_fetcher(&probe).await);
        });

        Self {
            runtime,
            supervisor,
            url_input: String::new(),
            download_folder: settings.download_dir.display().to_string(),
            selected_quality: settings.quality,
            selected_format: settings.format,
            download_type: settings.download_type,
            status: "Ready".to_owned(),
            output: String::new(),
            task: None,
            job: None,
            info_rx: None,
            check_rx: Some(check_rx),
        }
    }

    fn log_output(&mut self, message: &str) {
        self.output.push_str(message);
        if !message.ends_with('\n') {
            self.output.push('\n');
        }
    }

    fn start_download(&mut self) {
        let request = match RequestSpec::validated(
            &self.url_input,
            &self.download_folder,
            self.download_type,
            self.selected_quality,
            self.selected_format,
        ) {
            Ok(request) => request,
            Err(err) => {
                self.status = err.to_string();
                return;
            }
        };

        let argv = planner::plan(&request);
        let command = format!(
            "{} {}",
            self.supervisor.program().to_string_lossy(),
            argv.join(" ")
        );
        self.log_output(&format!("Starting download with command: {command}"));

        // Supervisor::run spawns its worker on the ambient runtime
        let _guard = self.runtime.enter();
        self.job = Some(self.supervisor.run(argv));
        self.task = Some(DownloadTask::new(request));
        self.status = "Downloading...".to_owned();
    }

    fn start_info(&mut self) {
        let url = self.url_input.trim().to_owned();
        if url.is_empty() {
            self.status = model::RequestError::EmptyUrl.to_string();
            return;
        }
        self.status = "Getting video info...".to_owned();
        self.log_output(&format!("Getting info for: {url}"));

        let (tx, rx) = oneshot::channel();
        let supervisor = self.supervisor.clone();
        self.runtime.spawn(async move {
            let _ = tx.send(fetch_info(&supervisor, &url).await);
        });
        self.info_rx = Some(rx);
    }

    fn clear_fields(&mut self) {
        self.url_input.clear();
        self.output.clear();
        if self.job.is_none() {
            self.task = None;
        }
        self.status = "Ready".to_owned();
    }

    /// Drains whatever the workers produced since the last frame
    fn poll_jobs(&mut self) {
        if let Some(rx) = self.check_rx.as_mut() {
            match rx.try_recv() {
                Ok(Ok(version)) => {
                    self.check_rx = None;
                    self.log_output(&format!("yt-dlp {version} found and ready to use!"));
                }
                Ok(Err(err)) => {
                    self.check_rx = None;
                    warn!("{err}");
                    self.log_output("WARNING: yt-dlp not found!");
                    self.log_output("Please install yt-dlp using: pip install yt-dlp");
                    self.log_output("Or download from: https://github.com/yt-dlp/yt-dlp\n");
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => self.check_rx = None,
            }
        }

        if let Some(rx) = self.info_rx.as_mut() {
            match rx.try_recv() {
                Ok(Ok(info)) => {
                    self.info_rx = None;
                    self.log_output(&format!("{info}\n"));
                    self.status = "Info retrieved successfully".to_owned();
                }
                Ok(Err(err)) => {
                    self.info_rx = None;
                    if let InfoError::Failed { last_lines, .. } = &err {
                        for line in last_lines {
                            self.log_output(line);
                        }
                    }
                    self.log_output(&format!("Error getting video info: {err}"));
                    self.status = match err {
                        InfoError::Incomplete(_) => "Info retrieval incomplete".to_owned(),
                        InfoError::Failed { .. } => "Error getting info".to_owned(),
                    };
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => self.info_rx = None,
            }
        }

        let Some(job) = self.job.as_mut() else {
            return;
        };
        let mut lines = Vec::new();
        while let Some(event) = job.try_next_event() {
            if let Some(task) = self.task.as_mut() {
                if let Some(line) = task.apply(event) {
                    lines.push(line);
                }
            }
        }
        let outcome = job.try_outcome();
        for line in lines {
            self.log_output(&line);
        }

        if let Some(outcome) = outcome {
            self.job = None;
            if let Some(task) = self.task.as_mut() {
                task.finish(&outcome);
                self.status = task.status.to_string();
                info!("{}: {}", task.request.url, self.status);
            }
            match outcome {
                JobOutcome::Success => self.log_output("Download completed!"),
                JobOutcome::Failure { reason, .. } => {
                    self.log_output(&format!("Download failed! ({reason})"))
                }
            }
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_jobs();

        egui::TopBottomPanel::bottom("output_panel")
            .resizable(true)
            .min_height(160.0)
            .show(ctx, |ui| {
                ui.label("Output:");
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        ui.monospace(self.output.as_str());
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("YouTube Downloader");

            ui.horizontal(|ui| {
                ui.label("Video URL:");
                ui.text_edit_singleline(&mut self.url_input);
            });

            // Folder selection
            ui.horizontal(|ui| {
                ui.label("Download Path:");
                ui.text_edit_singleline(&mut self.download_folder);
                if ui.button("Browse").clicked() {
                    if let Some(folder) = FileDialog::new()
                        .set_directory(&self.download_folder)
                        .pick_folder()
                    {
                        self.download_folder = folder.display().to_string();
                    }
                }
            });

            egui::ComboBox::from_label("Quality")
                .selected_text(self.selected_quality.to_string())
                .show_ui(ui, |ui| {
                    for q in Quality::all() {
                        ui.selectable_value(&mut self.selected_quality, q, q.to_string());
                    }
                });

            egui::ComboBox::from_label("Format")
                .selected_text(self.selected_format.to_string())
                .show_ui(ui, |ui| {
                    for f in ContainerFormat::ALL {
                        ui.selectable_value(&mut self.selected_format, f, f.to_string());
                    }
                });

            ui.horizontal(|ui| {
                ui.label("Download Type:");
                for kind in [DownloadType::Video, DownloadType::AudioOnly] {
                    ui.radio_value(&mut self.download_type, kind, kind.to_string());
                }
            });

            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(self.info_rx.is_none(), egui::Button::new("Get Info"))
                    .clicked()
                {
                    self.start_info();
                }
                if ui
                    .add_enabled(self.job.is_none(), egui::Button::new("Download"))
                    .clicked()
                {
                    self.start_download();
                }
                if ui
                    .add_enabled(self.job.is_some(), egui::Button::new("Cancel"))
                    .clicked()
                {
                    if let Some(job) = self.job.as_mut() {
                        job.cancel();
                    }
                }
                if ui.button("Clear").clicked() {
                    self.clear_fields();
                }
            });

            ui.add_space(8.0);
            let progress = self.task.as_ref().map_or(0.0, |t| t.progress / 100.0);
            ui.add(egui::ProgressBar::new(progress).show_percentage());
            ui.label(&self.status);
        });

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
