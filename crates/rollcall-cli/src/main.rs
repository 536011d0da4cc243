use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::registration::{CaptureEnd, Registrar, RegistrationReport, RegistrationRequest};
use rollcall_core::training::{train_model, TrainingReport};
use rollcall_core::{
    AttendanceStore, HeadlessPreview, IdentityDirectory, JobHandle, Preview, RegistrationLog,
    SessionController, SessionIo, SessionSummary, StopReason, SAMPLE_SIZE,
};
use rollcall_hw::Camera;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance register")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture face samples for a new person
    Register {
        /// Numeric id (becomes the recogniser label)
        #[arg(long)]
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Number of samples to capture
        #[arg(short, long)]
        count: Option<usize>,
    },
    /// Train the recognition model from the dataset
    Train,
    /// Take attendance until Ctrl-C (or ESC in the preview)
    Run,
    /// Show today's attendance
    Today {
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy the attendance table to DEST
    Export { dest: PathBuf },
    /// List registered people
    People,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Register { id, name, count } => register(config, id, name, count).await,
        Commands::Train => train(config).await,
        Commands::Run => run(config).await,
        Commands::Today { json } => today(&config, json),
        Commands::Export { dest } => {
            let store = AttendanceStore::new(&config.attendance_path);
            let rows = store
                .export_to(&dest)
                .with_context(|| format!("failed to export to {}", dest.display()))?;
            println!("Exported {rows} row(s) to {}", dest.display());
            Ok(())
        }
        Commands::People => people(&config),
    }
}

/// Await a job, cancelling it on Ctrl-C.
async fn supervise<T: Send + 'static>(job: JobHandle<T>) -> Result<T> {
    let cancel = job.cancel_token();
    let name = job.name().to_string();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(job = %name, "interrupt received, stopping");
            cancel.cancel();
        }
    });

    let result = job.wait().await;
    interrupt.abort();
    Ok(result?)
}

fn open_preview(config: &Config, title: &str) -> Result<Box<dyn Preview>> {
    if config.preview {
        Ok(rollcall_vision::open_preview(title)?)
    } else {
        Ok(Box::new(HeadlessPreview))
    }
}

async fn register(config: Config, id: String, name: String, count: Option<usize>) -> Result<()> {
    let request = RegistrationRequest {
        samples: count.unwrap_or(config.registration_images),
        ..RegistrationRequest::new(id, name)
    };
    let folder = request.folder_name()?;
    println!(
        "Registering {folder}: look at the camera ({} samples)...",
        request.samples
    );

    let job = JobHandle::spawn("register", move |cancel| -> Result<RegistrationReport> {
        let mut camera = Camera::open(&config.camera_device)?;
        let mut detector = rollcall_vision::load_detector(&config.cascade_path)?;
        let mut preview = open_preview(&config, "Registering")?;
        let registrar = Registrar::new(
            &config.dataset_dir,
            RegistrationLog::new(&config.registration_log_path),
            config.detection(),
            SAMPLE_SIZE,
        );
        Ok(registrar.capture(
            &request,
            &mut camera,
            detector.as_mut(),
            preview.as_mut(),
            &cancel,
        )?)
    })?;

    let report = supervise(job).await??;
    match report.ended {
        CaptureEnd::TargetReached => println!(
            "Captured {} images in {}",
            report.images,
            report.folder.display()
        ),
        CaptureEnd::Cancelled => println!(
            "Stopped early: {} images in {}",
            report.images,
            report.folder.display()
        ),
        CaptureEnd::CaptureFailed(e) => {
            println!("Camera failed after {} images: {e}", report.images)
        }
    }
    println!("Run `rollcall train` to update the model.");
    Ok(())
}

async fn train(config: Config) -> Result<()> {
    println!("Training model from {}...", config.dataset_dir.display());
    let job = JobHandle::spawn("train", move |_cancel| -> Result<TrainingReport> {
        let mut trainer = rollcall_vision::new_trainer()?;
        Ok(train_model(
            trainer.as_mut(),
            &config.dataset_dir,
            &config.model_path,
            SAMPLE_SIZE,
        )?)
    })?;

    let report = supervise(job).await??;
    println!(
        "Trained on {} images of {} people; model saved to {}",
        report.images,
        report.identities,
        report.model_path.display()
    );
    if report.skipped_files > 0 {
        println!("Skipped {} unreadable file(s)", report.skipped_files);
    }
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    if !config.model_path.exists() {
        anyhow::bail!("Model not found. Please train the model first.");
    }
    let directory = IdentityDirectory::scan(&config.dataset_dir)
        .with_context(|| format!("failed to read {}", config.dataset_dir.display()))?;
    println!(
        "Taking attendance for {} registered people. Press Ctrl-C or ESC to stop.",
        directory.len()
    );

    let job = JobHandle::spawn("session", move |cancel| -> Result<SessionSummary> {
        let mut camera = Camera::open(&config.camera_device)?;
        let mut detector = rollcall_vision::load_detector(&config.cascade_path)?;
        let mut recognizer = rollcall_vision::load_recognizer(&config.model_path)?;
        let mut preview = open_preview(&config, "Attendance")?;

        let mut controller = SessionController::new(
            config.session(),
            directory,
            AttendanceStore::new(&config.attendance_path),
        );
        Ok(controller.run(
            SessionIo {
                camera: &mut camera,
                detector: detector.as_mut(),
                recognizer: recognizer.as_mut(),
                preview: preview.as_mut(),
            },
            &cancel,
        ))
    })?;

    let summary = supervise(job).await??;
    println!(
        "Session ended: {} frames, {} faces, {} marked present",
        summary.frames, summary.faces, summary.marked
    );
    match summary.reason {
        StopReason::Cancelled | StopReason::AlreadyStopped => Ok(()),
        StopReason::CaptureFailed(e) => anyhow::bail!("camera failed: {e}"),
        StopReason::StoreUnavailable(e) => anyhow::bail!("attendance table unavailable: {e}"),
    }
}

fn today(config: &Config, json: bool) -> Result<()> {
    let date = chrono::Local::now().date_naive();
    let rows = AttendanceStore::new(&config.attendance_path).rows_on(date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No attendance marked today.");
        return Ok(());
    }
    println!("Attendance for {date}:");
    for row in &rows {
        println!("  {:<8} {:<24} {}", row.id, row.name, row.time.format("%H:%M:%S"));
    }
    Ok(())
}

fn people(config: &Config) -> Result<()> {
    let directory = IdentityDirectory::scan(&config.dataset_dir)
        .with_context(|| format!("failed to read {}", config.dataset_dir.display()))?;

    if directory.is_empty() {
        println!("No people registered in {}", config.dataset_dir.display());
    }
    for (label, identity) in directory.iter() {
        println!("  {label:<8} {}", identity.name);
    }
    for skipped in directory.skipped() {
        println!("  skipped {}: {}", skipped.name, skipped.reason);
    }
    Ok(())
}
