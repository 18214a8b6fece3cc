use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rollcall::display::DisplaySink;
use rollcall::{Config, HeadlessSink, Overlay, RecognitionLoop, SessionError};
use rollcall_core::{
    encode_enrollment, load_enrollment, CsvLedger, DistanceMatcher, KnownFaces, Ledger, MarkOutcome,
    OnnxFaceEncoder,
};
use rollcall_hw::Camera;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollcall", about = "Webcam face-recognition attendance")]
struct Cli {
    /// Enrollment directory (one folder of photos per person)
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,
    /// Attendance CSV file
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode the dataset and take attendance from the camera
    Run {
        /// Never open a preview window, even when built with one
        #[arg(long)]
        headless: bool,
    },
    /// Encode the dataset only and report faces per person
    Encode {
        #[arg(long)]
        json: bool,
    },
    /// Mark attendance for a person by hand
    Mark {
        name: String,
    },
    /// Show attendance for a day
    Report {
        /// Day to show, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List V4L2 capture devices
    Devices,
}

#[derive(Serialize)]
struct EncodeReport {
    images: usize,
    encoded: usize,
    people: BTreeMap<String, usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dataset) = cli.dataset {
        config.dataset_dir = dataset;
    }
    if let Some(ledger) = cli.ledger {
        config.ledger_path = ledger;
    }

    match cli.command.unwrap_or(Commands::Run { headless: false }) {
        Commands::Run { headless } => run(&config, headless),
        Commands::Encode { json } => encode(&config, json),
        Commands::Mark { name } => {
            let name = name.to_uppercase();
            let mut ledger = CsvLedger::new(&config.ledger_path);
            match ledger.mark(&name)? {
                MarkOutcome::Recorded(record) => {
                    println!(
                        "✓ Attendance marked for {} on {} at {} ({})",
                        record.name,
                        record.date,
                        record.time,
                        ledger.path().display()
                    );
                }
                MarkOutcome::AlreadyMarked => {
                    println!("ℹ Attendance already marked for {name} today.");
                }
            }
            Ok(())
        }
        Commands::Report { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let ledger = CsvLedger::new(&config.ledger_path);
            let records = ledger.records_on(date)?;
            if records.is_empty() {
                println!(
                    "No attendance recorded on {date} in {}",
                    ledger.path().display()
                );
            }
            for record in records {
                println!("{:<24} {} {}", record.name, record.date, record.time);
            }
            Ok(())
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(())
        }
    }
}

fn load_encoder(config: &Config) -> Result<OnnxFaceEncoder> {
    Ok(OnnxFaceEncoder::load(&config.scrfd_model_path(), &config.arcface_model_path())?)
}

fn encode(config: &Config, json: bool) -> Result<()> {
    let enrollment = load_enrollment(&config.dataset_dir);
    let known = if enrollment.is_empty() {
        KnownFaces::default()
    } else {
        encode_enrollment(&mut load_encoder(config)?, &enrollment)?
    };

    let mut people: BTreeMap<String, usize> =
        enrollment.classes().into_iter().map(|c| (c.to_string(), 0)).collect();
    for label in known.labels() {
        *people.entry(label.to_string()).or_default() += 1;
    }
    let report = EncodeReport {
        images: enrollment.len(),
        encoded: known.len(),
        people,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} of {} images encoded", report.encoded, report.images);
        for (name, count) in &report.people {
            println!("  {name}: {count}");
        }
    }
    Ok(())
}

fn run(config: &Config, headless: bool) -> Result<()> {
    let enrollment = load_enrollment(&config.dataset_dir);
    if enrollment.is_empty() {
        // Nothing to recognise; skip model loading.
        report_precondition(config, &SessionError::NoKnownFaces);
        return Ok(());
    }

    let mut encoder = load_encoder(config)?;
    let known = encode_enrollment(&mut encoder, &enrollment)?;
    tracing::info!(faces = known.len(), "known faces encoded");

    let mut session = RecognitionLoop::new(
        &known,
        encoder,
        CsvLedger::new(&config.ledger_path),
        DistanceMatcher {
            tolerance: config.match_tolerance,
        },
        config.match_threshold,
        Overlay::with_font_file(&config.font_path),
    );

    let camera = match session.start(|| Camera::open(&config.camera_device)) {
        Ok(camera) => camera,
        Err(e @ (SessionError::NoKnownFaces | SessionError::SourceUnavailable(_))) => {
            report_precondition(config, &e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(
        device = %camera.device_path,
        format = ?camera.pixel_format(),
        width = camera.width,
        height = camera.height,
        "capturing"
    );

    let mut display = open_display(config, headless)?;
    let summary = session.run(camera, display.as_mut())?;

    let marked = if summary.credited.is_empty() {
        "nobody".to_string()
    } else {
        summary.credited.join(", ")
    };
    println!(
        "Session ended ({:?}) after {} frames; marked: {marked}",
        summary.stop, summary.frames
    );
    Ok(())
}

fn report_precondition(config: &Config, error: &SessionError) {
    match error {
        SessionError::NoKnownFaces => {
            eprintln!("Error: {error}");
            eprintln!(
                "Put photos in {}/<PersonName>/ (one folder per person, .png/.jpg/.jpeg).",
                config.dataset_dir.display()
            );
        }
        _ => {
            eprintln!("Error: {error}");
            eprintln!(
                "Check that {} exists and is not in use (see `rollcall devices`).",
                config.camera_device
            );
        }
    }
}

#[cfg(feature = "window")]
fn open_display(config: &Config, headless: bool) -> Result<Box<dyn DisplaySink>> {
    if headless {
        return Ok(Box::new(HeadlessSink::with_ctrlc(config.preview_path.clone())?));
    }
    Ok(Box::new(rollcall::WindowSink::open(rollcall::WINDOW_TITLE)?))
}

#[cfg(not(feature = "window"))]
fn open_display(config: &Config, headless: bool) -> Result<Box<dyn DisplaySink>> {
    if !headless {
        tracing::debug!("built without the window feature; running headless");
    }
    println!("Running headless; press Ctrl-C to stop.");
    Ok(Box::new(HeadlessSink::with_ctrlc(config.preview_path.clone())?))
}
