//! fastocr command-line entry point.
//!
//! Settings come from `--config`, else the platform config file if it
//! exists, else built-in defaults; `FASTOCR_*` variables override them.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use fastocr::config::{default_config_path, load_settings};
use fastocr::telemetry::{init_logging, DEFAULT_FILTER};
use fastocr::{
    parse_languages, JobStatus, OcrEngine, OcrMyPdf, OcrService, Settings, StateStore,
};

#[derive(Parser)]
#[command(name = "fastocr", version, about = "OCR PDF documents with ocrmypdf")]
struct Cli {
    /// Path to a JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// OCR one or more PDF files and print the resulting job records
    Ocr {
        /// PDF files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// OCR language, repeatable or `+` joined (e.g. -l eng -l fra, -l eng+fra)
        #[arg(short, long = "lang", default_value = "eng")]
        languages: Vec<String>,
    },
    /// Show the stored state of a job
    Status {
        /// Job UUID
        id: Uuid,
    },
    /// Purge expired or incomplete jobs from the work directory
    Sweep,
    /// Print the OCR engine version
    Version,
}

fn load(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => load_settings(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => load_settings(&path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => Settings::default(),
        },
    };
    settings.apply_env().context("applying FASTOCR_* overrides")?;
    if cli.log_json {
        settings.log_json = true;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let settings = load(&cli)?;
    init_logging(DEFAULT_FILTER, settings.log_json)?;

    match cli.command {
        Commands::Ocr { files, languages } => run_ocr(settings, files, languages).await,
        Commands::Status { id } => {
            let settings = settings.resolve()?;
            let store = StateStore::new(&settings.workdir);
            match store.find(id)? {
                Some(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("Job {} not found", id);
                    Ok(ExitCode::from(2))
                }
            }
        }
        Commands::Sweep => {
            let settings = settings.resolve()?;
            let kept = StateStore::new(&settings.workdir).reconcile(chrono::Utc::now())?;
            println!("{} jobs kept in {}", kept.len(), settings.workdir.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => {
            let engine = OcrMyPdf::from_settings(&settings);
            println!("{}", engine.version().await?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_ocr(
    settings: Settings,
    files: Vec<PathBuf>,
    languages: Vec<String>,
) -> anyhow::Result<ExitCode> {
    let languages = parse_languages(&languages)?;
    let service = OcrService::from_settings(settings).await?;

    let (interrupt_tx, mut interrupt_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(true);
    })
    .context("installing Ctrl-C handler")?;

    let mut ids = Vec::with_capacity(files.len());
    for file in &files {
        match service.submit_file(languages.clone(), file).await {
            Ok(record) => {
                info!("Submitted {} as job {}", file.display(), record.id);
                ids.push(record.id);
            }
            Err(e) => warn!("Skipping {}: {}", file.display(), e),
        }
    }

    let mut failed = ids.len() < files.len();
    let wait_all = async {
        let mut records = Vec::with_capacity(ids.len());
        for id in &ids {
            records.push(service.wait(*id).await);
        }
        records
    };

    tokio::select! {
        records = wait_all => {
            for record in records {
                match record {
                    Ok(record) => {
                        failed |= record.status != JobStatus::Done;
                        println!("{}", serde_json::to_string_pretty(&record)?);
                    }
                    Err(e) => {
                        failed = true;
                        eprintln!("{}", e);
                    }
                }
            }
        }
        _ = interrupt_rx.changed() => {
            warn!("Interrupted, waiting for running OCR jobs");
            failed = true;
        }
    }

    service.shutdown().await;
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
