//! sheet-omr CLI: grade answer-sheet photographs and write a JSON report.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{info, LevelFilter};
use sheet_omr::{
    grade_files, grade_files_with_decoder, BatchEntry, GradeConfig, GradeReport, PageGrading,
    SheetGrader, StaticMetadataDecoder,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "sheet-omr")]
#[command(about = "Grade photographed multiple-choice answer sheets")]
#[command(version)]
struct Cli {
    /// JSON configuration (parameters, report path, annotation directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the JSON report (overrides the config).
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write boundary and answer overlays as PNG into this directory.
    #[arg(long)]
    annotate_dir: Option<PathBuf>,

    /// Metadata payload applied to every page, e.g. "EXAM-1,1,30;".
    #[arg(long)]
    metadata: Option<String>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Log level: off, error, warn, info, debug, trace.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines (requires the `tracing` feature).
    #[arg(long)]
    json_logs: bool,

    /// Input images.
    #[arg(required_unless_present = "print_config")]
    images: Vec<PathBuf>,
}

#[cfg(feature = "tracing")]
fn init_json_logs(cli: &Cli) -> bool {
    if cli.json_logs {
        sheet_omr::core::init_tracing(true);
    }
    cli.json_logs
}

#[cfg(not(feature = "tracing"))]
fn init_json_logs(cli: &Cli) -> bool {
    if cli.json_logs {
        eprintln!("warning: --json-logs needs the `tracing` feature; using plain logs");
    }
    false
}

fn init_logging(cli: &Cli) {
    if init_json_logs(cli) {
        return;
    }
    let raw = match &cli.log_level {
        Some(level) => Some(level.clone()),
        None => std::env::var(sheet_omr::core::LOG_ENV_VAR).ok(),
    };
    let level = sheet_omr::core::parse_level(raw.as_deref(), LevelFilter::Warn);
    if let Err(err) = sheet_omr::core::init_with_level(level) {
        eprintln!("warning: logger already installed: {err}");
    }
}

fn effective_config(cli: &Cli) -> CliResult<GradeConfig> {
    let mut cfg = match &cli.config {
        Some(path) => GradeConfig::load_json(path)?,
        None => GradeConfig::default(),
    };
    if let Some(report) = &cli.report {
        cfg.report_path = Some(report.display().to_string());
    }
    if let Some(dir) = &cli.annotate_dir {
        cfg.annotate_dir = Some(dir.display().to_string());
    }
    if let Some(payload) = &cli.metadata {
        cfg.metadata_payload = Some(payload.clone());
    }
    if cfg.annotate_dir.is_some() {
        cfg.params.annotate = true;
    }
    Ok(cfg)
}

fn summary_line(page: &PageGrading) -> String {
    let answers: String = page.answers().iter().map(|a| a.to_string()).collect();
    let mut line = format!(
        "{} rows={} undetermined={} boundary={:?}",
        if answers.is_empty() { "-" } else { answers.as_str() },
        page.row_count(),
        page.undetermined_count(),
        page.boundary.source
    );
    if let Some(meta) = &page.metadata {
        line.push_str(&format!(
            " code={} questions={}..={}",
            meta.code, meta.first_question, meta.last_question
        ));
    } else if let Some(err) = &page.metadata_error {
        line.push_str(&format!(" metadata_error=\"{err}\""));
    }
    line
}

fn write_overlays(dir: &Path, entry: &BatchEntry) -> CliResult<()> {
    let Ok(page) = &entry.outcome else {
        return Ok(());
    };
    let Some(overlays) = &page.overlays else {
        return Ok(());
    };
    let stem = entry
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    overlays
        .boundary
        .save(dir.join(format!("{stem}_boundary.png")))?;
    overlays
        .answers
        .save(dir.join(format!("{stem}_answers.png")))?;
    Ok(())
}

fn run(cli: &Cli) -> CliResult<bool> {
    let cfg = effective_config(cli)?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(true);
    }

    let grader = SheetGrader::new(cfg.params.clone())?;
    let entries = match &cfg.metadata_payload {
        Some(payload) => {
            let decoder = StaticMetadataDecoder::new(payload.clone());
            grade_files_with_decoder(&grader, &cli.images, &decoder)
        }
        None => grade_files(&grader, &cli.images),
    };

    if let Some(dir) = &cfg.annotate_dir {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)?;
        for entry in &entries {
            write_overlays(&dir, entry)?;
        }
    }

    for entry in &entries {
        match &entry.outcome {
            Ok(page) => println!("{}: {}", entry.path.display(), summary_line(page)),
            Err(err) => println!("{}: ERROR {err}", entry.path.display()),
        }
    }

    let report = GradeReport::from_batch(grader.params(), &entries);
    let report_path = cfg.report_path();
    report.write_json(&report_path)?;
    info!("report written to {}", report_path.display());

    Ok(report.failed_count() == 0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
