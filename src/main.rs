// diplomaker: Generate one diploma PDF per spreadsheet row

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use diplomaker::batch::{BatchObserver, BatchState, Orchestrator, Session};
use diplomaker::binder::{format_date, FieldBinder};
use diplomaker::delivery::DirectorySink;
use diplomaker::error::{DiplomaError, RowFailure};
use diplomaker::fonts::FontRegistry;
use diplomaker::render::PdfRenderer;
use diplomaker::template::{load_field_edits, Template};

/// Exit code when the batch finished but some rows failed
const EXIT_ROW_FAILURES: i32 = 3;

/// CLI Arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Generate personalized diplomas from a spreadsheet")]
struct Args {
    /// Spreadsheet with one row per diploma (.xlsx or .xls)
    #[arg(short = 'i', long)]
    data: PathBuf,

    /// Directory the PDFs are written to
    #[arg(short, long, default_value = "diplomas")]
    output_dir: PathBuf,

    /// Background image (file path or URL)
    #[arg(short, long)]
    background: Option<String>,

    /// Template layout JSON (defaults to the built-in diploma layout)
    #[arg(short, long)]
    template: Option<String>,

    /// Directory containing andalus.ttf and algerian-regular.ttf
    #[arg(long)]
    font_dir: Option<PathBuf>,

    /// JSON file with fields to add to the template
    #[arg(long)]
    fields: Option<String>,

    /// Constant field value applied to every diploma (NAME=VALUE, repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    constants: Vec<(String, String)>,

    /// Date printed as todayDate (YYYY-MM-DD format, defaults to today)
    #[arg(short, long)]
    date: Option<String>,

    /// Seconds to wait for each document to render (0 waits forever)
    #[arg(long, default_value = "60")]
    render_timeout: u64,

    /// Seconds to wait for each font or background download
    #[arg(long, default_value = "30")]
    font_timeout: u64,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    env_logger::init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32, DiplomaError> {
    let args = Args::parse();

    let pinned_date = parse_date(&args.date)?;
    let fetch_timeout = seconds(args.font_timeout);

    // Load template and background
    let mut template = match &args.template {
        Some(path) => Template::from_file(path)?,
        None => Template::diploma(),
    };
    if let Some(background) = &args.background {
        template.load_background(background, fetch_timeout)?;
    }

    let registry = match &args.font_dir {
        Some(dir) => FontRegistry::diploma(dir),
        None => FontRegistry::builtin(),
    }
    .with_timeout(fetch_timeout);

    let mut session = Session::new(template, registry);
    if let Some(date) = pinned_date {
        session = session.with_binder(FieldBinder::new(date));
    }

    // Operator edits
    if let Some(path) = &args.fields {
        for edit in load_field_edits(path)? {
            session.apply_field_edit(&edit)?;
        }
    }
    for (name, value) in &args.constants {
        session.constants.set(name.clone(), value.clone());
    }

    let count = session.load_records(&args.data)?;
    println!("Uploaded file: {}", args.data.display());
    println!("Total rows: {}", count);

    let mut orchestrator = Orchestrator::new(session, Arc::new(PdfRenderer::default()))
        .with_render_timeout(seconds(args.render_timeout));
    let mut sink = DirectorySink::new(&args.output_dir);
    let mut console = ConsoleProgress;

    let summary = orchestrator.generate_all(&mut sink, &mut console)?;

    println!();
    for path in sink.written() {
        println!("✓ Generated: {}", path.display());
    }
    println!("  Batch: {}", summary.batch_id);
    println!("  Date: {}", format_date(summary.date));
    println!("  Generated: {} of {}", summary.generated, summary.total);

    if summary.is_success() {
        return Ok(0);
    }

    eprintln!("  Failed rows: {}", summary.failed());
    for failure in summary.failures() {
        eprintln!("    {}", failure);
    }
    Ok(EXIT_ROW_FAILURES)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `None` leaves the date to the batch, which reads the clock when it starts.
fn parse_date(date_str: &Option<String>) -> Result<Option<NaiveDate>, DiplomaError> {
    date_str
        .as_ref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| DiplomaError::Date(s.clone())))
        .transpose()
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Prints a single updating progress line
struct ConsoleProgress;

impl BatchObserver for ConsoleProgress {
    fn on_progress(&mut self, state: &BatchState) {
        print!("\rGenerating PDFs... {}% Complete", state.progress);
        let _ = std::io::stdout().flush();
    }

    fn on_row_failed(&mut self, failure: &RowFailure) {
        eprintln!("\nError generating PDF for row {}: {}", failure.row, failure.error);
    }
}
