//! pagesift command line
//!
//! Desktop front end for the same operations the browser session offers.
//! Reports are printed to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pagesift_core::export::{XmlExport, EXPORT_FILE_NAME};
use pagesift_core::{
    fixed_file_name, insert_archived_pages, parse_lines, parse_records, repair_xml,
    scan_balances, search_keywords, split_by_field, Archive, LazyText, SiftConfig,
    ARCHIVE_FILE_NAME, SPLIT_FILE_NAME,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pagesift")]
#[command(version, about = "Locate, extract and insert PDF pages by keyword")]
struct Args {
    /// JSON settings file; omitted fields take their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the first page containing each keyword into a zip archive
    Search {
        pdf: PathBuf,
        #[arg(short, long)]
        keyword: Vec<String>,
        /// File with one keyword per line
        #[arg(long)]
        keywords_file: Option<PathBuf>,
        #[arg(short, long, default_value = ARCHIVE_FILE_NAME)]
        out: PathBuf,
    },
    /// Collect the records whose field matches one of the values
    Split {
        pdf: PathBuf,
        /// Field label, e.g. "Account Number"
        #[arg(long)]
        key: String,
        #[arg(short, long)]
        value: Vec<String>,
        /// File with one value per line
        #[arg(long)]
        values_file: Option<PathBuf>,
        #[arg(short, long, default_value = SPLIT_FILE_NAME)]
        out: PathBuf,
    },
    /// Insert archived pages into a print document
    Insert {
        print: PathBuf,
        /// Zip written by `search`
        #[arg(long, default_value = ARCHIVE_FILE_NAME)]
        archive: PathBuf,
        #[arg(short, long)]
        keyword: Vec<String>,
        #[arg(long)]
        keywords_file: Option<PathBuf>,
        #[arg(short, long, default_value = "print_with_inserts.pdf")]
        out: PathBuf,
    },
    /// Report pages with negative opening or closing balances
    Balances { pdf: PathBuf },
    /// Remove control characters until the XML parses
    FixXml {
        input: PathBuf,
        /// Defaults to `<name>_fixed.xml` next to the input
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Also write the CSV sheets as a zip
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Convert XML records to CSV sheets without repairing
    XmlExport {
        input: PathBuf,
        #[arg(short, long, default_value = EXPORT_FILE_NAME)]
        out: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<SiftConfig> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            SiftConfig::from_json(&json)
                .with_context(|| format!("Invalid config {}", path.display()))
        }
        None => Ok(SiftConfig::default()),
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

/// Inline items followed by the lines of `file`
fn collect_items(inline: Vec<String>, file: Option<&Path>) -> Result<Vec<String>> {
    let mut items = inline;
    if let Some(path) = file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        items.extend(parse_lines(&text));
    }
    Ok(items)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn log_progress(current: usize, total: usize, message: &str) {
    tracing::debug!(current, total, "{}", message);
}

fn run(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Search {
            pdf,
            keyword,
            keywords_file,
            out,
        } => {
            let bytes = read(&pdf)?;
            let text = LazyText::new(&bytes);
            let keywords = collect_items(keyword, keywords_file.as_deref())?;
            let mut archive = Archive::with_policy(config.archive.collision);

            let report = search_keywords(
                &bytes,
                &text,
                &keywords,
                &mut archive,
                &config.search,
                &mut log_progress,
            )?;
            if !archive.is_empty() {
                write(&out, &archive.to_zip()?)?;
            }
            print_json(&report)
        }
        Command::Split {
            pdf,
            key,
            value,
            values_file,
            out,
        } => {
            let bytes = read(&pdf)?;
            let text = LazyText::new(&bytes);
            let values = collect_items(value, values_file.as_deref())?;

            let report = split_by_field(&bytes, &text, &key, &values, &mut log_progress)?;
            if let Some(document) = &report.document {
                write(&out, document)?;
            }
            print_json(&report)
        }
        Command::Insert {
            print,
            archive,
            keyword,
            keywords_file,
            out,
        } => {
            let bytes = read(&print)?;
            let text = LazyText::new(&bytes);
            let keywords = collect_items(keyword, keywords_file.as_deref())?;
            let archive = Archive::from_zip(&read(&archive)?, config.archive.collision)
                .with_context(|| format!("Failed to open archive {}", archive.display()))?;

            let report = insert_archived_pages(
                &bytes,
                &text,
                &keywords,
                &archive,
                &config.insert,
                &mut log_progress,
            )?;
            write(&out, &report.outcome.document)?;
            print_json(&report)
        }
        Command::Balances { pdf } => {
            let bytes = read(&pdf)?;
            let text = LazyText::new(&bytes);
            let scan = scan_balances(&text, &mut log_progress)
                .with_context(|| format!("Failed to scan {}", pdf.display()))?;
            print_json(&scan)
        }
        Command::FixXml { input, out, export } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let outcome = repair_xml(&text, &config.repair)?;

            let out = out.unwrap_or_else(|| {
                let name = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                input.with_file_name(fixed_file_name(&name))
            });
            write(&out, outcome.text.as_bytes())?;
            if let Some(export) = export {
                let sheets = XmlExport::new(&outcome.records, &outcome.invalid, &outcome.fixes);
                write(&export, &sheets.to_zip()?)?;
            }
            print_json(&outcome.fixes)
        }
        Command::XmlExport { input, out } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let parsed = parse_records(&text)?;
            if parsed.table.is_empty() {
                bail!("No records found in {}", input.display());
            }
            write(&out, &XmlExport::new(&parsed.table, &parsed.invalid, &[]).to_zip()?)?;
            print_json(&parsed.invalid)
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the JSON report, so logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    run(args)
}
