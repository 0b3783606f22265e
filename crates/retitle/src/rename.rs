use crate::prelude::{eprintln, println, *};
use colored::Colorize;
use futures::StreamExt;
use pdf::{ExtractOptions, PdfError};
use retitle_core::filename::{is_pdf_file_name, plan_rename, FilenameError, RenamePlan};
use retitle_core::title::detect_title;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, clap::Args, Clone)]
pub struct Options {
    /// Directory containing the PDF files (defaults to the current directory)
    #[clap(env = "RETITLE_DIR")]
    dir: Option<PathBuf>,

    /// Report what would be renamed without touching any file
    #[arg(long, env = "RETITLE_DRY_RUN", default_value = "false")]
    dry_run: bool,

    /// Output the report as JSON
    #[arg(long, env = "RETITLE_JSON", default_value = "false")]
    json: bool,

    /// Number of files analysed concurrently (defaults to the number of CPUs)
    #[arg(short, long, env = "RETITLE_JOBS")]
    jobs: Option<usize>,

    /// Largest horizontal gap between two characters of the same word
    #[arg(long, env = "RETITLE_X_TOLERANCE", default_value = "3")]
    x_tolerance: f32,

    /// Largest vertical offset between two characters of the same word
    #[arg(long, env = "RETITLE_Y_TOLERANCE", default_value = "3")]
    y_tolerance: f32,
}

/// What the first page of a file told us.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    NoPages,
    NoTitle,
    Title(String),
}

/// Final result for a single file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Renamed { to: String },
    WouldRename { to: String },
    AlreadyNamed,
    TargetExists { to: String },
    NoTitle,
    NoPages,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub directory: String,
    pub dry_run: bool,
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<FileReport>,
}

impl Summary {
    fn record(&mut self, report: FileReport) {
        match report.outcome {
            Outcome::Renamed { .. } | Outcome::WouldRename { .. } => self.renamed += 1,
            Outcome::Failed { .. } => self.failed += 1,
            _ => self.skipped += 1,
        }
        self.files.push(report);
    }
}

pub async fn run(options: Options, global: crate::Global) -> Result<()> {
    let dir = match options.dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to resolve the current directory")?,
    };

    if !dir.is_dir() {
        return Err(Error::NotADirectory(dir).into());
    }

    let files = list_pdf_files(&dir)?;
    log::debug!("found {} PDF file(s) in {}", files.len(), dir.display());

    if !options.json {
        println!("Scanning directory: {}", dir.display());
    }

    let jobs = options
        .jobs
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .max(1);
    let extract = ExtractOptions {
        x_tolerance: options.x_tolerance,
        y_tolerance: options.y_tolerance,
    };

    // Analysis runs concurrently; `buffered` hands results back in file order
    // so renames below happen one at a time, in a stable order.
    let mut analyses = futures::stream::iter(files.into_iter().map(|file| {
        let path = dir.join(&file);
        async move {
            let start = Instant::now();
            let result = tokio::task::spawn_blocking(move || analyze_file(&path, &extract))
                .await
                .map_err(|e| Error::Task(e.to_string()))
                .and_then(|analysis| analysis);
            (file, result, start.elapsed())
        }
    }))
    .buffered(jobs);

    let mut summary = Summary {
        directory: dir.display().to_string(),
        dry_run: options.dry_run,
        ..Default::default()
    };
    let mut names = NameTracker::default();

    while let Some((file, analysis, elapsed)) = analyses.next().await {
        if global.verbose {
            eprintln!("{} analysed in {}", file.dimmed(), format_elapsed(elapsed).dimmed());
        }

        let report = apply(&dir, file, analysis, options.dry_run, &mut names);

        if !options.json {
            println!("{}", render_report(&report));
        }
        summary.record(report);
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", render_summary(&summary));
    }

    Ok(())
}

/// Names of regular files in `dir` ending in `.pdf` (any case), sorted.
fn list_pdf_files(dir: &Path) -> Result<Vec<String>, Error> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            log::warn!("skipping non UTF-8 file name {:?}", entry.file_name());
            continue;
        };

        if is_pdf_file_name(&name) && entry.path().is_file() {
            files.push(name);
        }
    }

    files.sort();
    Ok(files)
}

/// Extract the first page of `path` and look for a title on it.
fn analyze_file(path: &Path, options: &ExtractOptions) -> Result<Analysis, Error> {
    match pdf::first_page_text_from_path(path, options) {
        Ok(page) => {
            log::debug!(
                "{}: {} word(s) on a {} wide page",
                path.display(),
                page.words.len(),
                page.width
            );
            Ok(match detect_title(page.width, &page.words) {
                Some(title) => Analysis::Title(title),
                None => Analysis::NoTitle,
            })
        }
        Err(PdfError::NoPages) => Ok(Analysis::NoPages),
        Err(e) => Err(e.into()),
    }
}

/// File names taken or freed by earlier renames in this run.
///
/// A dry run never touches the disk, so collisions between planned renames
/// are only visible through this record.
#[derive(Debug, Default)]
struct NameTracker {
    claimed: HashSet<String>,
    vacated: HashSet<String>,
}

impl NameTracker {
    fn is_taken(&self, dir: &Path, name: &str) -> bool {
        self.claimed.contains(name) || (dir.join(name).exists() && !self.vacated.contains(name))
    }

    fn record(&mut self, from: &str, to: &str) {
        self.vacated.insert(from.to_string());
        self.vacated.remove(to);
        self.claimed.remove(from);
        self.claimed.insert(to.to_string());
    }
}

/// Turn an analysis into an outcome, renaming the file unless `dry_run`.
fn apply(
    dir: &Path,
    file: String,
    analysis: Result<Analysis, Error>,
    dry_run: bool,
    names: &mut NameTracker,
) -> FileReport {
    let title = match analysis {
        Ok(Analysis::Title(title)) => title,
        Ok(Analysis::NoTitle) => return report(file, None, Outcome::NoTitle),
        Ok(Analysis::NoPages) => return report(file, None, Outcome::NoPages),
        Err(e) => {
            let error = e.to_string();
            return report(file, None, Outcome::Failed { error });
        }
    };

    let to = match plan_rename(&file, &title) {
        Ok(RenamePlan::AlreadyNamed) => return report(file, Some(title), Outcome::AlreadyNamed),
        Ok(RenamePlan::Rename { to }) => to,
        Err(FilenameError::Empty) => {
            log::debug!("{file}: title {title:?} has no usable characters");
            return report(file, Some(title), Outcome::NoTitle);
        }
    };

    if names.is_taken(dir, &to) {
        return report(file, Some(title), Outcome::TargetExists { to });
    }

    if dry_run {
        names.record(&file, &to);
        return report(file, Some(title), Outcome::WouldRename { to });
    }

    match std::fs::rename(dir.join(&file), dir.join(&to)) {
        Ok(()) => {
            names.record(&file, &to);
            report(file, Some(title), Outcome::Renamed { to })
        }
        Err(e) => {
            let error = Error::from(e).to_string();
            report(file, Some(title), Outcome::Failed { error })
        }
    }
}

fn report(file: String, title: Option<String>, outcome: Outcome) -> FileReport {
    FileReport {
        file,
        title,
        outcome,
    }
}

/// One console line per file.
fn render_report(report: &FileReport) -> String {
    let file = &report.file;
    match &report.outcome {
        Outcome::Renamed { to } => f!("✅ '{}' -> '{}'", file, to.green()),
        Outcome::WouldRename { to } => f!("🔎 '{}' -> '{}' (dry run)", file, to.cyan()),
        Outcome::AlreadyNamed => f!("ℹ️  '{file}' is already named correctly."),
        Outcome::TargetExists { to } => {
            f!("⚠️  '{}' already exists, skipping.", to.yellow())
        }
        Outcome::NoTitle => f!("ℹ️  No title found for '{file}'."),
        Outcome::NoPages => f!("ℹ️  '{file}' has no pages."),
        Outcome::Failed { error } => f!("❌ Error processing '{}': {}", file, error.red()),
    }
}

fn render_summary(summary: &Summary) -> String {
    let renamed = if summary.dry_run {
        "would rename"
    } else {
        "renamed"
    };
    f!(
        "\n{} {}, {} skipped, {} failed",
        summary.renamed.to_string().green().bold(),
        renamed,
        summary.skipped.to_string().yellow(),
        summary.failed.to_string().red()
    )
}

fn format_elapsed(elapsed: Duration) -> String {
    f!("{} ms", elapsed.as_millis())
}
