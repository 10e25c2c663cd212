use engine_runtime::execution::summary::{ImportReport, ImportStatus};
use indicatif::{ProgressBar, ProgressStyle};
use model::execution::failure::ImportFailure;
use std::path::PathBuf;

const BAR_LENGTH: u64 = 1000;

/// Overall import progress as a fixed-width bar.
pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(BAR_LENGTH))
    }

    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::with_template("[{bar:40}] {percent:>3}% ({elapsed})")
            .map(|style| style.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_length(BAR_LENGTH);
        bar.set_style(style);
        Self { bar }
    }

    /// Moves the bar to `ratio` (0.0 to 1.0). Progress never goes backwards.
    pub fn update(&self, ratio: f64) {
        let pos = (ratio.clamp(0.0, 1.0) * BAR_LENGTH as f64) as u64;
        if pos > self.bar.position() {
            self.bar.set_position(pos);
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self, status: ImportStatus) {
        match status {
            ImportStatus::Completed => self.bar.finish(),
            ImportStatus::Failed | ImportStatus::Interrupted => self.bar.abandon(),
        }
    }
}

pub fn render_failure(failure: &ImportFailure) -> String {
    match &failure.file {
        Some(file) => format!("Error in '{}': {}", file.display(), failure.message),
        None => format!("Error: {}", failure.message),
    }
}

pub fn render_summary(report: &ImportReport) -> String {
    let mut out = format!("  {}", report.summary);
    match report.status {
        ImportStatus::Completed => out.push_str(&format!(
            "\n  Done ({:.2} seconds)",
            report.summary.elapsed.as_secs_f64()
        )),
        ImportStatus::Interrupted => out.push_str("\n  Interrupted"),
        ImportStatus::Failed => {}
    }
    out
}

/// Summary to stdout, failures to stderr.
pub fn print_report(report: &ImportReport) {
    println!("\n{}", render_summary(report));
    for failure in &report.failures {
        eprintln!("{}", render_failure(failure));
    }
}

pub fn print_ignored(ignored: &[PathBuf]) {
    if ignored.is_empty() {
        return;
    }
    eprintln!("Unexpected files found in the specified directory. Importing a directory expects");
    eprintln!(" a `<db>/<table>.{{json,csv}}` tree with `<table>.info` files. To import other");
    eprintln!(" files, import them one at a time with --file. The following files were ignored:");
    for path in ignored {
        eprintln!("{}", path.display());
    }
}
