pub mod add;
pub mod completions;
pub mod import;
pub mod inspect;
pub mod remove;
pub mod set;
pub mod sync;
pub mod translator;
pub mod validate;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use vdbkit_core::{shutdown_requested, Archive, ArchiveOptions, Config, Progress, SyncState};
use vdbkit_store::{ArchiveLock, StateLayout};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_VALIDATION_WARNINGS: u8 = 4;

/// Settings shared by every archive command.
pub struct Context {
    pub options: ArchiveOptions,
    pub layout: StateLayout,
    pub json: bool,
}

impl Context {
    pub fn new(config: &Config, json: bool) -> Self {
        Self {
            options: config.archive_options(),
            layout: StateLayout::new(&config.state_dir),
            json,
        }
    }

    pub fn open(&self, vdb: &Path) -> Result<Archive, String> {
        Archive::open(vdb, self.options.clone()).map_err(|e| e.to_string())
    }

    /// Run `edit` on the archive at `vdb` under its cross-process lock, then
    /// save if anything changed. Returns the edit's result and whether the
    /// archive was saved.
    pub fn edit<T>(
        &self,
        vdb: &Path,
        edit: impl FnOnce(&Archive, &CliProgress) -> Result<T, String>,
    ) -> Result<(T, bool), String> {
        self.layout
            .initialize()
            .map_err(|e| format!("store error: {e}"))?;
        let lock_path = self
            .layout
            .lock_file(vdb)
            .map_err(|e| format!("archive lock: {e}"))?;
        let _lock = ArchiveLock::acquire(&lock_path).map_err(|e| format!("archive lock: {e}"))?;

        let archive = self.open(vdb)?;
        let progress = CliProgress::new(self.json);
        let outcome = edit(&archive, &progress).and_then(|value| {
            if !archive.is_modified() {
                return Ok((value, false));
            }
            progress.set_message(&format!("saving {}", vdb.display()));
            archive.save(&progress).map_err(|e| e.to_string())?;
            Ok((value, true))
        });
        progress.finish(outcome.is_ok());
        archive.close();
        outcome
    }
}

/// Progress sink that drives a spinner and cancels on Ctrl-C.
pub struct CliProgress {
    bar: Option<ProgressBar>,
}

impl CliProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = (!quiet && console::user_attended_stderr()).then(|| spinner("working"));
        Self { bar }
    }

    fn set_message(&self, msg: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(msg.to_owned());
        }
    }

    fn finish(&self, ok: bool) {
        if let Some(bar) = &self.bar {
            if ok {
                spin_ok(bar, "done");
            } else {
                spin_fail(bar, "failed");
            }
        }
    }
}

impl Progress for CliProgress {
    fn report(&self, item: &str) {
        self.set_message(item);
    }

    fn is_cancelled(&self) -> bool {
        let cancelled = shutdown_requested();
        if cancelled {
            warn!("interrupted, stopping");
        }
        cancelled
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_state(state: SyncState) -> String {
    use console::Style;
    let label = state.to_string();
    match state {
        SyncState::Synchronized => Style::new().green().apply_to(label).to_string(),
        SyncState::NotSynchronized => Style::new().yellow().apply_to(label).to_string(),
    }
}

/// One-line outcome of a mutating command.
pub fn report_saved(vdb: &Path, saved: bool, json: bool, what: &str) -> Result<(), String> {
    if json {
        let payload = serde_json::json!({
            "archive": vdb.display().to_string(),
            "saved": saved,
            "change": what,
        });
        println!("{}", json_pretty(&payload)?);
    } else if saved {
        println!("{what}; saved {}", vdb.display());
    } else {
        println!("{what}; {} unchanged", vdb.display());
    }
    Ok(())
}
