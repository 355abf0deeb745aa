//! Host capability probe.
//!
//! Checks the executable search path for the programs WineCharm shells out
//! to, plus at least one supported terminal emulator. The probe is
//! read-only and never fails: an unreadable `PATH` entry simply contributes
//! nothing.
//!
//! ```ignore
//! let missing = missing_requirements();
//! report_missing(&missing, &scheduler);
//! ```

use crate::ui::{Scheduler, UiSurface};
use indexmap::IndexSet;
use std::ffi::OsString;
use std::time::Duration;

/// Programs that must all be present.
pub const REQUIRED_PROGRAMS: [&str; 7] = [
    "exiftool",
    "wine",
    "winetricks",
    "wrestool",
    "icotool",
    "pgrep",
    "xdg-open",
];

/// Terminal emulators, any one of which is enough.
pub const TERMINAL_OPTIONS: [&str; 5] = [
    "ptyxis",
    "gnome-terminal",
    "konsole",
    "xfce4-terminal",
    "wcterm",
];

/// Synthetic requirement reported when no terminal emulator is found.
pub const TERMINAL_REQUIREMENT: &str = "terminal-emulator";

/// Missing requirements, in [`REQUIRED_PROGRAMS`] order with
/// [`TERMINAL_REQUIREMENT`] last when applicable. Empty means the host is ready.
pub type RequirementReport = IndexSet<String>;

/// Probe the current process `PATH`.
pub fn missing_requirements() -> RequirementReport {
    missing_requirements_in(std::env::var_os("PATH"))
}

/// Probe an explicit search path (same syntax as `PATH`).
///
/// `None` means "nothing is on the path" rather than falling back to the
/// process environment.
pub fn missing_requirements_in(search_path: Option<OsString>) -> RequirementReport {
    let search_path = search_path.unwrap_or_default();
    let cwd = std::env::current_dir().unwrap_or_default();

    let is_present = |name: &str| -> bool {
        match which::which_in(name, Some(search_path.as_os_str()), &cwd) {
            Ok(path) => {
                tracing::debug!("Found {} at {}", name, path.display());
                true
            }
            Err(_) => false,
        }
    };

    let mut missing: RequirementReport = REQUIRED_PROGRAMS
        .iter()
        .filter(|&&name| !is_present(name))
        .map(|name| name.to_string())
        .collect();

    if !TERMINAL_OPTIONS.iter().any(|&name| is_present(name)) {
        missing.insert(TERMINAL_REQUIREMENT.to_string());
    }

    if missing.is_empty() {
        tracing::info!("All required programs are present");
    } else {
        tracing::warn!("Missing required programs: {:?}", missing);
    }

    missing
}

/// Compose the user-facing message for a non-empty report.
///
/// # Returns
/// `(title, body)`, or `None` when nothing is missing
pub fn missing_requirements_message(report: &RequirementReport) -> Option<(String, String)> {
    if report.is_empty() {
        return None;
    }

    let programs: Vec<&str> = report
        .iter()
        .map(String::as_str)
        .filter(|name| *name != TERMINAL_REQUIREMENT)
        .collect();

    let mut body = String::new();
    if !programs.is_empty() {
        body.push_str(&format!(
            "The following required programs are missing: {}.",
            programs.join(", ")
        ));
    }
    if report.contains(TERMINAL_REQUIREMENT) {
        if !body.is_empty() {
            body.push_str("\n\n");
        }
        body.push_str(&format!(
            "No supported terminal emulator was found. Install one of: {}.",
            TERMINAL_OPTIONS.join(", ")
        ));
    }

    Some(("Missing Programs".to_string(), body))
}

/// Show the report in an info dialog on the UI thread. No-op when empty.
pub fn report_missing(report: &RequirementReport, scheduler: &dyn Scheduler) {
    let Some((title, body)) = missing_requirements_message(report) else {
        return;
    };

    scheduler.post(Box::new(move |ui: &dyn UiSurface| {
        ui.print_method_name("report_missing");
        ui.show_info(&title, &body);
    }));
}

/// Probe on a worker after `delay`, then report on the UI thread.
///
/// Used at startup so the first window paint isn't held up by `PATH` lookups.
pub fn schedule_startup_probe<S>(scheduler: S, delay: Duration)
where
    S: Scheduler + Clone + 'static,
{
    let timer_scheduler = scheduler.clone();
    scheduler.post_delayed(
        delay,
        Box::new(move |_ui: &dyn UiSurface| {
            let worker_scheduler = timer_scheduler.clone();
            timer_scheduler.spawn_worker(Box::new(move || {
                let report = missing_requirements();
                report_missing(&report, &worker_scheduler);
            }));
            false
        }),
    );
}
