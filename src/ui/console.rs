// ConsoleUi - terminal rendering of the progress surface
//
// Dialogs are printed as titled blocks on stdout (errors on stderr), the spinner
// as a single status line. Lives on the main thread, which is the UI thread
// for the command-line front end.

use super::UiSurface;
use std::cell::Cell;
use std::io::{self, Write};

#[derive(Debug, Default)]
pub struct ConsoleUi {
    spinner_active: Cell<bool>,
    errors_shown: Cell<usize>,
    dialogs_shown: Cell<usize>,
    reloads: Cell<usize>,
}

impl ConsoleUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of error dialogs shown so far
    pub fn errors_shown(&self) -> usize {
        self.errors_shown.get()
    }

    /// Number of dialogs of either kind shown so far
    pub fn dialogs_shown(&self) -> usize {
        self.dialogs_shown.get()
    }

    pub fn reloads(&self) -> usize {
        self.reloads.get()
    }

    fn print_block(out: &mut dyn Write, title: &str, body: &str) {
        let rule = "-".repeat(title.chars().count().max(8));
        // Console write failures have nowhere better to go
        let _ = writeln!(out, "{}\n{}\n{}\n", title, rule, body);
        let _ = out.flush();
    }
}

impl UiSurface for ConsoleUi {
    fn show_spinner(&self, title: &str) {
        self.spinner_active.set(true);
        let _ = writeln!(io::stderr(), "... {}", title);
    }

    fn hide_spinner(&self) {
        if self.spinner_active.replace(false) {
            tracing::debug!("Spinner hidden");
        }
    }

    fn show_info(&self, title: &str, body: &str) {
        self.dialogs_shown.set(self.dialogs_shown.get() + 1);
        Self::print_block(&mut io::stdout(), title, body);
    }

    fn show_error(&self, title: &str, body: &str) {
        self.dialogs_shown.set(self.dialogs_shown.get() + 1);
        self.errors_shown.set(self.errors_shown.get() + 1);
        Self::print_block(&mut io::stderr(), &format!("Error: {}", title), body);
    }

    fn reload_launcher_list(&self) {
        self.reloads.set(self.reloads.get() + 1);
        tracing::debug!("Launcher list reload requested");
    }

    fn print_method_name(&self, name: &str) {
        tracing::trace!("UI call from {}", name);
    }
}
