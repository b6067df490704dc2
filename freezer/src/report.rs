// report.rs — Injectable event and diagnostic sink
//
// The resolver never prints or phones home on its own. Callers pass a
// `Reporter`; the CLI uses `StderrReporter`, tests use `RecordingReporter`,
// library callers that do not care use `NoopReporter`.

use std::time::Duration;

use crate::diag::Diagnostic;

/// Sink for resolver events and non-fatal diagnostics.
pub trait Reporter {
    /// A usage event, e.g. `("freezer", "cut", "add:0")`.
    fn send_event(&mut self, category: &str, action: &str, label: &str);

    /// A warning or note produced while resolving.
    fn diagnostic(&mut self, diag: &Diagnostic);

    /// Called after each pass finishes.
    fn pass_complete(&mut self, _pass: &str, _elapsed: Duration) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn send_event(&mut self, _category: &str, _action: &str, _label: &str) {}
    fn diagnostic(&mut self, _diag: &Diagnostic) {}
}

/// A recorded `send_event` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub category: String,
    pub action: String,
    pub label: String,
}

/// Keeps every event, diagnostic, and completed pass in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    pub events: Vec<Event>,
    pub diagnostics: Vec<Diagnostic>,
    pub passes: Vec<String>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events with the given action, in emission order.
    pub fn events_for(&self, action: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.action == action).collect()
    }
}

impl Reporter for RecordingReporter {
    fn send_event(&mut self, category: &str, action: &str, label: &str) {
        self.events.push(Event {
            category: category.to_string(),
            action: action.to_string(),
            label: label.to_string(),
        });
    }

    fn diagnostic(&mut self, diag: &Diagnostic) {
        self.diagnostics.push(diag.clone());
    }

    fn pass_complete(&mut self, pass: &str, _elapsed: Duration) {
        self.passes.push(pass.to_string());
    }
}

/// Prints diagnostics to stderr; with `verbose`, also events and pass timings.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrReporter {
    pub verbose: bool,
}

impl StderrReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Reporter for StderrReporter {
    fn send_event(&mut self, category: &str, action: &str, label: &str) {
        if self.verbose {
            eprintln!("{category}: {action} {label}");
        }
    }

    fn diagnostic(&mut self, diag: &Diagnostic) {
        eprintln!("{diag}");
    }

    fn pass_complete(&mut self, pass: &str, elapsed: Duration) {
        if self.verbose {
            eprintln!(
                "freezer: {} complete, {:.1}ms",
                pass,
                elapsed.as_secs_f64() * 1000.0
            );
        }
    }
}
