//! The single channel through which user-visible errors and notices leave the core.

use serde::Serialize;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Values for [`Report::message_type`].
pub mod kinds {
    pub const SHORTCUT_FILE: &str = "shortcut-file";
    pub const NO_MATCH: &str = "no-match";
    pub const SCRIPT_SYNTAX: &str = "script-syntax";
    pub const SCRIPT_RUNTIME: &str = "script-runtime";
    pub const PERMISSION: &str = "permission";
    pub const LIFECYCLE: &str = "lifecycle";
    pub const PRINT: &str = "print";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// A notice for the user. The popup text is short; the console text may
/// carry a full script listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub popup_message: Option<String>,
    pub console_message: Option<String>,
    pub message_type: Option<String>,
    pub level: MessageLevel,
    pub console_has_details: bool,
}

impl Report {
    pub fn new(level: MessageLevel) -> Self {
        Report {
            popup_message: None,
            console_message: None,
            message_type: None,
            level,
            console_has_details: false,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Report::new(MessageLevel::Info).popup(message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Report::new(MessageLevel::Warning).popup(message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Report::new(MessageLevel::Error).popup(message)
    }

    pub fn popup(mut self, message: impl Into<String>) -> Self {
        self.popup_message = Some(message.into());
        self
    }

    pub fn console(mut self, message: impl Into<String>) -> Self {
        self.console_message = Some(message.into());
        self
    }

    pub fn kind(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn with_details(mut self) -> Self {
        self.console_has_details = true;
        self
    }
}

pub trait Reporter {
    fn report(&self, report: Report);
}

/// Forwards reports to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, report: Report) {
        let kind = report.message_type.as_deref().unwrap_or("");
        let popup = report.popup_message.as_deref().unwrap_or("");
        let console = report.console_message.as_deref().unwrap_or("");
        match report.level {
            MessageLevel::Info => info!(kind, "{}{}", popup, console),
            MessageLevel::Warning => warn!(kind, "{}\n{}", popup, console),
            MessageLevel::Error => error!(kind, "{}\n{}", popup, console),
        }
    }
}

/// Keeps every report in memory, in order. Used by the session host to
/// print reports and by tests to count them.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn take(&self) -> Vec<Report> {
        self.reports
            .lock()
            .map(|mut r| std::mem::take(&mut *r))
            .unwrap_or_default()
    }

    pub fn count_of(&self, message_type: &str) -> usize {
        self.reports()
            .iter()
            .filter(|r| r.message_type.as_deref() == Some(message_type))
            .count()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, report: Report) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
    }
}

impl<R: Reporter + ?Sized> Reporter for std::sync::Arc<R> {
    fn report(&self, report: Report) {
        (**self).report(report)
    }
}

impl<R: Reporter + ?Sized> Reporter for std::rc::Rc<R> {
    fn report(&self, report: Report) {
        (**self).report(report)
    }
}
