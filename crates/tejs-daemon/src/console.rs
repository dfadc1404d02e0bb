use std::io::{self, Write};
use std::sync::Mutex;

use tejs_core::report::kinds;
use tejs_core::{MessageLevel, Report, Reporter};

/// Prints reports to a terminal stream, stderr by default.
pub struct ConsoleReporter {
    out: Mutex<Box<dyn Write + Send>>,
    verbose: bool,
}

impl ConsoleReporter {
    pub fn stderr(verbose: bool) -> Self {
        Self::new(Box::new(io::stderr()), verbose)
    }

    pub fn new(out: Box<dyn Write + Send>, verbose: bool) -> Self {
        ConsoleReporter {
            out: Mutex::new(out),
            verbose,
        }
    }

    fn render(&self, report: &Report) -> String {
        let popup = report.popup_message.as_deref().unwrap_or("");
        // `print` output goes through unadorned.
        if report.message_type.as_deref() == Some(kinds::PRINT) {
            return popup.to_string();
        }
        let label = match report.level {
            MessageLevel::Info => "info",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        };
        let mut text = format!("{}: {}", label, popup);
        if let Some(console) = &report.console_message {
            if self.verbose || report.console_has_details || popup.is_empty() {
                text.push('\n');
                text.push_str(console);
            }
        }
        text
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, report: Report) {
        let text = self.render(&report);
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn details_are_printed_only_when_flagged() {
        let buffer = SharedBuffer::default();
        let reporter = ConsoleReporter::new(Box::new(buffer.clone()), false);
        reporter.report(Report::warning("short").console("long"));
        reporter.report(Report::error("bad").console("listing").with_details());
        assert_eq!(buffer.text(), "warning: short\nerror: bad\nlisting\n");
    }

    #[test]
    fn print_reports_are_plain() {
        let buffer = SharedBuffer::default();
        let reporter = ConsoleReporter::new(Box::new(buffer.clone()), true);
        reporter.report(Report::info("hello").kind(kinds::PRINT));
        assert_eq!(buffer.text(), "hello\n");
    }
}
