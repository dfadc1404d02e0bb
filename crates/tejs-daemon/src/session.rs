//! A line-oriented host: reads document lines from stdin, expands every
//! `prefix…suffix` trigger in them and writes the result to stdout, while
//! polling the shortcut files for changes.

use std::rc::Rc;
use std::time::Duration;

use tejs_core::{
    ExpansionContext, ExpansionEngine, FileMonitor, FileStore, FsStore, Reporter, Result,
    Settings, SharedRuleTable, ShellRunner, ShortcutLoader, StampSource, StorageEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::watcher::StoragePoller;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// A trigger found in a line. Offsets are in chars and include the prefix
/// and suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Find the first non-empty `prefix…suffix` trigger at or after char `from`.
pub fn find_trigger(line: &str, prefix: &str, suffix: &str, from: usize) -> Option<TriggerSpan> {
    let chars: Vec<char> = line.chars().collect();
    let prefix: Vec<char> = prefix.chars().collect();
    let suffix: Vec<char> = suffix.chars().collect();
    if prefix.is_empty() || suffix.is_empty() {
        return None;
    }

    let mut start = from;
    while let Some(open) = find_chars(&chars, &prefix, start) {
        let body_start = open + prefix.len();
        let close = find_chars(&chars, &suffix, body_start)?;
        if close > body_start {
            return Some(TriggerSpan {
                start: open,
                end: close + suffix.len(),
                text: chars[body_start..close].iter().collect(),
            });
        }
        start = open + 1;
    }
    None
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

/// Expand every trigger in `line`, left to right. Triggers that fail or do
/// not match are left as typed.
pub fn expand_line(engine: &ExpansionEngine, line: &str, prefix: &str, suffix: &str) -> String {
    let mut line = line.to_string();
    let mut from = 0;
    while let Some(span) = find_trigger(&line, prefix, suffix, from) {
        let mut context = ExpansionContext {
            is_user_triggered: true,
            line: line.clone(),
            input_start: span.start,
            input_end: span.end,
            trigger_text: span.text.clone(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            ..Default::default()
        };
        match engine.expand(&span.text, false, Some(&mut context)) {
            Ok(Some(replacement)) => {
                let chars: Vec<char> = line.chars().collect();
                let end = context.input_end.clamp(span.start, chars.len());
                let start = context.input_start.min(end);
                let mut next: String = chars[..start].iter().collect();
                next.push_str(&replacement);
                from = next.chars().count();
                next.extend(&chars[end..]);
                line = next;
            }
            Ok(None) | Err(_) => from = span.start + 1,
        }
    }
    line
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// `:open <file>`: the user switched to a document.
    Open(String),
    /// `:close`: no document is active.
    Close,
    /// `:reload`: rebuild the rule table now.
    Reload,
    /// `:quit`
    Quit,
    /// Any other line is document text to expand.
    Text(String),
}

impl SessionCommand {
    pub fn parse(line: &str) -> SessionCommand {
        let trimmed = line.trim();
        match trimmed.split_once(char::is_whitespace) {
            Some((":open", file)) => SessionCommand::Open(file.trim().to_string()),
            _ => match trimmed {
                ":close" => SessionCommand::Close,
                ":reload" => SessionCommand::Reload,
                ":quit" | ":q" => SessionCommand::Quit,
                _ => SessionCommand::Text(line.to_string()),
            },
        }
    }
}

pub struct Session {
    engine: ExpansionEngine,
    loader: Rc<ShortcutLoader>,
    monitor: FileMonitor,
    poller: StoragePoller,
    files: Vec<String>,
    prefix: String,
    suffix: String,
}

impl Session {
    /// Load the shortcut files named in `settings` and start watching them.
    pub fn new(settings: &Settings, reporter: Rc<dyn Reporter>) -> Session {
        let root = settings.resolved_vault_root();
        let fs_store = Rc::new(FsStore::new(&root));
        let store: Rc<dyn FileStore> = fs_store.clone();
        let stamps: Rc<dyn StampSource> = fs_store;

        let engine = ExpansionEngine::builder(SharedRuleTable::default(), reporter)
            .external_runner(Rc::new(ShellRunner::in_dir(&root)))
            .allow_external(settings.allow_external)
            .build();
        let loader = Rc::new(ShortcutLoader::new(store, engine.clone()));
        let files = settings.shortcut_files.clone();

        let rebuild_loader = loader.clone();
        let settings_text = settings.settings_shortcuts.clone();
        let rebuild_files = files.clone();
        let mut monitor = FileMonitor::new(
            &files,
            stamps.clone(),
            move || {
                rebuild_loader.rebuild(&settings_text, &rebuild_files);
            },
            |identity| debug!(identity, "stopped watching shortcut file"),
            false,
        );
        monitor.set_policy(settings.monitor_policy);
        monitor.update_watch_list(&files, true);
        monitor.layout_ready();

        let mut poller = StoragePoller::new(stamps);
        poller.prime(&files);

        Session {
            engine,
            loader,
            monitor,
            poller,
            files,
            prefix: settings.prefix.clone(),
            suffix: settings.suffix.clone(),
        }
    }

    pub fn engine(&self) -> &ExpansionEngine {
        &self.engine
    }

    /// Handle one input line. Returns the text to write, if any, and
    /// whether the session should continue.
    pub fn handle_line(&mut self, line: &str) -> (Option<String>, bool) {
        match SessionCommand::parse(line) {
            SessionCommand::Open(file) => {
                self.monitor
                    .handle_event(StorageEvent::ActiveChanged(Some(file)));
                (None, true)
            }
            SessionCommand::Close => {
                self.monitor.handle_event(StorageEvent::ActiveChanged(None));
                (None, true)
            }
            SessionCommand::Reload => {
                self.monitor.update_watch_list(&self.files, true);
                (None, true)
            }
            SessionCommand::Quit => (None, false),
            SessionCommand::Text(text) => (
                Some(expand_line(&self.engine, &text, &self.prefix, &self.suffix)),
                true,
            ),
        }
    }

    /// Feed file changes since the last poll to the monitor.
    pub fn poll_storage(&mut self) {
        for event in self.poller.poll(&self.files) {
            self.monitor.handle_event(event);
        }
    }

    /// Run until stdin closes or `:quit`, then run shutdown scripts.
    pub async fn run(mut self, poll_every: Duration) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = tokio::time::interval(poll_every);
        info!(files = self.files.len(), "session started");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    let (output, keep_going) = self.handle_line(&line);
                    if let Some(output) = output {
                        println!("{}", output);
                    }
                    if !keep_going {
                        break;
                    }
                }
                _ = ticker.tick() => self.poll_storage(),
            }
        }

        self.shutdown();
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.loader.shutdown();
        self.monitor.teardown();
        info!("session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tejs_core::report::{kinds, RecordingReporter};
    use tejs_core::MonitorPolicy;

    #[test]
    fn finds_first_non_empty_trigger() {
        let span = find_trigger(";;;hi;", ";;", ";", 0).unwrap();
        assert_eq!((span.start, span.end, span.text.as_str()), (1, 6, "hi"));
        let span = find_trigger("x ;;hi; y", ";;", ";", 0).unwrap();
        assert_eq!((span.start, span.end, span.text.as_str()), (2, 7, "hi"));
        assert_eq!(find_trigger("no trigger ;;here", ";;", ";", 0), None);
    }

    #[test]
    fn offsets_count_chars() {
        let span = find_trigger("é ;;d6;", ";;", ";", 0).unwrap();
        assert_eq!((span.start, span.end), (2, 7));
    }

    #[test]
    fn commands_are_recognised() {
        assert_eq!(SessionCommand::parse(":open notes.md"), SessionCommand::Open("notes.md".into()));
        assert_eq!(SessionCommand::parse(" :close "), SessionCommand::Close);
        assert_eq!(SessionCommand::parse(":q"), SessionCommand::Quit);
        assert_eq!(SessionCommand::parse("text :open"), SessionCommand::Text("text :open".into()));
    }

    const SHORTCUTS: &str = "Test\n~~\n^hi$\n~~\nreturn 'Hello!';\n~~\nhi - greet\n~~\n^up (.*)$\n~~\nreturn $1.toUpperCase();\n~~\n\n~~\n^wrap$\n~~\nreturn ';;hi;';\n~~\n\n";

    fn session_in(dir: &std::path::Path, reporter: Rc<RecordingReporter>) -> Session {
        fs::write(dir.join("s.md"), SHORTCUTS).unwrap();
        let settings = Settings {
            shortcut_files: vec!["s.md".to_string()],
            settings_shortcuts: String::new(),
            vault_root: Some(dir.to_path_buf()),
            monitor_policy: MonitorPolicy::OnTouch,
            ..Settings::default()
        };
        Session::new(&settings, reporter)
    }

    #[test]
    fn session_expands_lines_and_leaves_failures() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Rc::new(RecordingReporter::new());
        let mut session = session_in(dir.path(), reporter.clone());

        let (output, keep_going) = session.handle_line("say ;;hi; and ;;up loud; and ;;nope;");
        assert!(keep_going);
        assert_eq!(output.as_deref(), Some("say Hello! and LOUD and ;;nope;"));
        assert_eq!(reporter.count_of(kinds::NO_MATCH), 1);

        assert_eq!(session.handle_line(":quit"), (None, false));
    }

    #[test]
    fn leaving_a_watched_file_reloads_under_on_touch() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Rc::new(RecordingReporter::new());
        let mut session = session_in(dir.path(), reporter.clone());

        fs::write(
            dir.path().join("s.md"),
            "\n~~\n^hi$\n~~\nreturn 'Changed';\n~~\n\n",
        )
        .unwrap();
        session.handle_line(":open s.md");
        session.handle_line(":open other.md");
        let (output, _) = session.handle_line(";;hi;");
        assert_eq!(output.as_deref(), Some("Changed"));
        assert!(reporter.reports().is_empty());
    }

    #[test]
    fn replacement_text_is_not_rescanned() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Rc::new(RecordingReporter::new());
        let session = session_in(dir.path(), reporter);
        let line = expand_line(session.engine(), "[;;wrap;] ;;hi;", ";;", ";");
        assert_eq!(line, "[;;hi;] Hello!");
    }
}
