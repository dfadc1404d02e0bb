//! Rebuilds the rule table from the settings shortcuts and shortcut files.

use crate::engine::{ExpansionEngine, LifecycleOutcome};
use crate::report::{kinds, Report};
use crate::rules::{RuleTable, SETUP_PATTERN, SHUTDOWN_PATTERN};
use crate::shortcut_file::{parse_shortcut_file, ParseOptions, ParsedShortcutFile};
use crate::storage::FileStore;
use crate::syntax::SyntaxDescriptor;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info};

/// Identity of the shortcuts written directly in the settings.
pub const SETTINGS_SOURCE: &str = "settings";

/// Strip the regex anchors from a lifecycle pattern to get its trigger text.
fn lifecycle_trigger(pattern: &str) -> &str {
    pattern.trim_start_matches('^').trim_end_matches('$')
}

/// What one rebuild produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Sources in the published table, in order.
    pub sources: Vec<String>,
    pub rule_count: usize,
    /// Files that could not be read or had parse issues.
    pub files_with_issues: Vec<String>,
    /// Sources left out because their setup script failed.
    pub failed_setups: Vec<String>,
}

pub struct ShortcutLoader {
    store: Rc<dyn FileStore>,
    engine: ExpansionEngine,
    options: ParseOptions,
}

impl ShortcutLoader {
    pub fn new(store: Rc<dyn FileStore>, engine: ExpansionEngine) -> Self {
        ShortcutLoader {
            store,
            engine,
            options: ParseOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn engine(&self) -> &ExpansionEngine {
        &self.engine
    }

    /// Parse the settings shortcuts, then every file in `files` in order.
    /// Unreadable files and parse issues are collected into one report.
    pub fn gather(&self, settings_text: &str, files: &[String]) -> (Vec<ParsedShortcutFile>, Vec<String>) {
        let mut parsed = Vec::with_capacity(files.len() + 1);
        let mut problems = Vec::new();
        let mut files_with_issues = Vec::new();

        parsed.push(parse_shortcut_file(SETTINGS_SOURCE, settings_text, self.options));
        for identity in files {
            match self.store.read(identity) {
                Ok(raw) => parsed.push(parse_shortcut_file(identity, &raw, self.options)),
                Err(e) => {
                    problems.push(format!("{}: {}", identity, e));
                    files_with_issues.push(identity.clone());
                }
            }
        }

        for file in &parsed {
            if file.had_errors() {
                files_with_issues.push(file.identity.clone());
            }
            for issue in &file.issues {
                problems.push(format!("{}: {}", file.identity, issue));
            }
        }

        if !problems.is_empty() {
            self.engine.reporter().report(
                Report::error(format!(
                    "Errors in shortcut files: {}",
                    files_with_issues.join(", ")
                ))
                .console(problems.join("\n"))
                .kind(kinds::SHORTCUT_FILE),
            );
        }
        (parsed, files_with_issues)
    }

    /// Build a fresh table, run its setup scripts and publish it.
    ///
    /// The previous table's shutdown scripts run first. Sources whose setup
    /// fails are left out of the published table.
    pub fn rebuild(&self, settings_text: &str, files: &[String]) -> LoadSummary {
        let (parsed, files_with_issues) = self.gather(settings_text, files);

        self.run_shutdown_scripts(&self.engine.table().snapshot());

        let setup = lifecycle_trigger(SETUP_PATTERN);
        let mut table = RuleTable::new();
        let mut failed_setups = Vec::new();
        for file in parsed {
            let outcome = self.engine.run_lifecycle_script(&file.rules, setup);
            if outcome == LifecycleOutcome::Failed {
                failed_setups.push(file.identity);
                continue;
            }
            let syntaxes = self.syntaxes_for(&file);
            table.push_source(&file.identity, &file.file_about, file.rules, syntaxes);
        }

        if !failed_setups.is_empty() {
            self.engine.reporter().report(
                Report::error(format!(
                    "Setup script failed; shortcuts not loaded from: {}",
                    failed_setups.join(", ")
                ))
                .kind(kinds::LIFECYCLE),
            );
        }

        let summary = LoadSummary {
            sources: table.sources.iter().map(|s| s.identity.clone()).collect(),
            rule_count: table.rules.len(),
            files_with_issues,
            failed_setups,
        };
        self.engine.table().replace(table);
        info!(
            sources = summary.sources.len(),
            rules = summary.rule_count,
            "published shortcut table"
        );
        summary
    }

    /// Run the shutdown scripts of the published table.
    pub fn shutdown(&self) {
        self.run_shutdown_scripts(&self.engine.table().snapshot());
    }

    fn run_shutdown_scripts(&self, table: &Arc<RuleTable>) {
        let shutdown = lifecycle_trigger(SHUTDOWN_PATTERN);
        for span in &table.sources {
            let outcome = self
                .engine
                .run_lifecycle_script(table.source_rules(span), shutdown);
            debug!(source = %span.identity, ?outcome, "ran shutdown script");
        }
    }

    fn syntaxes_for(&self, file: &ParsedShortcutFile) -> Vec<SyntaxDescriptor> {
        file.rule_abouts
            .iter()
            .filter_map(|about| {
                SyntaxDescriptor::new(&about.syntax, &about.description, &file.identity)
                    .map_err(|e| debug!(syntax = %about.syntax, error = %e, "skipping syntax"))
                    .ok()
            })
            .collect()
    }
}
