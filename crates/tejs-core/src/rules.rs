//! The ordered rule table that expansion walks, and its shared handle.

use crate::syntax::SyntaxDescriptor;
use regex::Regex;
use std::sync::{Arc, RwLock};

pub const SETUP_PATTERN: &str = "^tejs setup$";
pub const SHUTDOWN_PATTERN: &str = "^tejs shutdown$";

/// One pattern→script pair from a shortcut source.
#[derive(Debug, Clone)]
pub struct ShortcutRule {
    /// `None` marks a helper: its script is prepended to every later match.
    pub test: Option<Regex>,
    pub expansion: String,
    pub about: Option<String>,
}

impl ShortcutRule {
    pub fn new(test: Option<Regex>, expansion: impl Into<String>) -> Self {
        ShortcutRule {
            test,
            expansion: expansion.into(),
            about: None,
        }
    }

    pub fn is_helper(&self) -> bool {
        self.test.is_none()
    }

    /// A helper with a blank script clears the helpers gathered so far.
    pub fn is_helper_blocker(&self) -> bool {
        self.is_helper() && self.expansion.trim().is_empty()
    }

    pub fn pattern_source(&self) -> &str {
        self.test.as_ref().map_or("", Regex::as_str)
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self.pattern_source(), SETUP_PATTERN | SHUTDOWN_PATTERN)
    }
}

/// Where a run of rules in the table came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    /// `"settings"` or the shortcut-file identity.
    pub identity: String,
    pub file_about: String,
    /// Indices into [`RuleTable::rules`].
    pub start: usize,
    pub end: usize,
}

/// Every rule currently in effect, in matching order.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    pub rules: Vec<ShortcutRule>,
    pub syntaxes: Vec<SyntaxDescriptor>,
    pub sources: Vec<SourceSpan>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Append one source's rules and syntaxes.
    pub fn push_source(
        &mut self,
        identity: &str,
        file_about: &str,
        rules: Vec<ShortcutRule>,
        syntaxes: Vec<SyntaxDescriptor>,
    ) {
        let start = self.rules.len();
        self.rules.extend(rules);
        self.syntaxes.extend(syntaxes);
        self.sources.push(SourceSpan {
            identity: identity.to_string(),
            file_about: file_about.to_string(),
            start,
            end: self.rules.len(),
        });
    }

    pub fn source_rules(&self, span: &SourceSpan) -> &[ShortcutRule] {
        &self.rules[span.start..span.end]
    }

    /// Syntaxes that accept `typed` as a full trigger or a prefix of one.
    pub fn matching_syntaxes<'a>(&'a self, typed: &'a str) -> impl Iterator<Item = &'a SyntaxDescriptor> {
        self.syntaxes.iter().filter(move |syntax| syntax.accepts(typed))
    }
}

/// The published rule table. Readers take a snapshot `Arc`; a rebuild
/// swaps in a new table without touching snapshots in use.
#[derive(Debug, Clone, Default)]
pub struct SharedRuleTable {
    inner: Arc<RwLock<Arc<RuleTable>>>,
}

impl SharedRuleTable {
    pub fn new(table: RuleTable) -> Self {
        SharedRuleTable {
            inner: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    pub fn snapshot(&self) -> Arc<RuleTable> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Publish `table`, returning the one it replaces.
    pub fn replace(&self, table: RuleTable) -> Arc<RuleTable> {
        let table = Arc::new(table);
        match self.inner.write() {
            Ok(mut guard) => std::mem::replace(&mut *guard, table),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, script: &str) -> ShortcutRule {
        let test = if pattern.is_empty() {
            None
        } else {
            Some(Regex::new(pattern).unwrap())
        };
        ShortcutRule::new(test, script)
    }

    #[test]
    fn helper_kinds() {
        assert!(rule("", "let x = 1;").is_helper());
        assert!(!rule("", "let x = 1;").is_helper_blocker());
        assert!(rule("", "  \n").is_helper_blocker());
        assert!(!rule("^a$", "").is_helper());
        assert!(rule(SETUP_PATTERN, "").is_lifecycle());
    }

    #[test]
    fn snapshots_survive_replacement() {
        let shared = SharedRuleTable::new(RuleTable::new());
        let before = shared.snapshot();

        let mut table = RuleTable::new();
        table.push_source("settings", "", vec![rule("^a$", "return 1;")], Vec::new());
        let old = shared.replace(table);

        assert!(before.is_empty());
        assert!(old.is_empty());
        assert_eq!(shared.snapshot().rules.len(), 1);
    }

    #[test]
    fn source_spans_index_rules() {
        let mut table = RuleTable::new();
        table.push_source("settings", "", vec![rule("^a$", "")], Vec::new());
        table.push_source("b.md", "about b", vec![rule("^b$", ""), rule("", "h")], Vec::new());
        let span = &table.sources[1];
        assert_eq!((span.start, span.end), (1, 3));
        assert_eq!(table.source_rules(span)[0].pattern_source(), "^b$");
    }
}
