//! Parser for the shortcut-file format.
//!
//! A shortcut file is split into sections by lines holding only `~~`. The
//! first section describes the file; after it, every three sections form a
//! rule: a regex pattern, a script, and an about text of the form
//! `syntax - description`.
//!
//! ```text
//! ---
//! tags: shortcuts
//! ---
//! Dice rolling shortcuts.
//! ~~
//! ^d([0-9]+)$
//! ~~
//! return Math.floor(Math.random() * $1) + 1;
//! ~~
//! d{sides} - Roll a die.
//! ```

use crate::rules::{ShortcutRule, SETUP_PATTERN, SHUTDOWN_PATTERN};
use regex::Regex;
use std::fmt;
use tracing::debug;

const SECTION_DELIMITER: &str = "~~";
const FRONT_MATTER_FENCE: &str = "---";
const CODE_FENCE: &str = "```";
const HIDDEN_ABOUT_MARKER: &str = "hidden";
const ABOUT_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Leave ```` ```js ```` fences in scripts.
    pub keep_code_fences: bool,
    /// Copy each rule's about text into [`ShortcutRule::about`].
    pub keep_about: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutFileIssue {
    /// The section count is not 1 + 3n; trailing sections were ignored.
    MisnumberedSections { sections: usize },
    /// A pattern failed to compile; that rule was skipped.
    BadPattern {
        rule_index: usize,
        pattern: String,
        message: String,
    },
}

impl fmt::Display for ShortcutFileIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShortcutFileIssue::MisnumberedSections { sections } => write!(
                f,
                "has {} sections; expected an about section followed by groups of three",
                sections
            ),
            ShortcutFileIssue::BadPattern {
                rule_index,
                pattern,
                message,
            } => write!(
                f,
                "shortcut #{} has a bad pattern /{}/: {}",
                rule_index + 1,
                pattern,
                message
            ),
        }
    }
}

/// The documented syntax of one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleAbout {
    pub syntax: String,
    pub description: String,
    pub pattern_source: String,
}

#[derive(Debug, Clone)]
pub struct ParsedShortcutFile {
    pub identity: String,
    pub file_about: String,
    pub rules: Vec<ShortcutRule>,
    pub rule_abouts: Vec<RuleAbout>,
    pub issues: Vec<ShortcutFileIssue>,
}

impl ParsedShortcutFile {
    pub fn had_errors(&self) -> bool {
        !self.issues.is_empty()
    }
}

pub fn parse_shortcut_file(identity: &str, raw: &str, options: ParseOptions) -> ParsedShortcutFile {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let sections = split_sections(strip_front_matter(&text));

    let mut parsed = ParsedShortcutFile {
        identity: identity.to_string(),
        file_about: sections.first().map(|s| s.trim().to_string()).unwrap_or_default(),
        rules: Vec::new(),
        rule_abouts: Vec::new(),
        issues: Vec::new(),
    };

    if (sections.len() - 1) % 3 != 0 {
        parsed.issues.push(ShortcutFileIssue::MisnumberedSections {
            sections: sections.len(),
        });
    }

    for (rule_index, triple) in sections[1..].chunks_exact(3).enumerate() {
        let pattern = strip_fence(triple[0].trim(), false);
        let test = if pattern.is_empty() {
            None
        } else {
            match Regex::new(&pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    parsed.issues.push(ShortcutFileIssue::BadPattern {
                        rule_index,
                        pattern,
                        message: e.to_string(),
                    });
                    continue;
                }
            }
        };

        let script = if options.keep_code_fences {
            triple[1].to_string()
        } else {
            strip_fence(triple[1], true)
        };
        let about = triple[2].trim().to_string();

        let mut rule = ShortcutRule::new(test, script);
        if let Some(entry) = rule_about(&rule, &about) {
            parsed.rule_abouts.push(entry);
        }
        if options.keep_about {
            rule.about = Some(about);
        }
        parsed.rules.push(rule);
    }

    debug!(
        identity,
        rules = parsed.rules.len(),
        issues = parsed.issues.len(),
        "parsed shortcut file"
    );
    parsed
}

fn strip_front_matter(text: &str) -> &str {
    let mut lines = text.split_inclusive('\n');
    let mut offset = match lines.next() {
        Some(first) if first.trim_end() == FRONT_MATTER_FENCE => first.len(),
        _ => return text,
    };
    for line in lines {
        offset += line.len();
        if line.trim_end() == FRONT_MATTER_FENCE {
            return &text[offset.min(text.len())..];
        }
    }
    // An unclosed block is not front matter.
    text
}

fn split_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_end_matches('\n') == SECTION_DELIMITER {
            sections.push(&text[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    sections.push(&text[start.min(text.len())..]);
    sections
}

/// Remove a surrounding ```` ``` ```` fence. The opening fence line may carry
/// a language tag.
fn strip_fence(section: &str, keep_whitespace: bool) -> String {
    let trimmed = section.trim();
    let fenced = trimmed.len() >= 2 * CODE_FENCE.len()
        && trimmed.starts_with(CODE_FENCE)
        && trimmed.ends_with(CODE_FENCE);
    if !fenced {
        return if keep_whitespace {
            section.to_string()
        } else {
            trimmed.to_string()
        };
    }
    let inner = &trimmed[..trimmed.len() - CODE_FENCE.len()];
    let body = match inner.find('\n') {
        Some(newline) => &inner[newline + 1..],
        None => "",
    };
    if keep_whitespace {
        body.to_string()
    } else {
        body.trim().to_string()
    }
}

fn rule_about(rule: &ShortcutRule, about: &str) -> Option<RuleAbout> {
    if rule.is_helper() || about.is_empty() || about.starts_with(HIDDEN_ABOUT_MARKER) {
        return None;
    }
    let pattern_source = rule.pattern_source();
    if pattern_source == SETUP_PATTERN || pattern_source == SHUTDOWN_PATTERN {
        return None;
    }
    let (syntax, description) = match about.split_once(ABOUT_SEPARATOR) {
        Some((syntax, description)) => (syntax.trim().to_string(), description.trim().to_string()),
        None => (pattern_source.to_string(), about.to_string()),
    };
    Some(RuleAbout {
        syntax,
        description,
        pattern_source: pattern_source.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ParsedShortcutFile {
        parse_shortcut_file("test.md", raw, ParseOptions::default())
    }

    #[test]
    fn one_rule_per_three_sections() {
        let parsed = parse("About.\n~~\n^a$\n~~\nreturn 'a';\n~~\na - letter a\n~~\n^b$\n~~\nreturn 'b';\n~~\nb - letter b\n");
        assert!(!parsed.had_errors());
        assert_eq!(parsed.file_about, "About.");
        assert_eq!(parsed.rules.len(), 2);
        assert_eq!(parsed.rules[1].pattern_source(), "^b$");
        assert_eq!(parsed.rules[1].expansion.trim(), "return 'b';");
        assert_eq!(
            parsed.rule_abouts[0],
            RuleAbout {
                syntax: "a".into(),
                description: "letter a".into(),
                pattern_source: "^a$".into(),
            }
        );
    }

    #[test]
    fn misnumbered_sections_report_once_and_keep_complete_rules() {
        let parsed = parse("About\n~~\n^a$\n~~\nreturn 1;\n~~\nabout\n~~\n^b$\n~~\nreturn 2;");
        assert_eq!(
            parsed.issues,
            vec![ShortcutFileIssue::MisnumberedSections { sections: 6 }]
        );
        assert_eq!(parsed.rules.len(), 1);
    }

    #[test]
    fn delimiter_must_fill_the_line() {
        let parsed = parse("About\n~~ \n^a$\n");
        assert_eq!(parsed.rules.len(), 0);
        assert!(!parsed.had_errors());
        assert_eq!(parsed.file_about, "About\n~~ \n^a$");
    }

    #[test]
    fn front_matter_and_crlf_are_stripped() {
        let parsed = parse("---\r\ntags: x\r\n---\r\nAbout\r\n~~\r\n^a$\r\n~~\r\nreturn 1;\r\n~~\r\nhidden\r\n");
        assert_eq!(parsed.file_about, "About");
        assert_eq!(parsed.rules.len(), 1);
        assert!(parsed.rule_abouts.is_empty());
    }

    #[test]
    fn front_matter_fence_may_carry_trailing_spaces() {
        let parsed = parse("---      \ntitle: é\n---\nAbout\n~~\n^a$\n~~\nreturn 1;\n~~\nx");
        assert_eq!(parsed.file_about, "About");
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.rules[0].pattern_source(), "^a$");
    }

    #[test]
    fn fences_are_stripped_from_patterns_and_scripts() {
        let parsed = parse("\n~~\n```\n^x(\\d)$\n```\n~~\n```js\nreturn $1;\n```\n~~\nx{n} - repeat\n");
        assert_eq!(parsed.rules[0].pattern_source(), r"^x(\d)$");
        assert_eq!(parsed.rules[0].expansion, "return $1;\n");
    }

    #[test]
    fn fences_kept_on_request() {
        let options = ParseOptions {
            keep_code_fences: true,
            keep_about: true,
        };
        let parsed = parse_shortcut_file("f", "\n~~\n^x$\n~~\n```js\nreturn 1;\n```\n~~\nabout x", options);
        assert!(parsed.rules[0].expansion.contains("```js"));
        assert_eq!(parsed.rules[0].about.as_deref(), Some("about x"));
    }

    #[test]
    fn bad_pattern_skips_only_that_rule() {
        let parsed = parse("\n~~\n^(a$\n~~\nreturn 1;\n~~\n\n~~\n^b$\n~~\nreturn 2;\n~~\n");
        assert_eq!(parsed.rules.len(), 1);
        assert!(matches!(
            parsed.issues.as_slice(),
            [ShortcutFileIssue::BadPattern { rule_index: 0, .. }]
        ));
    }

    #[test]
    fn about_without_separator_uses_pattern_as_syntax() {
        let parsed = parse("\n~~\n^today$\n~~\nreturn 1;\n~~\nPrints the date\n");
        assert_eq!(parsed.rule_abouts[0].syntax, "^today$");
        assert_eq!(parsed.rule_abouts[0].description, "Prints the date");
    }

    #[test]
    fn helpers_and_lifecycle_rules_have_no_about_entry() {
        let raw = "\n~~\n\n~~\nlet h = 1;\n~~\nhelper - x\n~~\n^tejs setup$\n~~\nreturn;\n~~\nsetup - y\n";
        let parsed = parse(raw);
        assert_eq!(parsed.rules.len(), 2);
        assert!(parsed.rules[0].is_helper());
        assert!(parsed.rule_abouts.is_empty());
    }

    #[test]
    fn empty_input_has_only_an_about_section() {
        let parsed = parse("");
        assert!(parsed.rules.is_empty());
        assert!(!parsed.had_errors());
    }
}
