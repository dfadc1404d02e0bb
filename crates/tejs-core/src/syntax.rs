//! Compiles "syntax" strings such as `roll {sides}` into regexes that match
//! the full string and every prefix of it, for incremental matching while a
//! trigger is still being typed.

use crate::error::{Result, TejsError};
use regex::Regex;

/// Regex fragment for a `{parameter}` region.
const PARAMETER_PATTERN: &str = r"(?:\S+|$)";

/// One documented shortcut, as shown to the user.
#[derive(Debug, Clone)]
pub struct SyntaxDescriptor {
    pub display_text: String,
    pub description: String,
    pub matcher: Regex,
    /// The shortcut source the about text came from.
    pub source_group: String,
}

impl SyntaxDescriptor {
    pub fn new(syntax: &str, description: &str, source_group: &str) -> Result<Self> {
        let display_text = strip_escapes(syntax);
        let matcher = compile_syntax(&display_text)?;
        Ok(SyntaxDescriptor {
            display_text,
            description: description.to_string(),
            matcher,
            source_group: source_group.to_string(),
        })
    }

    /// Whether `typed` is this syntax, or a prefix of it.
    pub fn accepts(&self, typed: &str) -> bool {
        self.matcher.is_match(typed)
    }
}

/// Remove the backslash from `\-` and `\~` escapes.
pub fn strip_escapes(syntax: &str) -> String {
    let mut result = String::with_capacity(syntax.len());
    let mut chars = syntax.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '-' || next == '~' {
                    result.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        result.push(c);
    }
    result
}

/// Compile a syntax string into an anchored matcher.
///
/// Each literal character becomes `(?:c|$)` and each `{parameter}` becomes
/// `(?:\S+|$)`, so `roll {n}` accepts `roll`, `roll ` and `roll 20`.
pub fn compile_syntax(syntax: &str) -> Result<Regex> {
    let mut pattern = String::from("^");
    let mut in_parameter = false;
    let mut buf = [0u8; 4];
    for c in syntax.chars() {
        if in_parameter {
            if c == '}' {
                in_parameter = false;
            }
            continue;
        }
        if c == '{' {
            in_parameter = true;
            pattern.push_str(PARAMETER_PATTERN);
            continue;
        }
        pattern.push_str("(?:");
        pattern.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        pattern.push_str("|$)");
    }
    pattern.push('$');

    Regex::new(&pattern).map_err(|e| TejsError::Parse {
        identity: syntax.to_string(),
        message: format!("syntax could not be compiled: {}", e),
    })
}
