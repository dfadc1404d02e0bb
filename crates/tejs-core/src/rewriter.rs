//! Source rewriting that makes selected calls implicitly awaited.
//!
//! Scripts are run as the body of an async function. Every `function` is
//! made `async` and every call to one of the configured callees is wrapped
//! as `(await callee(...))`, so script authors never write `await`
//! themselves.

use once_cell::sync::Lazy;
use regex::Regex;

static FUNCTION_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfunction\b").unwrap());

const ASYNC_PREFIX: &str = "async ";
const AWAIT_OPEN: &str = "(await ";

/// Rewrite `source` so functions are async and calls to `callees` are awaited.
pub fn rewrite_async_calls(source: &str, callees: &[&str]) -> String {
    let with_async = make_functions_async(source);
    await_calls(&with_async, callees)
}

fn make_functions_async(source: &str) -> String {
    let mut result = source.to_string();
    let starts: Vec<usize> = FUNCTION_TOKEN
        .find_iter(source)
        .map(|m| m.start())
        .filter(|&start| !preceded_by_async(source, start))
        .collect();
    // Right to left, so earlier offsets stay valid.
    for start in starts.into_iter().rev() {
        result.insert_str(start, ASYNC_PREFIX);
    }
    result
}

fn preceded_by_async(source: &str, start: usize) -> bool {
    let before = source[..start].trim_end();
    before.ends_with("async")
        && !before[..before.len() - "async".len()]
            .chars()
            .next_back()
            .is_some_and(is_identifier_char)
}

fn await_calls(source: &str, callees: &[&str]) -> String {
    let mut call_starts: Vec<usize> = Vec::new();
    for callee in callees {
        let pattern = match Regex::new(&format!(r"\b{}\(", regex::escape(callee))) {
            Ok(pattern) => pattern,
            Err(_) => continue,
        };
        call_starts.extend(
            pattern
                .find_iter(source)
                .map(|m| m.start())
                .filter(|&start| !continues_expression(source, start)),
        );
    }
    call_starts.sort_unstable();
    call_starts.dedup();

    let mut result = source.to_string();
    for start in call_starts.into_iter().rev() {
        let Some(open) = result[start..].find('(').map(|i| start + i) else {
            continue;
        };
        let Some(close) = find_call_end(&result, open) else {
            continue;
        };
        result.insert(close + 1, ')');
        result.insert_str(start, AWAIT_OPEN);
    }
    result
}

/// A name preceded by `.`, `$` or an identifier character is not a bare call.
fn continues_expression(source: &str, start: usize) -> bool {
    source[..start]
        .chars()
        .next_back()
        .is_some_and(|c| c == '.' || is_identifier_char(c))
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Find the byte index of the `)` that closes the call whose `(` is at
/// `open_paren`.
///
/// `(`, `[` and `{` nest. Inside a quoted region only the matching quote
/// closes it and brackets are ignored.
pub fn find_call_end(source: &str, open_paren: usize) -> Option<usize> {
    if source.as_bytes().get(open_paren) != Some(&b'(') {
        return None;
    }
    let mut expected: Vec<char> = vec![')'];
    let mut quoted = false;
    let mut escaped = false;

    for (offset, c) in source[open_paren + 1..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if quoted && c == '\\' {
            escaped = true;
            continue;
        }
        let top = *expected.last()?;
        if c == top {
            expected.pop();
            quoted = false;
            if expected.is_empty() {
                return Some(open_paren + 1 + offset);
            }
            continue;
        }
        if quoted {
            continue;
        }
        match c {
            '(' => expected.push(')'),
            '[' => expected.push(']'),
            '{' => expected.push('}'),
            '"' | '\'' | '`' => {
                expected.push(c);
                quoted = true;
            }
            _ => {}
        }
    }
    None
}
