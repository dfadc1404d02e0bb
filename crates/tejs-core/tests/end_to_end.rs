use std::fs;
use std::rc::Rc;

use tejs_core::report::{kinds, RecordingReporter};
use tejs_core::{
    parse_shortcut_file, ExpansionEngine, FsStore, ParseOptions, RuleTable, SharedRuleTable,
    ShortcutLoader,
};

fn engine_for(shortcuts: &str) -> (ExpansionEngine, Rc<RecordingReporter>) {
    let parsed = parse_shortcut_file("test", shortcuts, ParseOptions::default());
    assert!(!parsed.had_errors(), "{:?}", parsed.issues);
    let mut table = RuleTable::new();
    table.push_source("test", &parsed.file_about, parsed.rules, Vec::new());
    let reporter = Rc::new(RecordingReporter::new());
    let engine = ExpansionEngine::new(SharedRuleTable::new(table), reporter.clone());
    (engine, reporter)
}

/// Join an about section and (pattern, script, about) triples with `~~` lines.
fn shortcut_text(about: &str, rules: &[(&str, &str, &str)]) -> String {
    let mut sections = vec![about.to_string()];
    for (pattern, script, about) in rules {
        sections.extend([pattern.to_string(), script.to_string(), about.to_string()]);
    }
    sections.join("\n~~\n")
}

const SHORTCUTS: &str = r#"Test shortcuts
~~
^hi$
~~
return "Hello!";
~~
hi - greeting
~~
^d([0-9]+)$
~~
return Number($1) + 1;
~~
d{n} - one more than n
"#;

#[test]
fn literal_rule_expands() {
    let (engine, reporter) = engine_for(SHORTCUTS);
    assert_eq!(engine.expand("hi", false, None).unwrap().as_deref(), Some("Hello!"));
    assert!(reporter.reports().is_empty());
}

#[test]
fn capture_group_is_bound_to_dollar_one() {
    let (engine, _) = engine_for(SHORTCUTS);
    assert_eq!(engine.expand("d41", false, None).unwrap().as_deref(), Some("42"));
}

#[test]
fn unmatched_trigger_reports_one_no_match() {
    let (engine, reporter) = engine_for(SHORTCUTS);
    assert_eq!(engine.expand("xyz", false, None).unwrap(), None);
    assert_eq!(reporter.reports().len(), 1);
    assert_eq!(reporter.count_of(kinds::NO_MATCH), 1);

    assert_eq!(engine.expand("xyz", true, None).unwrap(), None);
    assert_eq!(reporter.reports().len(), 1);
}

#[test]
fn helpers_before_a_blocker_are_dropped() {
    let shortcuts = shortcut_text(
        "",
        &[
            ("", "function a() { return 'A'; }", ""),
            ("", "", ""),
            ("", "function b() { return 'B'; }", ""),
            ("^r$", "return typeof a + ':' + b();", ""),
        ],
    );
    let (engine, reporter) = engine_for(&shortcuts);
    assert_eq!(
        engine.expand("r", false, None).unwrap().as_deref(),
        Some("undefined:B")
    );
    assert!(reporter.reports().is_empty());
}

#[test]
fn helper_functions_can_call_expand() {
    let shortcuts = shortcut_text(
        "",
        &[
            ("", "async function twice(t) { return expand(t) + expand(t); }", ""),
            ("^one$", "return '1';", ""),
            ("^two$", "return twice('one');", ""),
        ],
    );
    let (engine, _) = engine_for(&shortcuts);
    assert_eq!(engine.expand("two", false, None).unwrap().as_deref(), Some("11"));
}

#[test]
fn runtime_error_names_the_line() {
    let shortcuts = shortcut_text("", &[("^boom$", "let x = 1;\nreturn missing + x;", "")]);
    let (engine, reporter) = engine_for(&shortcuts);
    let err = engine.expand("boom", false, None).unwrap_err();
    assert!(err.is_already_reported());
    let report = &reporter.reports()[0];
    assert_eq!(report.message_type.as_deref(), Some(kinds::SCRIPT_RUNTIME));
    let popup = report.popup_message.as_deref().unwrap();
    assert!(popup.contains("ReferenceError: missing is not defined"), "{}", popup);
    assert!(popup.contains("line 2, column 8"), "{}", popup);
}

#[test]
fn loader_reads_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("dice.md"), SHORTCUTS).unwrap();
    let reporter = Rc::new(RecordingReporter::new());
    let engine = ExpansionEngine::new(SharedRuleTable::default(), reporter.clone());
    let loader = ShortcutLoader::new(Rc::new(FsStore::new(dir.path())), engine.clone());

    let summary = loader.rebuild("", &["dice.md".to_string()]);
    assert_eq!(summary.rule_count, 2);
    assert!(reporter.reports().is_empty());
    assert_eq!(engine.expand("d9", false, None).unwrap().as_deref(), Some("10"));

    let table = engine.table().snapshot();
    let typed: Vec<_> = table
        .matching_syntaxes("d")
        .map(|s| s.display_text.as_str())
        .collect();
    assert_eq!(typed, vec!["d{n}"]);
}
