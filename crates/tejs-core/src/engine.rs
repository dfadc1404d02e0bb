//! Matching triggers against the rule table and running the matched script.

use crate::context::{ExpansionContext, ResultText};
use crate::error::{Result, SourcePosition, TejsError};
use crate::external::{platform_supports_external, ExternalRunner, ShellRunner};
use crate::report::{kinds, Report, Reporter};
use crate::rewriter::rewrite_async_calls;
use crate::rules::{ShortcutRule, SharedRuleTable};
use crate::script::{
    Bindings, Interpreter, Sandbox, ScriptError, ScriptErrorKind, ScriptRuntime, Value,
    REPORTED_ERROR_NAME,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, warn};

/// Calls to these bindings are implicitly awaited.
const AWAITED_CALLEES: &[&str] = &["expand"];

/// Limit on `expand` calls nested inside scripts (and listener restarts).
pub const MAX_EXPANSION_DEPTH: usize = 8;

static STACK_POSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<expansion>:(\d+):(\d+)").unwrap());

/// Sees every completed user-triggered expansion.
pub trait ExpansionListener {
    /// Inspect or change `context`. Returning text restarts expansion on it.
    fn on_expansion(&self, context: &mut ExpansionContext) -> Option<String>;
}

/// Result of running a source's setup or shutdown script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    NotDefined,
    Succeeded,
    Failed,
}

struct EngineInner {
    table: SharedRuleTable,
    reporter: Rc<dyn Reporter>,
    runtime: Rc<dyn ScriptRuntime>,
    external: Rc<dyn ExternalRunner>,
    allow_external: Cell<bool>,
    listeners: RefCell<Vec<Rc<dyn ExpansionListener>>>,
    depth: Cell<usize>,
}

/// Cheap to clone; clones share the table, reporter and listeners.
#[derive(Clone)]
pub struct ExpansionEngine {
    inner: Rc<EngineInner>,
}

pub struct EngineBuilder {
    table: SharedRuleTable,
    reporter: Rc<dyn Reporter>,
    runtime: Option<Rc<dyn ScriptRuntime>>,
    external: Option<Rc<dyn ExternalRunner>>,
    allow_external: bool,
}

impl EngineBuilder {
    pub fn runtime(mut self, runtime: Rc<dyn ScriptRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn external_runner(mut self, runner: Rc<dyn ExternalRunner>) -> Self {
        self.external = Some(runner);
        self
    }

    pub fn allow_external(mut self, allow: bool) -> Self {
        self.allow_external = allow;
        self
    }

    pub fn build(self) -> ExpansionEngine {
        ExpansionEngine {
            inner: Rc::new(EngineInner {
                table: self.table,
                reporter: self.reporter,
                runtime: self.runtime.unwrap_or_else(|| Rc::new(Sandbox::default())),
                external: self.external.unwrap_or_else(|| Rc::new(ShellRunner::new())),
                allow_external: Cell::new(self.allow_external),
                listeners: RefCell::new(Vec::new()),
                depth: Cell::new(0),
            }),
        }
    }
}

/// Decrements the nesting depth when an expansion unwinds.
struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl ExpansionEngine {
    pub fn builder(table: SharedRuleTable, reporter: Rc<dyn Reporter>) -> EngineBuilder {
        EngineBuilder {
            table,
            reporter,
            runtime: None,
            external: None,
            allow_external: false,
        }
    }

    pub fn new(table: SharedRuleTable, reporter: Rc<dyn Reporter>) -> Self {
        Self::builder(table, reporter).build()
    }

    pub fn table(&self) -> &SharedRuleTable {
        &self.inner.table
    }

    pub fn reporter(&self) -> &Rc<dyn Reporter> {
        &self.inner.reporter
    }

    pub fn set_allow_external(&self, allow: bool) {
        self.inner.allow_external.set(allow);
    }

    pub fn add_listener(&self, listener: Rc<dyn ExpansionListener>) {
        self.inner.listeners.borrow_mut().push(listener);
    }

    /// Expand `trigger` into text.
    ///
    /// `Ok(None)` means nothing matched or the expansion was cancelled. The
    /// only error is [`TejsError::AlreadyReported`]: the failure has been
    /// reported already, or `fail_silently` suppressed the report.
    pub fn expand(
        &self,
        trigger: &str,
        fail_silently: bool,
        context: Option<&mut ExpansionContext>,
    ) -> Result<Option<String>> {
        let mut default_context;
        let context = match context {
            Some(context) => context,
            None => {
                default_context = ExpansionContext::for_text(trigger);
                &mut default_context
            }
        };
        self.expand_in(trigger, fail_silently, context)
    }

    fn expand_in(
        &self,
        trigger: &str,
        fail_silently: bool,
        context: &mut ExpansionContext,
    ) -> Result<Option<String>> {
        let depth = &self.inner.depth;
        if depth.get() >= MAX_EXPANSION_DEPTH {
            if !fail_silently {
                self.report(
                    Report::error(format!(
                        "Expansion of \"{}\" nested more than {} levels deep",
                        trigger, MAX_EXPANSION_DEPTH
                    ))
                    .kind(kinds::SCRIPT_RUNTIME),
                );
            }
            return Err(TejsError::AlreadyReported);
        }
        depth.set(depth.get() + 1);
        let _guard = DepthGuard(depth);

        let script = {
            let table = self.inner.table.snapshot();
            assemble_script(&table.rules, trigger)
        };
        let Some(script) = script else {
            debug!(trigger, "no shortcut matched");
            if !fail_silently {
                self.report(
                    Report::warning(TejsError::NoMatch(trigger.to_string()).to_string())
                        .kind(kinds::NO_MATCH),
                );
            }
            return Ok(None);
        };

        let result = self.run_script(&script, fail_silently, context)?;
        context.result_text = Some(result);

        if context.is_user_triggered && !context.cancel {
            let listeners = self.inner.listeners.borrow().clone();
            for listener in listeners {
                if let Some(replacement) = listener.on_expansion(context) {
                    debug!(trigger, replacement, "listener replaced expansion input");
                    context.result_text = None;
                    context.trigger_text = replacement.clone();
                    return self.expand_in(&replacement, false, context);
                }
            }
        }

        if context.cancel {
            return Ok(None);
        }
        Ok(context.result_text.as_ref().map(ResultText::to_text))
    }

    /// Run an already-assembled script and return its text.
    pub fn run_expansion_script(
        &self,
        script: &str,
        fail_silently: bool,
        context: &mut ExpansionContext,
    ) -> Result<String> {
        self.run_script(script, fail_silently, context)
            .map(|result| result.to_text())
    }

    fn run_script(
        &self,
        script: &str,
        fail_silently: bool,
        context: &mut ExpansionContext,
    ) -> Result<ResultText> {
        let source = rewrite_async_calls(script, AWAITED_CALLEES);

        if let Err(err) = self.inner.runtime.check_syntax(&source) {
            if !fail_silently {
                self.report_script_error(&source, &err);
            }
            return Err(TejsError::AlreadyReported);
        }

        let info = context.to_script_value();
        let outcome = self
            .inner
            .runtime
            .execute(&source, self.bindings(info.clone()));
        context.absorb_script_value(&info);

        match outcome {
            Ok(value) => Ok(ResultText::from_script_value(&value)),
            Err(err) => {
                if err.kind != ScriptErrorKind::Reported && !fail_silently {
                    self.report_script_error(&source, &err);
                }
                Err(TejsError::AlreadyReported)
            }
        }
    }

    /// Run the rule matching `trigger` within one source, silently.
    pub fn run_lifecycle_script(&self, rules: &[ShortcutRule], trigger: &str) -> LifecycleOutcome {
        let Some(script) = assemble_script(rules, trigger) else {
            return LifecycleOutcome::NotDefined;
        };
        let mut context = ExpansionContext::for_text(trigger);
        match self.run_script(&script, true, &mut context) {
            Ok(_) => LifecycleOutcome::Succeeded,
            Err(_) => LifecycleOutcome::Failed,
        }
    }

    fn bindings(&self, info: Value) -> Bindings {
        let engine = self.clone();
        let expand = move |interp: &mut Interpreter, args: &[Value]| {
            let text = args.first().map(Value::to_js_string).unwrap_or_default();
            let silent = args.get(1).is_some_and(Value::truthy);
            match engine.expand(&text, silent, None) {
                Ok(Some(result)) => Ok(Value::Str(result)),
                Ok(None) => Ok(Value::Null),
                Err(_) if silent => Ok(Value::Null),
                Err(_) => Err(interp.error(REPORTED_ERROR_NAME, format!("expand(\"{}\") failed", text))),
            }
        };

        let engine = self.clone();
        let run_external = move |interp: &mut Interpreter, args: &[Value]| {
            let command = args.first().map(Value::to_js_string).unwrap_or_default();
            let silent = args.get(1).is_some_and(Value::truthy);
            engine.run_external(&command, silent).map_err(|message| {
                interp.error(REPORTED_ERROR_NAME, message)
            })
        };

        let engine = self.clone();
        let print = move |_: &mut Interpreter, args: &[Value]| {
            let message = args
                .iter()
                .map(Value::to_js_string)
                .collect::<Vec<_>>()
                .join(" ");
            engine.report(Report::info(message).kind(kinds::PRINT));
            Ok(Value::Undefined)
        };

        Bindings::new()
            .function("expand", expand)
            .function("runExternal", run_external)
            .function("print", print)
            .value("expansionInfo", info)
    }

    /// `Err` carries the message for the error thrown into the script.
    fn run_external(&self, command: &str, fail_silently: bool) -> std::result::Result<Value, String> {
        if !self.inner.allow_external.get() || !platform_supports_external() {
            let err = TejsError::Permission(format!(
                "runExternal(\"{}\") is disabled; enable allow_external in the settings",
                command
            ));
            // Permission failures are reported even when silenced.
            self.report(Report::error(err.to_string()).kind(kinds::PERMISSION));
            return Err(err.to_string());
        }
        match self.inner.external.run(command) {
            Ok(output) => Ok(Value::Str(output)),
            Err(_) if fail_silently => Ok(Value::Null),
            Err(e) => {
                warn!(command, error = %e, "external command failed");
                self.report(
                    Report::error(format!("runExternal(\"{}\") failed", command))
                        .console(e.to_string())
                        .kind(kinds::SCRIPT_RUNTIME),
                );
                Err(e.to_string())
            }
        }
    }

    fn report(&self, report: Report) {
        self.inner.reporter.report(report);
    }

    fn report_script_error(&self, source: &str, err: &ScriptError) {
        let (kind, title) = match err.kind {
            ScriptErrorKind::Syntax => (kinds::SCRIPT_SYNTAX, "Shortcut script has a syntax error"),
            _ => (kinds::SCRIPT_RUNTIME, "Shortcut script failed"),
        };
        let position = error_position(err);
        let location = position.map(|p| format!(" at {}", p)).unwrap_or_default();
        let detail = match err.kind {
            ScriptErrorKind::Syntax => format!("SyntaxError: {}", err.message),
            _ => err.message.clone(),
        };
        let console = format!(
            "{}{}: {}\n\n{}",
            title,
            location,
            detail,
            script_listing(source, position)
        );
        self.report(
            Report::error(format!("{}{}: {}", title, location, detail))
                .console(console)
                .kind(kind)
                .with_details(),
        );
    }
}

/// Build the script for the first non-helper rule matching `trigger`: the
/// helper scripts gathered so far, then `let $N = ...;` for each capture
/// group, then the rule's own script.
pub fn assemble_script(rules: &[ShortcutRule], trigger: &str) -> Option<String> {
    let mut helpers = String::new();
    for rule in rules {
        let Some(test) = &rule.test else {
            if rule.is_helper_blocker() {
                helpers.clear();
            } else {
                helpers.push_str(&rule.expansion);
                helpers.push('\n');
            }
            continue;
        };
        let Some(captures) = test.captures(trigger) else {
            continue;
        };
        let mut script = helpers;
        for index in 1..captures.len() {
            let binding = captures.get(index).map_or_else(
                || "undefined".to_string(),
                |group| serde_json::Value::from(group.as_str()).to_string(),
            );
            script.push_str(&format!("let ${} = {};\n", index, binding));
        }
        script.push_str(&rule.expansion);
        return Some(script);
    }
    None
}

/// The position of a syntax error, or the first script frame of a runtime
/// error's stack.
pub fn error_position(err: &ScriptError) -> Option<SourcePosition> {
    if err.position.is_some() {
        return err.position;
    }
    let stack = err.stack.as_deref()?;
    let captures = STACK_POSITION.captures(stack)?;
    Some(SourcePosition {
        line: captures[1].parse().ok()?,
        column: captures[2].parse().ok()?,
    })
}

/// Number every line of `source`. The line at `position` gets a dashed
/// marker line above it and a caret under the column.
pub fn script_listing(source: &str, position: Option<SourcePosition>) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let width = lines.len().max(1).to_string().len();
    let mut listing = Vec::with_capacity(lines.len() + 2);
    for (index, line) in lines.iter().enumerate() {
        let number = index + 1;
        let is_error_line = position.is_some_and(|p| p.line == number);
        if is_error_line {
            listing.push(format!(
                "{} | {}",
                "-".repeat(width),
                "-".repeat(line.chars().count().max(1))
            ));
        }
        listing.push(format!("{:>width$} | {}", number, line, width = width));
        if let (true, Some(position)) = (is_error_line, position) {
            listing.push(format!(
                "{} | {}^",
                " ".repeat(width),
                " ".repeat(position.column.saturating_sub(1))
            ));
        }
    }
    listing.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RecordingReporter;
    use crate::rules::RuleTable;

    fn rule(pattern: &str, script: &str) -> ShortcutRule {
        let test = (!pattern.is_empty()).then(|| Regex::new(pattern).unwrap());
        ShortcutRule::new(test, script)
    }

    fn engine_with(rules: Vec<ShortcutRule>) -> (ExpansionEngine, Rc<RecordingReporter>) {
        let mut table = RuleTable::new();
        table.push_source("settings", "", rules, Vec::new());
        let reporter = Rc::new(RecordingReporter::new());
        let engine = ExpansionEngine::new(SharedRuleTable::new(table), reporter.clone());
        (engine, reporter)
    }

    #[test]
    fn assemble_binds_capture_groups_after_helpers() {
        let rules = vec![
            rule("", "const greet = 'hi';"),
            rule("^(a)(b)?(c)$", "return $1;"),
        ];
        let script = assemble_script(&rules, "ac").unwrap();
        assert_eq!(
            script,
            "const greet = 'hi';\nlet $1 = \"a\";\nlet $2 = undefined;\nlet $3 = \"c\";\nreturn $1;"
        );
    }

    #[test]
    fn helper_blocker_clears_earlier_helpers() {
        let rules = vec![
            rule("", "let a = 1;"),
            rule("", "   "),
            rule("", "let b = 2;"),
            rule("^x$", "return b;"),
        ];
        assert_eq!(assemble_script(&rules, "x").unwrap(), "let b = 2;\nreturn b;");
    }

    #[test]
    fn first_match_wins() {
        let (engine, _) = engine_with(vec![rule("^a", "return 1;"), rule("^ab$", "return 2;")]);
        assert_eq!(engine.expand("ab", false, None).unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn capture_values_are_json_escaped() {
        let (engine, _) = engine_with(vec![rule("^say (.*)$", "return $1;")]);
        let result = engine.expand(r#"say "quoted" \ text"#, false, None).unwrap();
        assert_eq!(result.as_deref(), Some(r#""quoted" \ text"#));
    }

    #[test]
    fn nested_expand_is_awaited_and_composed() {
        let (engine, _) = engine_with(vec![
            rule("^inner$", "return 'in';"),
            rule("^outer$", "return '[' + expand('inner') + ']';"),
        ]);
        assert_eq!(engine.expand("outer", false, None).unwrap().as_deref(), Some("[in]"));
    }

    #[test]
    fn nested_failure_is_reported_once() {
        let (engine, reporter) = engine_with(vec![
            rule("^inner$", "throw new Error('inner broke');"),
            rule("^outer$", "return expand('inner');"),
        ]);
        assert!(engine.expand("outer", false, None).unwrap_err().is_already_reported());
        assert_eq!(reporter.count_of(kinds::SCRIPT_RUNTIME), 1);
        assert!(reporter.reports()[0]
            .popup_message
            .as_deref()
            .unwrap()
            .contains("inner broke"));
    }

    #[test]
    fn silent_nested_failure_returns_null() {
        let (engine, reporter) = engine_with(vec![
            rule("^outer$", "return expand('missing', true) === null ? 'none' : 'some';"),
        ]);
        assert_eq!(engine.expand("outer", false, None).unwrap().as_deref(), Some("none"));
        assert!(reporter.reports().is_empty());
    }

    #[test]
    fn syntax_error_listing_marks_the_line() {
        let (engine, reporter) = engine_with(vec![rule("^x$", "let a = 1;\nreturn a +;")]);
        assert!(engine.expand("x", false, None).is_err());
        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message_type.as_deref(), Some(kinds::SCRIPT_SYNTAX));
        assert!(reports[0].console_has_details);
        let console = reports[0].console_message.as_deref().unwrap();
        assert!(console.contains("at line 2, column 11"));
        let expected = format!("- | {}\n2 | return a +;\n  | {}^", "-".repeat(11), " ".repeat(10));
        assert!(console.ends_with(&expected));
    }

    #[test]
    fn silent_syntax_error_is_not_reported() {
        let (engine, reporter) = engine_with(vec![rule("^x$", "return (;")]);
        assert!(engine.expand("x", true, None).unwrap_err().is_already_reported());
        assert!(reporter.reports().is_empty());
    }

    #[test]
    fn runtime_error_position_comes_from_stack() {
        let (engine, reporter) = engine_with(vec![rule("^x$", "let a;\n\nreturn a.b;")]);
        assert!(engine.expand("x", false, None).is_err());
        let report = &reporter.reports()[0];
        assert_eq!(report.message_type.as_deref(), Some(kinds::SCRIPT_RUNTIME));
        let popup = report.popup_message.as_deref().unwrap();
        assert!(popup.contains("at line 3, column"));
        assert!(popup.contains("TypeError"));
    }

    #[test]
    fn run_external_is_refused_when_disabled_even_silently() {
        let (engine, reporter) = engine_with(vec![rule("^x$", "return runExternal('echo hi', true);")]);
        assert!(engine.expand("x", true, None).is_err());
        assert_eq!(reporter.count_of(kinds::PERMISSION), 1);
        assert_eq!(reporter.reports().len(), 1);
    }

    struct FakeRunner;

    impl ExternalRunner for FakeRunner {
        fn run(&self, command: &str) -> Result<String> {
            match command {
                "fail" => Err(TejsError::Other("boom".into())),
                other => Ok(format!("ran {}", other)),
            }
        }
    }

    #[test]
    fn run_external_uses_the_runner_when_allowed() {
        let mut table = RuleTable::new();
        table.push_source(
            "settings",
            "",
            vec![
                rule("^x$", "return runExternal('date');"),
                rule("^y$", "return runExternal('fail', true) ?? 'fallback';"),
            ],
            Vec::new(),
        );
        let reporter = Rc::new(RecordingReporter::new());
        let engine = ExpansionEngine::builder(SharedRuleTable::new(table), reporter.clone())
            .external_runner(Rc::new(FakeRunner))
            .allow_external(true)
            .build();
        assert_eq!(engine.expand("x", false, None).unwrap().as_deref(), Some("ran date"));
        assert_eq!(engine.expand("y", false, None).unwrap().as_deref(), Some("fallback"));
        assert!(reporter.reports().is_empty());
    }

    #[test]
    fn print_sends_an_info_report() {
        let (engine, reporter) = engine_with(vec![rule("^x$", "print('hello', 2);\nreturn 'ok';")]);
        assert_eq!(engine.expand("x", false, None).unwrap().as_deref(), Some("ok"));
        let reports = reporter.reports();
        assert_eq!(reports[0].message_type.as_deref(), Some(kinds::PRINT));
        assert_eq!(reports[0].popup_message.as_deref(), Some("hello 2"));
    }

    #[test]
    fn cancel_forces_none_and_keeps_context_changes() {
        let (engine, _) = engine_with(vec![rule("^x$", "expansionInfo.cancel = true;\nreturn 'x';")]);
        let mut context = ExpansionContext::for_text("x");
        assert_eq!(engine.expand("x", false, Some(&mut context)).unwrap(), None);
        assert!(context.cancel);
    }

    #[test]
    fn array_results_are_concatenated() {
        let (engine, _) = engine_with(vec![rule("^x$", "return ['a', 1, 'b'];")]);
        let mut context = ExpansionContext::for_text("x");
        let result = engine.expand("x", false, Some(&mut context)).unwrap();
        assert_eq!(result.as_deref(), Some("a1b"));
        assert_eq!(
            context.result_text,
            Some(ResultText::Lines(vec!["a".into(), "1".into(), "b".into()]))
        );
    }

    struct Redirect;

    impl ExpansionListener for Redirect {
        fn on_expansion(&self, context: &mut ExpansionContext) -> Option<String> {
            (context.trigger_text == "old").then(|| "new".to_string())
        }
    }

    #[test]
    fn listener_replacement_restarts_expansion() {
        let (engine, _) = engine_with(vec![
            rule("^old$", "return 'stale';"),
            rule("^new$", "return 'fresh';"),
        ]);
        engine.add_listener(Rc::new(Redirect));
        let mut context = ExpansionContext {
            is_user_triggered: true,
            ..ExpansionContext::for_text("old")
        };
        let result = engine.expand("old", false, Some(&mut context)).unwrap();
        assert_eq!(result.as_deref(), Some("fresh"));
    }

    #[test]
    fn unbounded_recursion_stops_at_the_depth_limit() {
        let (engine, reporter) = engine_with(vec![rule("^loop$", "return expand('loop');")]);
        assert!(engine.expand("loop", false, None).is_err());
        assert_eq!(reporter.count_of(kinds::SCRIPT_RUNTIME), 1);
    }
}
