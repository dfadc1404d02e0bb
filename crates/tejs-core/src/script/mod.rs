//! The script sandbox: a small JavaScript-subset interpreter.
//!
//! Expansion scripts are short and run once per trigger, so the sandbox is a
//! tree-walking interpreter over a parsed body. Each execution gets a fresh
//! set of globals plus whatever [`Bindings`] the caller provides.

pub mod ast;
mod builtins;
mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

pub use interp::{Exception, Interpreter};
pub use value::{NativeFn, Value};

use crate::error::SourcePosition;
use std::fmt;
use std::rc::Rc;

/// Script name used in stack frames: `at <expansion>:line:column`.
pub const SCRIPT_NAME: &str = "<expansion>";

/// Error name used by host bindings for failures that were already reported.
pub const REPORTED_ERROR_NAME: &str = "ReportedError";

pub const DEFAULT_MAX_CALL_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    Syntax,
    Runtime,
    /// A host binding failed and has already told the user.
    Reported,
}

#[derive(Debug, Clone)]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
    /// Stack text of a runtime error.
    pub stack: Option<String>,
    /// Known for syntax errors; runtime errors carry it in `stack`.
    pub position: Option<SourcePosition>,
}

impl ScriptError {
    pub fn syntax(message: impl Into<String>, position: SourcePosition) -> Self {
        ScriptError {
            kind: ScriptErrorKind::Syntax,
            message: message.into(),
            stack: None,
            position: Some(position),
        }
    }

    fn from_exception(exception: Exception) -> Self {
        let (name, message) = match &exception.value {
            Value::Object(object) if object.borrow().is_error => {
                let object = object.borrow();
                let field = |key: &str| object.get(key).map(Value::to_js_string).unwrap_or_default();
                (field("name"), exception.value.to_js_string())
            }
            other => (String::new(), format!("Uncaught {}", other.to_js_string())),
        };
        let kind = if name == REPORTED_ERROR_NAME {
            ScriptErrorKind::Reported
        } else {
            ScriptErrorKind::Runtime
        };
        ScriptError {
            kind,
            message,
            stack: Some(exception.stack),
            position: None,
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.position) {
            (ScriptErrorKind::Syntax, Some(position)) => {
                write!(f, "SyntaxError: {} ({})", self.message, position)
            }
            _ => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ScriptError {}

/// Values made visible to a script as globals.
#[derive(Default, Clone)]
pub struct Bindings {
    entries: Vec<(String, Value)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: &str, value: Value) -> Self {
        self.entries.push((name.to_string(), value));
        self
    }

    pub fn function(
        self,
        name: &str,
        func: impl Fn(&mut Interpreter, &[Value]) -> Result<Value, Exception> + 'static,
    ) -> Self {
        let func = Rc::new(func);
        self.value(
            name,
            Value::native(name, move |interp, _this, args| func(interp, args)),
        )
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

/// Parses and runs scripts.
pub trait ScriptRuntime {
    /// Parse `source` as the body of an async function without running it.
    fn check_syntax(&self, source: &str) -> Result<(), ScriptError>;

    /// Run `source` and return the value of its `return` statement.
    fn execute(&self, source: &str, bindings: Bindings) -> Result<Value, ScriptError>;
}

/// The built-in interpreter.
#[derive(Debug, Clone)]
pub struct Sandbox {
    max_call_depth: usize,
}

impl Default for Sandbox {
    fn default() -> Self {
        Sandbox {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Sandbox {
    pub fn with_max_call_depth(max_call_depth: usize) -> Self {
        Sandbox { max_call_depth }
    }
}

impl ScriptRuntime for Sandbox {
    fn check_syntax(&self, source: &str) -> Result<(), ScriptError> {
        parser::parse_script(source).map(|_| ())
    }

    fn execute(&self, source: &str, bindings: Bindings) -> Result<Value, ScriptError> {
        let body = parser::parse_script(source)?;
        let mut interp = Interpreter::new(self.max_call_depth);
        for (name, value) in bindings.entries {
            interp.define_global(&name, value);
        }
        interp.run(&body).map_err(ScriptError::from_exception)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn bindings_are_visible_as_globals() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let bindings = Bindings::new()
            .value("who", Value::from("world"))
            .function("note", move |_, args| {
                sink.borrow_mut()
                    .push(args.first().map(Value::to_js_string).unwrap_or_default());
                Ok(Value::Undefined)
            });
        let result = Sandbox::default()
            .execute("note('called');\nreturn `hello ${who}`;", bindings)
            .unwrap();
        assert_eq!(result.to_js_string(), "hello world");
        assert_eq!(*seen.borrow(), vec!["called".to_string()]);
    }

    #[test]
    fn syntax_check_reports_position() {
        let err = Sandbox::default().check_syntax("let a = ;").unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::Syntax);
        assert_eq!(err.position, Some(SourcePosition { line: 1, column: 9 }));
    }

    #[test]
    fn reported_errors_are_recognised_by_name() {
        let bindings = Bindings::new().function("fail", |interp, _| {
            Err(interp.error(REPORTED_ERROR_NAME, "already shown"))
        });
        let err = Sandbox::default().execute("fail();", bindings).unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::Reported);
    }

    #[test]
    fn runtime_errors_carry_stack_text() {
        let err = Sandbox::default()
            .execute("let a = 1;\nreturn a.b.c;", Bindings::new())
            .unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::Runtime);
        assert!(err.message.starts_with("TypeError: Cannot read properties of undefined"));
        assert!(err.stack.unwrap().contains("<expansion>:2:"));
    }
}
