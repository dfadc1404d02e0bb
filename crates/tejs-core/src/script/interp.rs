//! Tree-walking evaluator.

use super::ast::*;
use super::builtins;
use super::value::{Function, Object, Value, MAX_ARRAY_LENGTH, MAX_STRING_LENGTH};
use super::SCRIPT_NAME;
use crate::error::SourcePosition;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// A thrown script value, with the stack text captured where it was thrown.
#[derive(Debug, Clone)]
pub struct Exception {
    pub value: Value,
    pub stack: String,
}

pub struct Scope {
    vars: RefCell<HashMap<String, Slot>>,
    parent: Option<Rc<Scope>>,
}

struct Slot {
    value: Value,
    mutable: bool,
}

impl Scope {
    fn new(parent: Option<Rc<Scope>>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent,
        })
    }

    fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.vars
            .borrow_mut()
            .insert(name.to_string(), Slot { value, mutable });
    }

    /// A sibling scope holding copies of this scope's bindings.
    fn fork(&self) -> Rc<Scope> {
        let vars = self
            .vars
            .borrow()
            .iter()
            .map(|(name, slot)| {
                let copy = Slot {
                    value: slot.value.clone(),
                    mutable: slot.mutable,
                };
                (name.clone(), copy)
            })
            .collect();
        Rc::new(Scope {
            vars: RefCell::new(vars),
            parent: self.parent.clone(),
        })
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(slot) = self.vars.borrow().get(name) {
            return Some(slot.value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }

    /// `Ok(false)` when no scope declares `name`; `Err(())` for a const.
    fn assign(&self, name: &str, value: Value) -> Result<bool, ()> {
        if let Some(slot) = self.vars.borrow_mut().get_mut(name) {
            if !slot.mutable {
                return Err(());
            }
            slot.value = value;
            return Ok(true);
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Ok(false),
        }
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

struct Frame {
    name: Option<String>,
    call_site: SourcePosition,
}

pub struct Interpreter {
    global: Rc<Scope>,
    frames: Vec<Frame>,
    max_call_depth: usize,
    /// Position of the call or `new` currently dispatching to a native.
    call_pos: SourcePosition,
    /// Scopes captured by closures; cleared on drop to break `Rc` cycles.
    captured: Vec<Weak<Scope>>,
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        for scope in self.captured.drain(..).filter_map(|weak| weak.upgrade()) {
            scope.vars.borrow_mut().clear();
        }
        self.global.vars.borrow_mut().clear();
    }
}

impl Interpreter {
    pub fn new(max_call_depth: usize) -> Self {
        let mut interp = Interpreter {
            global: Scope::new(None),
            frames: Vec::new(),
            max_call_depth,
            call_pos: SourcePosition { line: 1, column: 1 },
            captured: Vec::new(),
        };
        builtins::install_globals(&mut interp);
        interp
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.global.declare(name, value, true);
    }

    /// Run a script body as the body of an (async) function.
    pub fn run(&mut self, body: &[Stmt]) -> Result<Value, Exception> {
        let scope = Scope::new(Some(self.global.clone()));
        match self.exec_block(body, &scope)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    /// Stack text in the `    at name (<expansion>:line:col)` format.
    fn stack_trace(&self, pos: SourcePosition) -> String {
        let mut lines = Vec::with_capacity(self.frames.len() + 1);
        let mut location = pos;
        for depth in (0..=self.frames.len()).rev() {
            let name = depth
                .checked_sub(1)
                .and_then(|index| self.frames[index].name.as_deref());
            lines.push(match name {
                Some(name) => format!(
                    "    at {} ({}:{}:{})",
                    name, SCRIPT_NAME, location.line, location.column
                ),
                None => format!("    at {}:{}:{}", SCRIPT_NAME, location.line, location.column),
            });
            if depth > 0 {
                location = self.frames[depth - 1].call_site;
            }
        }
        lines.join("\n")
    }

    /// Build an `Error` object of the given name, as `new Error(message)`
    /// at `pos` would.
    pub fn make_error_at(&self, name: &str, message: &str, pos: SourcePosition) -> Value {
        let header = if message.is_empty() {
            name.to_string()
        } else {
            format!("{}: {}", name, message)
        };
        let stack = format!("{}\n{}", header, self.stack_trace(pos));
        Value::Object(Rc::new(RefCell::new(Object {
            properties: vec![
                ("name".to_string(), Value::from(name)),
                ("message".to_string(), Value::from(message)),
                ("stack".to_string(), Value::Str(stack)),
            ],
            is_error: true,
        })))
    }

    pub fn make_error(&self, name: &str, message: &str) -> Value {
        self.make_error_at(name, message, self.call_pos)
    }

    /// An exception for a new `Error` raised by a native function.
    pub fn error(&self, name: &str, message: impl Into<String>) -> Exception {
        self.throw_at(self.make_error(name, &message.into()), self.call_pos)
    }

    /// `binary`, with a `RangeError` instead of an oversized string.
    fn binary_at(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        pos: SourcePosition,
    ) -> Result<Value, Exception> {
        let too_long = || self.error_at("RangeError", "Invalid string length", pos);
        if let (BinaryOp::Add, Value::Str(l), Value::Str(r)) = (op, left, right) {
            if l.len() + r.len() > MAX_STRING_LENGTH {
                return Err(too_long());
            }
        }
        match binary(op, left, right) {
            Value::Str(s) if s.len() > MAX_STRING_LENGTH => Err(too_long()),
            value => Ok(value),
        }
    }

    fn error_at(&self, name: &str, message: impl Into<String>, pos: SourcePosition) -> Exception {
        self.throw_at(self.make_error_at(name, &message.into(), pos), pos)
    }

    fn throw_at(&self, value: Value, pos: SourcePosition) -> Exception {
        let stack = match &value {
            Value::Object(object) if object.borrow().is_error => object
                .borrow()
                .get("stack")
                .map(Value::to_js_string)
                .unwrap_or_default(),
            other => format!("Uncaught {}\n{}", other.to_js_string(), self.stack_trace(pos)),
        };
        Exception { value, stack }
    }

    fn make_closure(&mut self, def: &Rc<FunctionDef>, env: &Rc<Scope>) -> Value {
        self.captured.push(Rc::downgrade(env));
        Value::Function(Rc::new(Function::Closure {
            def: def.clone(),
            env: env.clone(),
        }))
    }

    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> Result<Value, Exception> {
        let pos = self.call_pos;
        self.call_at(callee, this, args, pos)
    }

    fn call_at(
        &mut self,
        callee: &Value,
        this: &Value,
        args: &[Value],
        pos: SourcePosition,
    ) -> Result<Value, Exception> {
        let Value::Function(function) = callee else {
            return Err(self.error_at(
                "TypeError",
                format!("{} is not a function", callee.to_js_string()),
                pos,
            ));
        };
        match function.as_ref() {
            Function::Native { func, .. } => {
                let saved = self.call_pos;
                self.call_pos = pos;
                let result = func(self, this, args);
                self.call_pos = saved;
                result
            }
            Function::Closure { def, env } => {
                if self.frames.len() >= self.max_call_depth {
                    return Err(self.error_at(
                        "RangeError",
                        "Maximum call stack size exceeded",
                        pos,
                    ));
                }
                let scope = Scope::new(Some(env.clone()));
                for (index, param) in def.params.iter().enumerate() {
                    let value = args.get(index).cloned().unwrap_or(Value::Undefined);
                    scope.declare(param, value, true);
                }
                self.frames.push(Frame {
                    name: def.name.clone(),
                    call_site: pos,
                });
                let result = match &def.body {
                    FunctionBody::Block(body) => match self.exec_block(body, &scope) {
                        Ok(Flow::Return(value)) => Ok(value),
                        Ok(_) => Ok(Value::Undefined),
                        Err(e) => Err(e),
                    },
                    FunctionBody::Expr(expr) => self.eval(expr, &scope),
                };
                self.frames.pop();
                result
            }
        }
    }

    fn hoist(&mut self, body: &[Stmt], scope: &Rc<Scope>) {
        for stmt in body {
            if let StmtKind::Function(def) = &stmt.kind {
                if let Some(name) = &def.name {
                    let closure = self.make_closure(def, scope);
                    scope.declare(name, closure, true);
                }
            }
        }
    }

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> Result<Flow, Exception> {
        self.hoist(body, scope);
        for stmt in body {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow, Exception> {
        match &stmt.kind {
            StmtKind::Declare { mutable, names } => {
                for (name, init) in names {
                    let value = match init {
                        Some(expr) => self.eval(expr, scope)?,
                        None => Value::Undefined,
                    };
                    scope.declare(name, value, *mutable);
                }
                Ok(Flow::Normal)
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::If {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.exec_nested(then, scope)
                } else if let Some(otherwise) = otherwise {
                    self.exec_nested(otherwise, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { test, body } => {
                while self.eval(test, scope)?.truthy() {
                    match self.exec_nested(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::DoWhile { body, test } => {
                loop {
                    match self.exec_nested(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if !self.eval(test, scope)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                let mut loop_scope = Scope::new(Some(scope.clone()));
                if let Some(init) = init {
                    self.exec(init, &loop_scope)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.eval(test, &loop_scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec_nested(body, &loop_scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    // Each iteration gets its own copy of the loop variables
                    // so closures keep the value of their iteration.
                    loop_scope = loop_scope.fork();
                    if let Some(update) = update {
                        self.eval(update, &loop_scope)?;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::ForOf {
                mutable,
                name,
                iterable,
                body,
            } => {
                let items = match self.eval(iterable, scope)? {
                    Value::Array(items) => items.borrow().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => {
                        return Err(self.error_at(
                            "TypeError",
                            format!("{} is not iterable", other.to_js_string()),
                            iterable.pos,
                        ))
                    }
                };
                for item in items {
                    let iteration = Scope::new(Some(scope.clone()));
                    iteration.declare(name, item, *mutable);
                    match self.exec_nested(body, &iteration)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => self.exec_switch(discriminant, cases, scope),
            StmtKind::Block(body) => {
                let block_scope = Scope::new(Some(scope.clone()));
                self.exec_block(body, &block_scope)
            }
            // Hoisted when the enclosing block was entered.
            StmtKind::Function(_) => Ok(Flow::Normal),
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Throw(expr) => {
                let value = self.eval(expr, scope)?;
                Err(self.throw_at(value, stmt.pos))
            }
            StmtKind::Try {
                body,
                param,
                handler,
                finalizer,
            } => {
                let block_scope = Scope::new(Some(scope.clone()));
                let outcome = match (self.exec_block(body, &block_scope), handler) {
                    (Err(exception), Some(handler)) => {
                        let catch_scope = Scope::new(Some(scope.clone()));
                        if let Some(param) = param {
                            catch_scope.declare(param, exception.value, true);
                        }
                        self.exec_block(handler, &catch_scope)
                    }
                    (outcome, _) => outcome,
                };
                if let Some(finalizer) = finalizer {
                    let finally_scope = Scope::new(Some(scope.clone()));
                    match self.exec_block(finalizer, &finally_scope)? {
                        Flow::Normal => {}
                        other => return Ok(other),
                    }
                }
                outcome
            }
            StmtKind::Empty => Ok(Flow::Normal),
        }
    }

    /// Execute a statement that forms the body of a compound statement.
    fn exec_nested(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow, Exception> {
        match &stmt.kind {
            StmtKind::Block(body) => {
                let block_scope = Scope::new(Some(scope.clone()));
                self.exec_block(body, &block_scope)
            }
            _ => self.exec(stmt, scope),
        }
    }

    fn exec_switch(
        &mut self,
        discriminant: &Expr,
        cases: &[SwitchCase],
        scope: &Rc<Scope>,
    ) -> Result<Flow, Exception> {
        let value = self.eval(discriminant, scope)?;
        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval(test, scope)?.strict_equals(&value) {
                    start = Some(index);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));
        let Some(start) = start else {
            return Ok(Flow::Normal);
        };
        let switch_scope = Scope::new(Some(scope.clone()));
        for case in &cases[start..] {
            match self.exec_block(&case.body, &switch_scope)? {
                Flow::Normal => {}
                Flow::Break => break,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, Exception> {
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Num(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Template(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(chunk) => text.push_str(chunk),
                        TemplatePart::Expr(expr) => {
                            text.push_str(&self.eval(expr, scope)?.to_js_string())
                        }
                    }
                    if text.len() > MAX_STRING_LENGTH {
                        return Err(self.error_at("RangeError", "Invalid string length", expr.pos));
                    }
                }
                Ok(Value::Str(text))
            }
            ExprKind::Ident(name) => self.lookup(name, scope, expr.pos),
            ExprKind::Array(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.eval(element, scope)?);
                }
                Ok(Value::array(items))
            }
            ExprKind::Object(properties) => {
                let mut object = Object::default();
                for (key, value) in properties {
                    let value = self.eval(value, scope)?;
                    object.set(key, value);
                }
                Ok(Value::Object(Rc::new(RefCell::new(object))))
            }
            ExprKind::Function(def) => Ok(self.make_closure(def, scope)),
            ExprKind::Unary(op, operand) => {
                if *op == UnaryOp::Typeof {
                    if let ExprKind::Ident(name) = &operand.kind {
                        let value = scope.lookup(name).unwrap_or(Value::Undefined);
                        return Ok(Value::from(value.type_of()));
                    }
                }
                let value = self.eval(operand, scope)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Typeof => Value::from(value.type_of()),
                    UnaryOp::Void => Value::Undefined,
                })
            }
            ExprKind::Binary(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary_at(*op, &left, &right, expr.pos)
            }
            ExprKind::Logical(op, left, right) => {
                let left = self.eval(left, scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            ExprKind::Conditional(test, consequent, alternate) => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            ExprKind::Assign(op, target, value) => {
                let value = match op.binary() {
                    None => self.eval(value, scope)?,
                    Some(binary_op) => {
                        let current = self.eval(target, scope)?;
                        let rhs = self.eval(value, scope)?;
                        self.binary_at(binary_op, &current, &rhs, expr.pos)?
                    }
                };
                self.assign(target, value.clone(), scope)?;
                Ok(value)
            }
            ExprKind::Update {
                increment,
                prefix,
                target,
            } => {
                let old = self.eval(target, scope)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.assign(target, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            ExprKind::Member(object, name) => {
                let object = self.eval(object, scope)?;
                self.get_property(&object, name, expr.pos)
            }
            ExprKind::Index(object, index) => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                self.get_index(&object, &index, expr.pos)
            }
            ExprKind::Call(callee, args) => self.eval_call(callee, args, scope, expr.pos),
            ExprKind::New(callee, args) => {
                let constructor = self.eval(callee, scope)?;
                let args = self.eval_args(args, scope)?;
                self.construct(&constructor, &args, expr.pos)
            }
            ExprKind::Await(operand) => self.eval(operand, scope),
        }
    }

    fn eval_args(&mut self, args: &[Expr], scope: &Rc<Scope>) -> Result<Vec<Value>, Exception> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, scope)?);
        }
        Ok(values)
    }

    fn lookup(&self, name: &str, scope: &Rc<Scope>, pos: SourcePosition) -> Result<Value, Exception> {
        match name {
            "undefined" => Ok(Value::Undefined),
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => scope.lookup(name).ok_or_else(|| {
                self.error_at("ReferenceError", format!("{} is not defined", name), pos)
            }),
        }
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        scope: &Rc<Scope>,
        pos: SourcePosition,
    ) -> Result<Value, Exception> {
        let (this, key, function) = match &callee.kind {
            ExprKind::Member(object, name) => {
                let object = self.eval(object, scope)?;
                let function = self.get_own(&object, name);
                (object, Some(name.clone()), function)
            }
            ExprKind::Index(object, index) => {
                let object = self.eval(object, scope)?;
                let key = self.eval(index, scope)?.to_js_string();
                let function = self.get_own(&object, &key);
                (object, Some(key), function)
            }
            _ => (Value::Undefined, None, Some(self.eval(callee, scope)?)),
        };
        let args = self.eval_args(args, scope)?;

        match (function, key) {
            (Some(function @ Value::Function(_)), _) => self.call_at(&function, &this, &args, pos),
            (_, Some(key)) => {
                if this.is_nullish() {
                    return Err(self.error_at(
                        "TypeError",
                        format!(
                            "Cannot read properties of {} (reading '{}')",
                            this.to_js_string(),
                            key
                        ),
                        pos,
                    ));
                }
                let saved = self.call_pos;
                self.call_pos = pos;
                let result = builtins::call_method(self, &this, &key, &args);
                self.call_pos = saved;
                match result {
                    Some(result) => result,
                    None => Err(self.error_at(
                        "TypeError",
                        format!("{}.{} is not a function", describe(callee_base(callee)), key),
                        pos,
                    )),
                }
            }
            (Some(other), None) => Err(self.error_at(
                "TypeError",
                format!("{} is not a function", describe_callee(callee, &other)),
                pos,
            )),
            (None, None) => Ok(Value::Undefined),
        }
    }

    /// Own property lookup used for method calls on plain objects.
    fn get_own(&self, object: &Value, key: &str) -> Option<Value> {
        match object {
            Value::Object(object) => object.borrow().get(key).cloned(),
            _ => None,
        }
    }

    fn construct(
        &mut self,
        constructor: &Value,
        args: &[Value],
        pos: SourcePosition,
    ) -> Result<Value, Exception> {
        let name = match constructor {
            Value::Function(function) => function.name().unwrap_or_default().to_string(),
            _ => String::new(),
        };
        let saved = self.call_pos;
        self.call_pos = pos;
        let result = builtins::construct(self, &name, args);
        self.call_pos = saved;
        result.unwrap_or_else(|| {
            Err(self.error_at(
                "TypeError",
                format!("{} is not a constructor", constructor.to_js_string()),
                pos,
            ))
        })
    }

    pub fn get_property(&self, object: &Value, key: &str, pos: SourcePosition) -> Result<Value, Exception> {
        match object {
            Value::Undefined | Value::Null => Err(self.error_at(
                "TypeError",
                format!(
                    "Cannot read properties of {} (reading '{}')",
                    object.to_js_string(),
                    key
                ),
                pos,
            )),
            Value::Object(object) => Ok(object.borrow().get(key).cloned().unwrap_or(Value::Undefined)),
            Value::Array(items) => Ok(match key {
                "length" => Value::Number(items.borrow().len() as f64),
                _ => array_index(key)
                    .and_then(|index| items.borrow().get(index).cloned())
                    .unwrap_or(Value::Undefined),
            }),
            Value::Str(s) => Ok(match key {
                "length" => Value::Number(s.chars().count() as f64),
                _ => array_index(key)
                    .and_then(|index| s.chars().nth(index))
                    .map(|c| Value::Str(c.to_string()))
                    .unwrap_or(Value::Undefined),
            }),
            Value::Function(function) if key == "name" => {
                Ok(Value::from(function.name().unwrap_or_default()))
            }
            _ => Ok(Value::Undefined),
        }
    }

    fn get_index(&self, object: &Value, index: &Value, pos: SourcePosition) -> Result<Value, Exception> {
        self.get_property(object, &property_key(index), pos)
    }

    fn assign(&mut self, target: &Expr, value: Value, scope: &Rc<Scope>) -> Result<(), Exception> {
        match &target.kind {
            ExprKind::Ident(name) => match scope.assign(name, value.clone()) {
                Ok(true) => Ok(()),
                // Undeclared assignment creates a global, as in sloppy mode.
                Ok(false) => {
                    self.global.declare(name, value, true);
                    Ok(())
                }
                Err(()) => Err(self.error_at(
                    "TypeError",
                    "Assignment to constant variable.",
                    target.pos,
                )),
            },
            ExprKind::Member(object, name) => {
                let object = self.eval(object, scope)?;
                self.set_property(&object, name, value, target.pos)
            }
            ExprKind::Index(object, index) => {
                let object = self.eval(object, scope)?;
                let key = property_key(&self.eval(index, scope)?);
                self.set_property(&object, &key, value, target.pos)
            }
            _ => Err(self.error_at(
                "SyntaxError",
                "Invalid left-hand side in assignment",
                target.pos,
            )),
        }
    }

    fn set_property(
        &self,
        object: &Value,
        key: &str,
        value: Value,
        pos: SourcePosition,
    ) -> Result<(), Exception> {
        match object {
            Value::Object(object) => {
                object.borrow_mut().set(key, value);
                Ok(())
            }
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if key == "length" {
                    let length = value.to_number();
                    if length < 0.0 || length.fract() != 0.0 || length > MAX_ARRAY_LENGTH as f64 {
                        return Err(self.error_at("RangeError", "Invalid array length", pos));
                    }
                    items.resize(length as usize, Value::Undefined);
                } else if let Some(index) = array_index(key) {
                    if index >= items.len() {
                        if index >= MAX_ARRAY_LENGTH {
                            return Err(self.error_at("RangeError", "Invalid array length", pos));
                        }
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                Ok(())
            }
            Value::Undefined | Value::Null => Err(self.error_at(
                "TypeError",
                format!(
                    "Cannot set properties of {} (setting '{}')",
                    object.to_js_string(),
                    key
                ),
                pos,
            )),
            // Writes to primitives are silently dropped.
            _ => Ok(()),
        }
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

fn property_key(value: &Value) -> String {
    value.to_js_string()
}

fn callee_base(callee: &Expr) -> &Expr {
    match &callee.kind {
        ExprKind::Member(object, _) | ExprKind::Index(object, _) => object,
        _ => callee,
    }
}

fn describe(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Member(object, name) => format!("{}.{}", describe(object), name),
        ExprKind::Str(_) | ExprKind::Template(_) => "string".to_string(),
        ExprKind::Array(_) => "array".to_string(),
        ExprKind::Call(callee, _) => format!("{}(...)", describe(callee)),
        _ => "(intermediate value)".to_string(),
    }
}

fn describe_callee(callee: &Expr, value: &Value) -> String {
    match &callee.kind {
        ExprKind::Ident(_) | ExprKind::Member(..) => describe(callee),
        _ => value.to_js_string(),
    }
}

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let concat = |v: &Value| {
                matches!(
                    v,
                    Value::Str(_) | Value::Array(_) | Value::Object(_) | Value::Date(_) | Value::Function(_)
                )
            };
            if concat(left) || concat(right) {
                Value::Str(left.to_js_string() + &right.to_js_string())
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Pow => Value::Number(left.to_number().powf(right.to_number())),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let Some(ordering) = ordering else {
                return Value::Bool(false);
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::LtEq => ordering.is_le(),
                _ => ordering.is_ge(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_script;
    use super::*;

    fn run(source: &str) -> Result<Value, Exception> {
        let body = parse_script(source).unwrap();
        Interpreter::new(32).run(&body)
    }

    fn eval_str(source: &str) -> String {
        run(source).unwrap().to_js_string()
    }

    #[test]
    fn arithmetic_and_strings() {
        assert_eq!(eval_str("return 1 + 2 * 3;"), "7");
        assert_eq!(eval_str("return '4' + 2;"), "42");
        assert_eq!(eval_str("return 2 ** 3 ** 2;"), "512");
        assert_eq!(eval_str("return 7 % 3;"), "1");
    }

    #[test]
    fn closures_capture_loop_iterations() {
        let source = "let fs = [];\nfor (let i = 0; i < 3; i++) { fs.push(() => i); }\nreturn fs.map(f => f()).join('');";
        assert_eq!(eval_str(source), "012");
    }

    #[test]
    fn function_declarations_are_hoisted() {
        assert_eq!(eval_str("return twice(4);\nfunction twice(n) { return n * 2; }"), "8");
    }

    #[test]
    fn try_catch_finally() {
        let source = "let log = '';\ntry { throw new Error('boom'); } catch (e) { log += e.message; } finally { log += '!'; }\nreturn log;";
        assert_eq!(eval_str(source), "boom!");
    }

    #[test]
    fn const_cannot_be_reassigned() {
        let err = run("const a = 1;\na = 2;").unwrap_err();
        assert!(err.stack.starts_with("TypeError: Assignment to constant variable."));
        assert!(err.stack.contains("<expansion>:2:1"));
    }

    #[test]
    fn reference_error_stack_names_function_frames() {
        let err = run("function inner() {\n  return missing;\n}\nreturn inner();").unwrap_err();
        let lines: Vec<&str> = err.stack.lines().collect();
        assert_eq!(lines[0], "ReferenceError: missing is not defined");
        assert_eq!(lines[1], "    at inner (<expansion>:2:10)");
        assert_eq!(lines[2], "    at <expansion>:4:8");
    }

    #[test]
    fn recursion_is_capped() {
        let err = run("function f() { return f(); }\nreturn f();").unwrap_err();
        assert!(err.stack.starts_with("RangeError"));
    }

    #[test]
    fn far_array_writes_are_range_errors() {
        let err = run("let a = [];\na[5e9] = 1;").unwrap_err();
        assert!(err.stack.starts_with("RangeError: Invalid array length"));
        assert!(err.stack.contains("<expansion>:2:"));
        let err = run("let a = [];\na.length = 4294967295;").unwrap_err();
        assert!(err.stack.starts_with("RangeError: Invalid array length"));
        assert_eq!(eval_str("let a = [];\na[2] = 'x';\nreturn a.length;"), "3");
        assert_eq!(eval_str("let a = [1, 2, 3];\na.length = 1;\nreturn a.join();"), "1");
    }

    #[test]
    fn switch_falls_through_until_break() {
        let source = "let out = '';\nswitch (2) { case 1: out += 'a'; case 2: out += 'b'; case 3: out += 'c'; break; default: out += 'd'; }\nreturn out;";
        assert_eq!(eval_str(source), "bc");
    }

    #[test]
    fn objects_and_arrays_are_shared() {
        let source = "const o = { items: [] };\nconst alias = o;\nalias.items.push(1, 2);\no.count = o.items.length;\nreturn o.count;";
        assert_eq!(eval_str(source), "2");
    }

    #[test]
    fn thrown_strings_keep_position() {
        let err = run("let a = 1;\n  throw 'bad';").unwrap_err();
        assert_eq!(err.value.to_js_string(), "bad");
        assert!(err.stack.contains("<expansion>:2:3"));
    }

    #[test]
    fn calling_a_non_function_is_a_type_error() {
        let err = run("let x = 3;\nx();").unwrap_err();
        assert!(err.stack.starts_with("TypeError: x is not a function"));
    }
}
