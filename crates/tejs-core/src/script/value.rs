use super::ast::FunctionDef;
use super::interp::{Exception, Interpreter, Scope};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Longest string, in bytes, a script may build.
pub const MAX_STRING_LENGTH: usize = 1 << 30;
/// Longest array a script may build. Arrays are dense, so a write far past
/// the end allocates every slot before it.
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, Exception>>;

/// A script value. Arrays and objects are shared and mutable, as in
/// JavaScript; everything else is copied.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Object>>),
    Function(Rc<Function>),
    Date(DateTime<Local>),
}

/// A plain object with insertion-ordered properties.
#[derive(Default)]
pub struct Object {
    pub properties: Vec<(String, Value)>,
    /// Set for `Error` instances; they print as `Name: message`.
    pub is_error: bool,
}

impl Object {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        match self.properties.iter_mut().find(|(name, _)| name == key) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((key.to_string(), value)),
        }
    }
}

pub enum Function {
    Closure {
        def: Rc<FunctionDef>,
        env: Rc<Scope>,
    },
    Native {
        name: String,
        func: NativeFn,
    },
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        match self {
            Function::Closure { def, .. } => def.name.as_deref(),
            Function::Native { name, .. } => Some(name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Function(func) => write!(f, "[Function: {}]", func.name().unwrap_or("anonymous")),
            other => write!(f, "{}", other.to_js_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(properties: Vec<(String, Value)>) -> Value {
        Value::Object(Rc::new(RefCell::new(Object {
            properties,
            is_error: false,
        })))
    }

    pub fn native(
        name: &str,
        func: impl Fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, Exception> + 'static,
    ) -> Value {
        Value::Function(Rc::new(Function::Native {
            name: name.to_string(),
            func: Rc::new(func),
        }))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Date(_) => "object",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Date(date) => date.timestamp_millis() as f64,
            Value::Array(_) | Value::Object(_) | Value::Function(_) => {
                string_to_number(&self.to_js_string())
            }
        }
    }

    /// JavaScript `String(value)`.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.clone(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(object) => {
                let object = object.borrow();
                if object.is_error {
                    let name = object
                        .get("name")
                        .map(Value::to_js_string)
                        .unwrap_or_else(|| "Error".to_string());
                    let message = object.get("message").map(Value::to_js_string).unwrap_or_default();
                    if message.is_empty() {
                        name
                    } else {
                        format!("{}: {}", name, message)
                    }
                } else {
                    "[object Object]".to_string()
                }
            }
            Value::Function(func) => match func.as_ref() {
                Function::Closure { def, .. } => {
                    format!("function {}() {{ [code] }}", def.name.as_deref().unwrap_or(""))
                }
                Function::Native { name, .. } => format!("function {}() {{ [native code] }}", name),
            },
            Value::Date(date) => date.format("%a %b %d %Y %H:%M:%S GMT%z").to_string(),
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Date(a), Value::Date(b)) => a == b,
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::Str(_))
            | (Value::Str(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
            (Value::Str(s), Value::Array(_) | Value::Object(_))
            | (Value::Array(_) | Value::Object(_), Value::Str(s)) => {
                let primitive = if matches!(self, Value::Str(_)) { other } else { self };
                *s == primitive.to_js_string()
            }
            _ => self.strict_equals(other),
        }
    }

    /// Convert into JSON; `None` for values JSON omits (functions, undefined).
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as Json;
        Some(match self {
            Value::Undefined | Value::Function(_) => return None,
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::Str(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(
                items
                    .borrow()
                    .iter()
                    .map(|item| item.to_json().unwrap_or(Json::Null))
                    .collect(),
            ),
            Value::Object(object) => Json::Object(
                object
                    .borrow()
                    .properties
                    .iter()
                    .filter_map(|(key, value)| value.to_json().map(|json| (key.clone(), json)))
                    .collect(),
            ),
            Value::Date(date) => Json::String(
                date.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        })
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// JavaScript `Number::toString` for base 10.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let text = format!("{:e}", n);
        return match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => text,
        };
    }
    if n.fract() == 0.0 {
        return format!("{}", n as i128);
    }
    format!("{}", n)
}

/// JavaScript `Number(string)`.
pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("inf") || lower.contains("nan") {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}
