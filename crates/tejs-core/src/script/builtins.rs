//! Global objects and the methods of built-in value types.

use super::interp::{Exception, Interpreter};
use super::value::{
    number_to_string, string_to_number, Function, Value, MAX_ARRAY_LENGTH, MAX_STRING_LENGTH,
};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono::{Datelike, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

type MethodResult = Option<Result<Value, Exception>>;

static FLOAT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:Infinity|\d+\.?\d*(?:[eE][+-]?\d+)?|\.\d+(?:[eE][+-]?\d+)?)")
        .unwrap()
});

const ERROR_TYPES: &[&str] = &["Error", "TypeError", "RangeError", "SyntaxError", "ReferenceError"];

pub(super) fn install_globals(interp: &mut Interpreter) {
    interp.define_global(
        "Number",
        Value::native("Number", |_, _, args| {
            Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
        }),
    );
    interp.define_global(
        "String",
        Value::native("String", |_, _, args| {
            Ok(Value::Str(args.first().map(Value::to_js_string).unwrap_or_default()))
        }),
    );
    interp.define_global(
        "Boolean",
        Value::native("Boolean", |_, _, args| {
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }),
    );
    interp.define_global("parseInt", Value::native("parseInt", |_, _, args| Ok(parse_int(args))));
    interp.define_global(
        "parseFloat",
        Value::native("parseFloat", |_, _, args| {
            Ok(Value::Number(parse_float(&arg_string(args, 0))))
        }),
    );
    interp.define_global(
        "isNaN",
        Value::native("isNaN", |_, _, args| {
            Ok(Value::Bool(arg(args, 0).to_number().is_nan()))
        }),
    );
    interp.define_global(
        "Date",
        Value::native("Date", |_, _, _| Ok(Value::Str(Value::Date(Local::now()).to_js_string()))),
    );
    interp.define_global("Array", Value::native("Array", |interp, _, args| new_array(interp, args)));
    interp.define_global(
        "Object",
        Value::native("Object", |_, _, args| {
            Ok(match arg(args, 0) {
                value @ (Value::Object(_) | Value::Array(_)) => value,
                _ => Value::object(Vec::new()),
            })
        }),
    );
    for &name in ERROR_TYPES {
        interp.define_global(
            name,
            Value::native(name, move |interp, _, args| {
                Ok(interp.make_error(name, &message_arg(args)))
            }),
        );
    }
    interp.define_global("Math", math_object());
    interp.define_global("JSON", json_object());
}

fn math_object() -> Value {
    fn unary(name: &str, f: fn(f64) -> f64) -> (String, Value) {
        (
            name.to_string(),
            Value::native(name, move |_, _, args| Ok(Value::Number(f(arg(args, 0).to_number())))),
        )
    }
    let mut properties = vec![
        ("PI".to_string(), Value::Number(std::f64::consts::PI)),
        ("E".to_string(), Value::Number(std::f64::consts::E)),
        unary("floor", f64::floor),
        unary("ceil", f64::ceil),
        // Math.round rounds halves towards +Infinity.
        unary("round", |n| (n + 0.5).floor()),
        unary("trunc", f64::trunc),
        unary("abs", f64::abs),
        unary("sqrt", f64::sqrt),
        unary("cbrt", f64::cbrt),
        unary("log", f64::ln),
        unary("log10", f64::log10),
        unary("log2", f64::log2),
        unary("exp", f64::exp),
        unary("sin", f64::sin),
        unary("cos", f64::cos),
        unary("tan", f64::tan),
        unary("sign", |n| {
            if n.is_nan() || n == 0.0 {
                n
            } else {
                n.signum()
            }
        }),
    ];
    properties.push((
        "pow".to_string(),
        Value::native("pow", |_, _, args| {
            Ok(Value::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number())))
        }),
    ));
    properties.push((
        "min".to_string(),
        Value::native("min", |_, _, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(
                f64::INFINITY,
                |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) },
            )))
        }),
    ));
    properties.push((
        "max".to_string(),
        Value::native("max", |_, _, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(
                f64::NEG_INFINITY,
                |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) },
            )))
        }),
    ));
    properties.push((
        "random".to_string(),
        Value::native("random", |_, _, _| Ok(Value::Number(rand::random::<f64>()))),
    ));
    Value::object(properties)
}

fn json_object() -> Value {
    Value::object(vec![
        (
            "stringify".to_string(),
            Value::native("stringify", |interp, _, args| {
                let Some(json) = arg(args, 0).to_json() else {
                    return Ok(Value::Undefined);
                };
                let indent = match arg(args, 2) {
                    Value::Number(n) if n >= 1.0 => " ".repeat(n.min(10.0) as usize),
                    Value::Str(s) => s.chars().take(10).collect(),
                    _ => String::new(),
                };
                let text = if indent.is_empty() {
                    serde_json::to_string(&json)
                } else {
                    let mut out = Vec::new();
                    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
                    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
                    let written = json.serialize(&mut serializer);
                    drop(serializer);
                    written.map(|()| String::from_utf8_lossy(&out).into_owned())
                };
                text.map(Value::Str)
                    .map_err(|e| interp.error("TypeError", e.to_string()))
            }),
        ),
        (
            "parse".to_string(),
            Value::native("parse", |interp, _, args| {
                serde_json::from_str::<serde_json::Value>(&arg_string(args, 0))
                    .map(|json| Value::from_json(&json))
                    .map_err(|e| interp.error("SyntaxError", e.to_string()))
            }),
        ),
    ])
}

/// Handle `new <name>(args)`; `None` when `name` is not constructible.
pub(super) fn construct(interp: &mut Interpreter, name: &str, args: &[Value]) -> MethodResult {
    if let Some(error_name) = ERROR_TYPES.iter().find(|n| **n == name) {
        return Some(Ok(interp.make_error(error_name, &message_arg(args))));
    }
    match name {
        "Date" => Some(construct_date(interp, args)),
        "Array" => Some(new_array(interp, args)),
        "Object" => Some(Ok(Value::object(Vec::new()))),
        _ => None,
    }
}

/// `Array(n)` makes `n` empty slots; any other arguments become the items.
fn new_array(interp: &Interpreter, args: &[Value]) -> Result<Value, Exception> {
    match args {
        [Value::Number(n)] => Ok(Value::array(vec![Value::Undefined; array_length(interp, *n)?])),
        _ => Ok(Value::array(args.to_vec())),
    }
}

fn array_length(interp: &Interpreter, n: f64) -> Result<usize, Exception> {
    if n < 0.0 || n.fract() != 0.0 || n > MAX_ARRAY_LENGTH as f64 {
        return Err(interp.error("RangeError", "Invalid array length"));
    }
    Ok(n as usize)
}

fn construct_date(interp: &Interpreter, args: &[Value]) -> Result<Value, Exception> {
    let invalid = || interp.error("RangeError", "Invalid time value");
    let date = match args {
        [] => Local::now(),
        [Value::Date(date)] => *date,
        [Value::Str(text)] => parse_date(text).ok_or_else(invalid)?,
        [single] => {
            let millis = single.to_number();
            if !millis.is_finite() {
                return Err(invalid());
            }
            Local
                .timestamp_millis_opt(millis as i64)
                .single()
                .ok_or_else(invalid)?
        }
        [year, month, rest @ ..] => {
            let component = |index: usize, default: f64| {
                rest.get(index).map_or(default, Value::to_number)
            };
            let year = year.to_number() as i32;
            let month = month.to_number() as i64;
            // Month overflow rolls into the year, as in JavaScript.
            let (year, month) = (year + month.div_euclid(12) as i32, month.rem_euclid(12) as u32);
            let first = NaiveDate::from_ymd_opt(year, month + 1, 1).ok_or_else(invalid)?;
            let naive = first
                .and_hms_opt(0, 0, 0)
                .ok_or_else(invalid)?
                .checked_add_signed(
                    chrono::Duration::days(component(0, 1.0) as i64 - 1)
                        + chrono::Duration::hours(component(1, 0.0) as i64)
                        + chrono::Duration::minutes(component(2, 0.0) as i64)
                        + chrono::Duration::seconds(component(3, 0.0) as i64)
                        + chrono::Duration::milliseconds(component(4, 0.0) as i64),
                )
                .ok_or_else(invalid)?;
            Local.from_local_datetime(&naive).earliest().ok_or_else(invalid)?
        }
    };
    Ok(Value::Date(date))
}

fn parse_date(text: &str) -> Option<DateTime<Local>> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Local));
    }
    // Date-only forms are UTC; date-time forms without an offset are local.
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&midnight).with_timezone(&Local));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Local.from_local_datetime(&naive).earliest();
        }
    }
    None
}

/// Dispatch `this.name(args)` for built-in receivers. `None` means the
/// receiver has no such method.
pub(super) fn call_method(
    interp: &mut Interpreter,
    this: &Value,
    name: &str,
    args: &[Value],
) -> MethodResult {
    match this {
        Value::Str(s) => string_method(interp, s, name, args),
        Value::Array(_) => array_method(interp, this, name, args),
        Value::Number(n) => number_method(interp, *n, name, args),
        Value::Bool(b) => match name {
            "toString" => Some(Ok(Value::Str(b.to_string()))),
            "valueOf" => Some(Ok(Value::Bool(*b))),
            _ => None,
        },
        Value::Date(date) => date_method(date, name),
        Value::Function(function) => static_method(interp, function, name, args),
        Value::Object(object) => match name {
            "toString" => Some(Ok(Value::Str(this.to_js_string()))),
            "hasOwnProperty" => Some(Ok(Value::Bool(
                object.borrow().get(&arg_string(args, 0)).is_some(),
            ))),
            _ => None,
        },
        Value::Undefined | Value::Null => None,
    }
}

fn static_method(
    interp: &mut Interpreter,
    function: &Function,
    name: &str,
    args: &[Value],
) -> MethodResult {
    let Function::Native { name: owner, .. } = function else {
        return None;
    };
    let value = match (owner.as_str(), name) {
        ("Date", "now") => Value::Number(Utc::now().timestamp_millis() as f64),
        ("Date", "parse") => Value::Number(
            parse_date(&arg_string(args, 0)).map_or(f64::NAN, |d| d.timestamp_millis() as f64),
        ),
        ("Number", "isInteger") => Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)),
        ("Number", "isFinite") => Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite())),
        ("Number", "isNaN") => Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_nan())),
        ("Number", "parseFloat") => Value::Number(parse_float(&arg_string(args, 0))),
        ("Number", "parseInt") => parse_int(args),
        ("String", "fromCharCode") => Value::Str(
            args.iter()
                .filter_map(|code| char::from_u32(code.to_number() as u32))
                .collect(),
        ),
        ("Array", "isArray") => Value::Bool(matches!(arg(args, 0), Value::Array(_))),
        ("Array", "from") => match arg(args, 0) {
            Value::Array(items) => {
                let items = items.borrow().clone();
                return Some(map_items(interp, items, arg(args, 1)));
            }
            Value::Str(s) => Value::array(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Object(object) => {
                let length = object.borrow().get("length").map_or(0.0, Value::to_number);
                let length = match array_length(interp, integer(&Value::Number(length), 0.0).max(0.0)) {
                    Ok(length) => length,
                    Err(e) => return Some(Err(e)),
                };
                let items = vec![Value::Undefined; length];
                return Some(map_items(interp, items, arg(args, 1)));
            }
            _ => Value::array(Vec::new()),
        },
        ("Object", "keys") => Value::array(
            entries(&arg(args, 0))
                .into_iter()
                .map(|(key, _)| Value::Str(key))
                .collect(),
        ),
        ("Object", "values") => Value::array(
            entries(&arg(args, 0))
                .into_iter()
                .map(|(_, value)| value)
                .collect(),
        ),
        ("Object", "entries") => Value::array(
            entries(&arg(args, 0))
                .into_iter()
                .map(|(key, value)| Value::array(vec![Value::Str(key), value]))
                .collect(),
        ),
        ("Object", "assign") => {
            let target = arg(args, 0);
            if let Value::Object(object) = &target {
                for source in &args[1.min(args.len())..] {
                    for (key, value) in entries(source) {
                        object.borrow_mut().set(&key, value);
                    }
                }
            }
            target
        }
        _ => return None,
    };
    Some(Ok(value))
}

fn map_items(interp: &mut Interpreter, items: Vec<Value>, callback: Value) -> Result<Value, Exception> {
    if matches!(callback, Value::Undefined) {
        return Ok(Value::array(items));
    }
    let mut mapped = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        mapped.push(interp.call(&callback, &Value::Undefined, &[item, Value::Number(index as f64)])?);
    }
    Ok(Value::array(mapped))
}

fn entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(object) => object.borrow().properties.clone(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), item.clone()))
            .collect(),
        Value::Str(s) => s
            .chars()
            .enumerate()
            .map(|(index, c)| (index.to_string(), Value::Str(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn string_method(interp: &mut Interpreter, s: &str, name: &str, args: &[Value]) -> MethodResult {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let substring = |start: usize, end: usize| -> String {
        if start >= end {
            String::new()
        } else {
            chars[start..end].iter().collect()
        }
    };
    let value = match name {
        "toString" | "valueOf" => Value::from(s),
        "toUpperCase" | "toLocaleUpperCase" => Value::Str(s.to_uppercase()),
        "toLowerCase" | "toLocaleLowerCase" => Value::Str(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "trimStart" => Value::from(s.trim_start()),
        "trimEnd" => Value::from(s.trim_end()),
        "charAt" => {
            let index = integer(&arg(args, 0), 0.0);
            Value::Str(
                usize::try_from(index as i64)
                    .ok()
                    .and_then(|i| chars.get(i))
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
            )
        }
        "charCodeAt" | "codePointAt" => {
            let index = integer(&arg(args, 0), 0.0);
            Value::Number(
                usize::try_from(index as i64)
                    .ok()
                    .and_then(|i| chars.get(i))
                    .map_or(f64::NAN, |c| f64::from(u32::from(*c))),
            )
        }
        "at" => {
            let index = integer(&arg(args, 0), 0.0);
            let index = if index < 0.0 { len as f64 + index } else { index };
            usize::try_from(index as i64)
                .ok()
                .and_then(|i| chars.get(i))
                .map_or(Value::Undefined, |c| Value::Str(c.to_string()))
        }
        "indexOf" => {
            let needle = arg_string(args, 0);
            let from = clamp_index(integer(&arg(args, 1), 0.0), len);
            Value::Number(char_find(&chars, &needle, from).map_or(-1.0, |i| i as f64))
        }
        "lastIndexOf" => {
            let needle: Vec<char> = arg_string(args, 0).chars().collect();
            let found = (0..=len.saturating_sub(needle.len()))
                .rev()
                .find(|&i| i + needle.len() <= len && chars[i..i + needle.len()] == needle[..]);
            Value::Number(found.map_or(-1.0, |i| i as f64))
        }
        "includes" => Value::Bool(s.contains(&arg_string(args, 0))),
        "startsWith" => Value::Bool(s.starts_with(&arg_string(args, 0))),
        "endsWith" => Value::Bool(s.ends_with(&arg_string(args, 0))),
        "slice" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let end = relative_index(&arg(args, 1), len, len);
            Value::Str(substring(start, end))
        }
        "substring" => {
            let a = clamp_index(integer(&arg(args, 0), 0.0), len);
            let b = match arg(args, 1) {
                Value::Undefined => len,
                other => clamp_index(integer(&other, 0.0), len),
            };
            Value::Str(substring(a.min(b), a.max(b)))
        }
        "substr" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let count = match arg(args, 1) {
                Value::Undefined => len,
                other => integer(&other, 0.0).max(0.0) as usize,
            };
            Value::Str(substring(start, start.saturating_add(count).min(len)))
        }
        "split" => {
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Undefined => vec![Value::from(s)],
                separator => {
                    let separator = separator.to_js_string();
                    if separator.is_empty() {
                        chars.iter().map(|c| Value::Str(c.to_string())).collect()
                    } else {
                        s.split(separator.as_str()).map(Value::from).collect()
                    }
                }
            };
            let parts = match arg(args, 1) {
                Value::Undefined => parts,
                limit => parts.into_iter().take(limit.to_number().max(0.0) as usize).collect(),
            };
            Value::array(parts)
        }
        "replace" | "replaceAll" => {
            let pattern = arg_string(args, 0);
            let replacement = arg(args, 1);
            return Some(replace(interp, s, &pattern, &replacement, name == "replaceAll"));
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            if count < 0.0 || count.is_infinite() {
                return Some(Err(interp.error("RangeError", format!("Invalid count value: {}", number_to_string(count)))));
            }
            let count = count as usize;
            if s.len().saturating_mul(count) > MAX_STRING_LENGTH {
                return Some(Err(interp.error("RangeError", "Invalid string length")));
            }
            Value::Str(s.repeat(count))
        }
        "padStart" | "padEnd" => {
            let target = integer(&arg(args, 0), 0.0).max(0.0) as usize;
            let filler = match arg(args, 1) {
                Value::Undefined => " ".to_string(),
                other => other.to_js_string(),
            };
            if target <= len || filler.is_empty() {
                Value::from(s)
            } else if target > MAX_STRING_LENGTH {
                return Some(Err(interp.error("RangeError", "Invalid string length")));
            } else {
                let padding: String = filler.chars().cycle().take(target - len).collect();
                if name == "padStart" {
                    Value::Str(padding + s)
                } else {
                    Value::Str(s.to_string() + &padding)
                }
            }
        }
        "concat" => {
            let mut joined = s.to_string();
            for part in args {
                joined.push_str(&part.to_js_string());
                if joined.len() > MAX_STRING_LENGTH {
                    return Some(Err(interp.error("RangeError", "Invalid string length")));
                }
            }
            Value::Str(joined)
        }
        "localeCompare" => {
            let other = arg_string(args, 0);
            Value::Number(match s.cmp(other.as_str()) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            })
        }
        _ => return None,
    };
    Some(Ok(value))
}

fn replace(
    interp: &mut Interpreter,
    s: &str,
    pattern: &str,
    replacement: &Value,
    all: bool,
) -> Result<Value, Exception> {
    let mut result = String::new();
    let mut rest_start = 0;
    let mut search_from = 0;
    while let Some(found) = s[search_from..].find(pattern).map(|i| i + search_from) {
        result.push_str(&s[rest_start..found]);
        let text = match replacement {
            Value::Function(_) => interp
                .call(
                    replacement,
                    &Value::Undefined,
                    &[
                        Value::from(pattern),
                        Value::Number(s[..found].chars().count() as f64),
                        Value::from(s),
                    ],
                )?
                .to_js_string(),
            other => other.to_js_string().replace("$&", pattern),
        };
        result.push_str(&text);
        rest_start = found + pattern.len();
        if !all {
            break;
        }
        // An empty pattern matches between every character.
        search_from = if pattern.is_empty() {
            match s[found..].chars().next() {
                Some(c) => {
                    result.push(c);
                    rest_start = found + c.len_utf8();
                    rest_start
                }
                None => break,
            }
        } else {
            rest_start
        };
    }
    result.push_str(&s[rest_start.min(s.len())..]);
    Ok(Value::Str(result))
}

fn array_method(interp: &mut Interpreter, this: &Value, name: &str, args: &[Value]) -> MethodResult {
    let Value::Array(items) = this else {
        return None;
    };
    let snapshot = || items.borrow().clone();
    let len = items.borrow().len();
    let value = match name {
        "push" => {
            if len + args.len() > MAX_ARRAY_LENGTH {
                return Some(Err(interp.error("RangeError", "Invalid array length")));
            }
            let mut items = items.borrow_mut();
            items.extend(args.iter().cloned());
            Value::Number(items.len() as f64)
        }
        "pop" => items.borrow_mut().pop().unwrap_or(Value::Undefined),
        "shift" => {
            let mut items = items.borrow_mut();
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        }
        "unshift" => {
            let mut items = items.borrow_mut();
            for (offset, value) in args.iter().enumerate() {
                items.insert(offset, value.clone());
            }
            Value::Number(items.len() as f64)
        }
        "slice" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let end = relative_index(&arg(args, 1), len, len);
            let items = items.borrow();
            Value::array(if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            })
        }
        "splice" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let count = match args.get(1) {
                None => len - start,
                Some(count) => (integer(count, 0.0).max(0.0) as usize).min(len - start),
            };
            let inserted = args.iter().skip(2).cloned();
            let removed: Vec<Value> = items
                .borrow_mut()
                .splice(start..start + count, inserted)
                .collect();
            Value::array(removed)
        }
        "concat" => {
            let mut joined = snapshot();
            for part in args {
                match part {
                    Value::Array(other) => joined.extend(other.borrow().iter().cloned()),
                    other => joined.push(other.clone()),
                }
                if joined.len() > MAX_ARRAY_LENGTH {
                    return Some(Err(interp.error("RangeError", "Invalid array length")));
                }
            }
            Value::array(joined)
        }
        "join" => {
            let separator = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_js_string(),
            };
            if separator.len().saturating_mul(len.saturating_sub(1)) > MAX_STRING_LENGTH {
                return Some(Err(interp.error("RangeError", "Invalid string length")));
            }
            let parts: Vec<String> = snapshot()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect();
            Value::Str(parts.join(&separator))
        }
        "toString" => Value::Str(this.to_js_string()),
        "reverse" => {
            items.borrow_mut().reverse();
            this.clone()
        }
        "indexOf" => {
            let needle = arg(args, 0);
            Value::Number(
                snapshot()
                    .iter()
                    .position(|item| item.strict_equals(&needle))
                    .map_or(-1.0, |i| i as f64),
            )
        }
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(snapshot().iter().any(|item| {
                item.strict_equals(&needle)
                    || matches!((item, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
            }))
        }
        "at" => {
            let index = integer(&arg(args, 0), 0.0);
            let index = if index < 0.0 { len as f64 + index } else { index };
            usize::try_from(index as i64)
                .ok()
                .and_then(|i| items.borrow().get(i).cloned())
                .unwrap_or(Value::Undefined)
        }
        "flat" => {
            let mut flat = Vec::new();
            for item in snapshot() {
                match item {
                    Value::Array(inner) => flat.extend(inner.borrow().iter().cloned()),
                    other => flat.push(other),
                }
            }
            Value::array(flat)
        }
        "fill" => {
            let value = arg(args, 0);
            let start = relative_index(&arg(args, 1), len, 0);
            let end = relative_index(&arg(args, 2), len, len);
            for slot in items.borrow_mut().iter_mut().take(end).skip(start) {
                *slot = value.clone();
            }
            this.clone()
        }
        "sort" => {
            let sorted = match sort_values(interp, snapshot(), &arg(args, 0)) {
                Ok(sorted) => sorted,
                Err(e) => return Some(Err(e)),
            };
            *items.borrow_mut() = sorted;
            this.clone()
        }
        "forEach" | "map" | "filter" | "find" | "findIndex" | "some" | "every" => {
            return Some(iterate(interp, this, snapshot(), name, &arg(args, 0)));
        }
        "reduce" => return Some(reduce(interp, this, snapshot(), args)),
        _ => return None,
    };
    Some(Ok(value))
}

fn iterate(
    interp: &mut Interpreter,
    this: &Value,
    items: Vec<Value>,
    name: &str,
    callback: &Value,
) -> Result<Value, Exception> {
    if !matches!(callback, Value::Function(_)) {
        return Err(interp.error(
            "TypeError",
            format!("{} is not a function", callback.to_js_string()),
        ));
    }
    let mut collected = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        let result = interp.call(
            callback,
            &Value::Undefined,
            &[item.clone(), Value::Number(index as f64), this.clone()],
        )?;
        match name {
            "map" => collected.push(result),
            "filter" if result.truthy() => collected.push(item),
            "find" if result.truthy() => return Ok(item),
            "findIndex" if result.truthy() => return Ok(Value::Number(index as f64)),
            "some" if result.truthy() => return Ok(Value::Bool(true)),
            "every" if !result.truthy() => return Ok(Value::Bool(false)),
            _ => {}
        }
    }
    Ok(match name {
        "map" | "filter" => Value::array(collected),
        "find" => Value::Undefined,
        "findIndex" => Value::Number(-1.0),
        "some" => Value::Bool(false),
        "every" => Value::Bool(true),
        _ => Value::Undefined,
    })
}

fn reduce(
    interp: &mut Interpreter,
    this: &Value,
    items: Vec<Value>,
    args: &[Value],
) -> Result<Value, Exception> {
    let callback = arg(args, 0);
    let mut items = items.into_iter().enumerate();
    let mut accumulator = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match items.next() {
            Some((_, first)) => first,
            None => {
                return Err(interp.error("TypeError", "Reduce of empty array with no initial value"))
            }
        },
    };
    for (index, item) in items {
        accumulator = interp.call(
            &callback,
            &Value::Undefined,
            &[accumulator, item, Value::Number(index as f64), this.clone()],
        )?;
    }
    Ok(accumulator)
}

/// Stable insertion sort; comparators may throw, so `slice::sort_by` is not usable.
fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    comparator: &Value,
) -> Result<Vec<Value>, Exception> {
    let mut sorted: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        let mut position = sorted.len();
        while position > 0 {
            let before = &sorted[position - 1];
            let in_order = match (before, &item) {
                (_, Value::Undefined) => true,
                (Value::Undefined, _) => false,
                _ => match comparator {
                    Value::Function(_) => {
                        let order = interp
                            .call(comparator, &Value::Undefined, &[before.clone(), item.clone()])?
                            .to_number();
                        order <= 0.0 || order.is_nan()
                    }
                    _ => before.to_js_string() <= item.to_js_string(),
                },
            };
            if in_order {
                break;
            }
            position -= 1;
        }
        sorted.insert(position, item);
    }
    Ok(sorted)
}

fn number_method(interp: &mut Interpreter, n: f64, name: &str, args: &[Value]) -> MethodResult {
    let value = match name {
        "valueOf" => Value::Number(n),
        "toString" => match arg(args, 0) {
            Value::Undefined => Value::Str(number_to_string(n)),
            radix => {
                let radix = radix.to_number() as u32;
                if !(2..=36).contains(&radix) {
                    return Some(Err(interp.error("RangeError", "toString() radix must be between 2 and 36")));
                }
                Value::Str(integer_to_radix(n, radix))
            }
        },
        "toFixed" => {
            let digits = integer(&arg(args, 0), 0.0);
            if !(0.0..=100.0).contains(&digits) {
                return Some(Err(interp.error("RangeError", "toFixed() digits argument must be between 0 and 100")));
            }
            if !n.is_finite() {
                Value::Str(number_to_string(n))
            } else {
                Value::Str(format!("{:.*}", digits as usize, n))
            }
        }
        "toLocaleString" => Value::Str(group_thousands(n)),
        _ => return None,
    };
    Some(Ok(value))
}

fn integer_to_radix(n: f64, radix: u32) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    let negative = n < 0.0;
    let mut value = n.abs().trunc() as u128;
    let mut digits = Vec::new();
    loop {
        let digit = (value % u128::from(radix)) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        value /= u128::from(radix);
        if value == 0 {
            break;
        }
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn group_thousands(n: f64) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    let rounded = format!("{:.3}", n);
    let (whole, fraction) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));
    let (sign, digits) = match whole.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", whole),
    };
    let mut grouped = String::new();
    for (index, c) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, fraction)
    }
}

fn date_method(date: &DateTime<Local>, name: &str) -> MethodResult {
    let value = match name {
        "getFullYear" => Value::Number(f64::from(date.year())),
        "getMonth" => Value::Number(f64::from(date.month0())),
        "getDate" => Value::Number(f64::from(date.day())),
        "getDay" => Value::Number(f64::from(date.weekday().num_days_from_sunday())),
        "getHours" => Value::Number(f64::from(date.hour())),
        "getMinutes" => Value::Number(f64::from(date.minute())),
        "getSeconds" => Value::Number(f64::from(date.second())),
        "getMilliseconds" => Value::Number(f64::from(date.timestamp_subsec_millis())),
        "getTime" | "valueOf" => Value::Number(date.timestamp_millis() as f64),
        "getTimezoneOffset" => Value::Number(f64::from(-date.offset().local_minus_utc() / 60)),
        "toISOString" | "toJSON" => Value::Str(
            date.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        "toDateString" => Value::Str(date.format("%a %b %d %Y").to_string()),
        "toTimeString" => Value::Str(date.format("%H:%M:%S GMT%z").to_string()),
        "toLocaleDateString" => Value::Str(date.format("%-m/%-d/%Y").to_string()),
        "toLocaleTimeString" => Value::Str(date.format("%-I:%M:%S %p").to_string()),
        "toLocaleString" => Value::Str(date.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()),
        "toString" => Value::Date(*date).to_js_string().into(),
        _ => return None,
    };
    Some(Ok(value))
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn arg_string(args: &[Value], index: usize) -> String {
    arg(args, index).to_js_string()
}

fn message_arg(args: &[Value]) -> String {
    match arg(args, 0) {
        Value::Undefined => String::new(),
        other => other.to_js_string(),
    }
}

/// ToIntegerOrInfinity, with `default` for `undefined`.
fn integer(value: &Value, default: f64) -> f64 {
    match value {
        Value::Undefined => default,
        other => {
            let n = other.to_number();
            if n.is_nan() {
                0.0
            } else {
                n.trunc()
            }
        }
    }
}

fn clamp_index(index: f64, len: usize) -> usize {
    index.max(0.0).min(len as f64) as usize
}

/// Resolve a possibly negative `slice` index against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let index = integer(value, 0.0);
    if index < 0.0 {
        clamp_index(len as f64 + index, len)
    } else {
        clamp_index(index, len)
    }
}

fn char_find(haystack: &[char], needle: &str, from: usize) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    (from..haystack.len()).find(|&i| haystack[i..].starts_with(&needle))
}

fn parse_int(args: &[Value]) -> Value {
    let text = arg_string(args, 0);
    let mut text = text.trim_start();
    let negative = text.starts_with('-');
    if negative || text.starts_with('+') {
        text = &text[1..];
    }
    let mut radix = match arg(args, 1) {
        Value::Undefined => 10,
        value => value.to_number() as u32,
    };
    if radix == 0 {
        radix = 10;
    }
    if (radix == 16 || matches!(arg(args, 1), Value::Undefined))
        && (text.starts_with("0x") || text.starts_with("0X"))
    {
        text = &text[2..];
        radix = 16;
    }
    if !(2..=36).contains(&radix) {
        return Value::Number(f64::NAN);
    }
    let digits: String = text.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return Value::Number(f64::NAN);
    }
    let magnitude = digits.chars().fold(0.0, |acc, c| {
        acc * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0))
    });
    Value::Number(if negative { -magnitude } else { magnitude })
}

fn parse_float(text: &str) -> f64 {
    FLOAT_PREFIX
        .find(text.trim_start())
        .map_or(f64::NAN, |m| string_to_number(m.as_str()))
}

#[cfg(test)]
mod tests {
    use crate::script::parser::parse_script;
    use crate::script::Interpreter;

    fn eval(source: &str) -> String {
        let body = parse_script(source).unwrap();
        Interpreter::new(32).run(&body).unwrap().to_js_string()
    }

    /// First line of the uncaught error's stack.
    fn throws(source: &str) -> String {
        let body = parse_script(source).unwrap();
        let err = Interpreter::new(32).run(&body).unwrap_err();
        err.stack.lines().next().unwrap_or_default().to_string()
    }

    fn check_all(cases: &[(&str, &str)]) {
        for (source, expected) in cases {
            assert_eq!(eval(source), *expected, "{}", source);
        }
    }

    #[test]
    fn string_methods() {
        assert_eq!(eval("return 'Hello'.toUpperCase();"), "HELLO");
        assert_eq!(eval("return 'a,b,c'.split(',').reverse().join('-');"), "c-b-a");
        assert_eq!(eval("return 'abcdef'.slice(-3, -1);"), "de");
        assert_eq!(eval("return '7'.padStart(3, '0');"), "007");
        assert_eq!(eval("return 'a-b-c'.replace('-', '+');"), "a+b-c");
        assert_eq!(eval("return 'a-b-c'.replaceAll('-', '+');"), "a+b+c");
        assert_eq!(eval("return 'héllo'.length;"), "5");
    }

    #[test]
    fn array_callbacks() {
        assert_eq!(eval("return [1, 2, 3].map(n => n * 2).join();"), "2,4,6");
        assert_eq!(eval("return [1, 2, 3, 4].filter(n => n % 2 === 0).length;"), "2");
        assert_eq!(eval("return [1, 2, 3].reduce((a, b) => a + b, 10);"), "16");
        assert_eq!(eval("return [3, 1, 10].sort().join();"), "1,10,3");
        assert_eq!(eval("return [3, 1, 10].sort((a, b) => a - b).join();"), "1,3,10");
        assert_eq!(eval("return [1, 2, 3].find(n => n > 1);"), "2");
    }

    #[test]
    fn numbers_and_math() {
        assert_eq!(eval("return (3.14159).toFixed(2);"), "3.14");
        assert_eq!(eval("return parseInt('42px');"), "42");
        assert_eq!(eval("return parseInt('ff', 16);"), "255");
        assert_eq!(eval("return parseFloat('2.5e1x');"), "25");
        assert_eq!(eval("return Math.max(1, 7, 3);"), "7");
        assert_eq!(eval("return Math.round(2.5);"), "3");
        assert_eq!(eval("return (255).toString(16);"), "ff");
        assert_eq!(eval("return (1234567.5).toLocaleString();"), "1,234,567.5");
        assert_eq!(eval("const r = Math.random(); return r >= 0 && r < 1;"), "true");
    }

    #[test]
    fn json_round_trips_through_serde() {
        assert_eq!(eval("return JSON.stringify({ a: [1, 'x', null], b: undefined });"), r#"{"a":[1,"x",null]}"#);
        assert_eq!(eval("return JSON.parse('{\"n\": 2}').n + 1;"), "3");
        assert_eq!(eval("return JSON.stringify([1], null, 2);"), "[\n  1\n]");
    }

    #[test]
    fn dates_from_components() {
        assert_eq!(eval("const d = new Date(2024, 0, 31);\nreturn d.getFullYear() + '-' + d.getMonth() + '-' + d.getDate();"), "2024-0-31");
        assert_eq!(eval("return new Date(2024, 12, 1).getFullYear();"), "2025");
        assert_eq!(eval("return typeof Date.now();"), "number");
    }

    #[test]
    fn static_helpers() {
        assert_eq!(eval("return Object.keys({ a: 1, b: 2 }).join();"), "a,b");
        assert_eq!(eval("return Array.isArray([]) && !Array.isArray('x');"), "true");
        assert_eq!(eval("return String(12) + Number('3');"), "123");
    }

    #[test]
    fn string_index_edge_cases() {
        check_all(&[
            ("return 'abcdef'.slice(-2);", "ef"),
            ("return 'abcdef'.slice(4, 1);", ""),
            ("return 'abcdef'.slice(-100, 2);", "ab"),
            ("return 'abcdef'.substr(-3, 2);", "de"),
            ("return 'abcdef'.substr(2);", "cdef"),
            ("return 'abcdef'.substr(1, -1);", ""),
            ("return 'abcdef'.substring(4, 1);", "bcd"),
            ("return 'abcdef'.charAt(10);", ""),
            ("return 'abcdef'.at(-1);", "f"),
            ("return 'abcabc'.lastIndexOf('c');", "5"),
            ("return 'abcabc'.indexOf('c', 3);", "5"),
            ("return 'a,b,c'.split(',', 2).join('|');", "a|b"),
        ]);
    }

    #[test]
    fn padding_truncates_the_filler() {
        check_all(&[
            ("return 'abc'.padStart(6, '12345');", "123abc"),
            ("return 'abc'.padEnd(6, '12');", "abc121"),
            ("return 'abc'.padStart(2);", "abc"),
            ("return 'abc'.padStart(5);", "  abc"),
            ("return 'abc'.padStart(1e13, '');", "abc"),
        ]);
    }

    #[test]
    fn splice_edge_cases() {
        check_all(&[
            ("const a = [1, 2, 3, 4];\nconst r = a.splice(1);\nreturn a.join() + '|' + r.join();", "1|2,3,4"),
            ("const a = [1, 2, 3, 4];\nconst r = a.splice(-2, 1);\nreturn a.join() + '|' + r.join();", "1,2,4|3"),
            ("const a = [1, 2];\na.splice(1, 0, 'x', 'y');\nreturn a.join();", "1,x,y,2"),
        ]);
    }

    #[test]
    fn parse_int_radix_and_prefix() {
        check_all(&[
            ("return parseInt('0x1A');", "26"),
            ("return parseInt('0x1A', 16);", "26"),
            ("return parseInt('0x1A', 10);", "0"),
            ("return parseInt('-12.9');", "-12"),
            ("return parseInt('z', 36);", "35"),
            ("return parseInt('12', 1);", "NaN"),
            ("return parseInt('');", "NaN"),
        ]);
    }

    #[test]
    fn to_fixed_limits() {
        check_all(&[
            ("return (0.000001).toFixed(7);", "0.0000010"),
            ("return (1 / 0).toFixed(2);", "Infinity"),
            ("return (12).toFixed();", "12"),
        ]);
        assert_eq!(
            throws("return (1.5).toFixed(101);"),
            "RangeError: toFixed() digits argument must be between 0 and 100"
        );
    }

    #[test]
    fn oversized_strings_are_range_errors() {
        assert_eq!(throws("return 'x'.repeat(1e13).length;"), "RangeError: Invalid string length");
        assert_eq!(throws("return 'x'.padStart(1e13, 'y');"), "RangeError: Invalid string length");
        assert_eq!(throws("return new Array(2000).join('x'.repeat(1e6));"), "RangeError: Invalid string length");
        assert_eq!(eval("try { 'ab'.repeat(2 ** 40); } catch (e) { return e.name; }"), "RangeError");
    }

    #[test]
    fn oversized_arrays_are_range_errors() {
        assert_eq!(throws("return new Array(5e9);"), "RangeError: Invalid array length");
        assert_eq!(throws("return Array(-1);"), "RangeError: Invalid array length");
        assert_eq!(throws("return new Array(1.5);"), "RangeError: Invalid array length");
        assert_eq!(throws("return Array.from({ length: 5e9 });"), "RangeError: Invalid array length");
        assert_eq!(eval("return Array(3).length;"), "3");
        assert_eq!(eval("return Array(1, 2).join();"), "1,2");
    }

    #[test]
    fn errors_constructed_without_new() {
        assert_eq!(eval("try { throw TypeError('bad'); } catch (e) { return e.name + ':' + e.message; }"), "TypeError:bad");
    }
}
