//! Built-in functions, callable by name from expressions and filters.
//!
//! Predicates (`isDefined`, `isEmpty`, ...) back the `is` tests, `isInObject`
//! and `isInRange` back `in`, `startsWith`/`endsWith`/`match` back the
//! string comparison operators.

use crate::error::FunctionError;
use crate::value::Value;
use once_cell::sync::Lazy;
use pct_str::{PctString, URIReserved};
use regex::RegexBuilder;
use std::collections::HashMap;

/// Signature shared by every builtin.
pub type Builtin = fn(&[Value]) -> Result<Value, FunctionError>;

/// Upper bound on the length of a list produced by `range`.
pub const RANGE_LIMIT: usize = 1_000_000;

static BUILTINS: Lazy<HashMap<&'static str, Builtin>> = Lazy::new(|| {
    let table: [(&'static str, Builtin); 29] = [
        ("isDefined", is_defined),
        ("isNull", is_null),
        ("isEmpty", is_empty),
        ("isNumber", is_number),
        ("isString", is_string),
        ("isIterable", is_iterable),
        ("isEven", is_even),
        ("isOdd", is_odd),
        ("isInObject", is_in_object),
        ("isInRange", is_in_range),
        ("range", range),
        ("length", length),
        ("first", first),
        ("last", last),
        ("keys", keys),
        ("default", default),
        ("startsWith", starts_with),
        ("endsWith", ends_with),
        ("match", matches),
        ("lower", lower),
        ("upper", upper),
        ("capitalize", capitalize),
        ("trim", trim),
        ("escape", escape),
        ("raw", raw),
        ("replace", replace),
        ("abs", abs),
        ("min", min),
        ("max", max),
    ];
    table.into_iter().collect()
});

/// Looks up a builtin by name.
pub fn get(name: &str) -> Option<Builtin> {
    BUILTINS.get(name).copied()
}

/// Names of every builtin, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = BUILTINS.keys().copied().collect();
    names.sort_unstable();
    names
}

fn arg(args: &[Value], i: usize) -> &Value {
    static UNDEFINED: Value = Value::Undefined;
    args.get(i).unwrap_or(&UNDEFINED)
}

fn single_char(v: &Value) -> Option<char> {
    let s = v.as_str()?;
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

fn is_defined(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::Bool(!arg(args, 0).is_undefined()))
}

fn is_null(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::Bool(arg(args, 0).is_null()))
}

/// Structural emptiness: zero-length collections count as empty.
pub fn empty(v: &Value) -> bool {
    match v {
        Value::Undefined | Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        Value::Bool(true) | Value::Number(_) => false,
    }
}

fn is_empty(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::Bool(empty(arg(args, 0))))
}

fn is_number(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::Bool(arg(args, 0).is_number()))
}

fn is_string(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::Bool(arg(args, 0).is_string()))
}

fn iterable(v: &Value) -> bool {
    matches!(v, Value::List(_) | Value::Map(_) | Value::String(_))
}

fn is_iterable(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::Bool(iterable(arg(args, 0))))
}

fn is_even(args: &[Value]) -> Result<Value, FunctionError> {
    let v = arg(args, 0);
    Ok(Value::Bool(v.is_number() && v.to_int32() & 1 == 0))
}

fn is_odd(args: &[Value]) -> Result<Value, FunctionError> {
    let v = arg(args, 0);
    Ok(Value::Bool(v.is_number() && v.to_int32() & 1 == 1))
}

fn is_in_object(args: &[Value]) -> Result<Value, FunctionError> {
    let (needle, haystack) = (arg(args, 0), arg(args, 1));
    let found = match haystack {
        Value::List(items) => items.iter().any(|item| item.strict_eq(needle)),
        Value::String(s) => s.contains(&needle.to_string()),
        Value::Map(map) => map.contains_key(&needle.to_string()),
        _ => false,
    };
    Ok(Value::Bool(found))
}

fn is_in_range(args: &[Value]) -> Result<Value, FunctionError> {
    let (x, lo, hi) = (arg(args, 0), arg(args, 1), arg(args, 2));
    let inside = match (lo, hi) {
        (Value::Number(lo), Value::Number(hi)) => {
            let x = x.to_number();
            x >= *lo && x <= *hi
        }
        _ => match (single_char(lo), single_char(hi), x.as_str().and_then(|s| s.chars().next())) {
            (Some(lo), Some(hi), Some(c)) => (lo..=hi).contains(&c),
            _ => false,
        },
    };
    Ok(Value::Bool(inside))
}

fn range(args: &[Value]) -> Result<Value, FunctionError> {
    let step = match arg(args, 2) {
        Value::Undefined | Value::Null => 1.0,
        v => v.to_number(),
    };
    if !(step > 0.0) {
        return Err(FunctionError::new(format!(
            "range step must be positive, got {}",
            Value::Number(step)
        )));
    }

    let (lo, hi) = (arg(args, 0), arg(args, 1));
    let (start, end, chars) = match (lo, hi) {
        (Value::Number(lo), Value::Number(hi)) => (*lo, *hi, false),
        _ => match (single_char(lo), single_char(hi)) {
            (Some(lo), Some(hi)) => (f64::from(u32::from(lo)), f64::from(u32::from(hi)), true),
            _ => return Ok(Value::List(Vec::new())),
        },
    };

    let count = if end < start { 0.0 } else { ((end - start) / step).floor() + 1.0 };
    if count > RANGE_LIMIT as f64 {
        return Err(FunctionError::new(format!(
            "range would produce more than {RANGE_LIMIT} items"
        )));
    }

    let items = (0..count as usize)
        .map(|i| start + step * i as f64)
        .map(|n| {
            if chars {
                char::from_u32(n as u32).map_or(Value::Undefined, |c| Value::String(c.to_string()))
            } else {
                Value::Number(n)
            }
        })
        .collect();
    Ok(Value::List(items))
}

fn length(args: &[Value]) -> Result<Value, FunctionError> {
    let n = match arg(args, 0) {
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::String(s) => s.chars().count(),
        _ => 0,
    };
    Ok(Value::from(n))
}

fn first(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(match arg(args, 0) {
        Value::List(items) => items.first().cloned().unwrap_or_default(),
        Value::Map(map) => map.values().next().cloned().unwrap_or_default(),
        Value::String(s) => s
            .chars()
            .next()
            .map_or(Value::Undefined, |c| Value::String(c.to_string())),
        _ => Value::Undefined,
    })
}

fn last(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(match arg(args, 0) {
        Value::List(items) => items.last().cloned().unwrap_or_default(),
        Value::Map(map) => map.values().next_back().cloned().unwrap_or_default(),
        Value::String(s) => s
            .chars()
            .next_back()
            .map_or(Value::Undefined, |c| Value::String(c.to_string())),
        _ => Value::Undefined,
    })
}

fn keys(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::List(match arg(args, 0) {
        Value::Map(map) => map.keys().map(|k| Value::String(k.clone())).collect(),
        Value::List(items) => (0..items.len()).map(Value::from).collect(),
        _ => Vec::new(),
    }))
}

fn default(args: &[Value]) -> Result<Value, FunctionError> {
    let value = arg(args, 0);
    Ok(if empty(value) { arg(args, 1).clone() } else { value.clone() })
}

fn starts_with(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::Bool(match (arg(args, 0), arg(args, 1)) {
        (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
        _ => false,
    }))
}

fn ends_with(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::Bool(match (arg(args, 0), arg(args, 1)) {
        (Value::String(s), Value::String(suffix)) => s.ends_with(suffix.as_str()),
        _ => false,
    }))
}

/// `match(s, "/pattern/flags")`. Flags: `i`, `m`, `s`, `x`; `g` and `u`
/// are accepted and ignored.
fn matches(args: &[Value]) -> Result<Value, FunctionError> {
    let (Value::String(s), Value::String(literal)) = (arg(args, 0), arg(args, 1)) else {
        return Ok(Value::Bool(false));
    };

    let close = literal.rfind('/').filter(|&i| i > 0 && literal.starts_with('/'));
    let Some(close) = close else {
        return Err(FunctionError::new(format!("invalid regular expression `{literal}`")));
    };

    let mut builder = RegexBuilder::new(&literal[1..close]);
    for flag in literal[close + 1..].chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'g' | 'u' => &mut builder,
            other => {
                return Err(FunctionError::new(format!(
                    "invalid regular expression flag `{other}` in `{literal}`"
                )))
            }
        };
    }
    Ok(Value::Bool(builder.build()?.is_match(s)))
}

fn lower(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::String(arg(args, 0).as_str().map(str::to_lowercase).unwrap_or_default()))
}

fn upper(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::String(arg(args, 0).as_str().map(str::to_uppercase).unwrap_or_default()))
}

fn capitalize(args: &[Value]) -> Result<Value, FunctionError> {
    let s = arg(args, 0).as_str().unwrap_or_default();
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(c) => c.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    };
    Ok(Value::String(out))
}

fn trim(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::String(arg(args, 0).as_str().map(str::trim).unwrap_or_default().to_string()))
}

fn escape(args: &[Value]) -> Result<Value, FunctionError> {
    let Value::String(s) = arg(args, 0) else {
        return Ok(arg(args, 0).clone());
    };
    let mode = match arg(args, 1) {
        Value::Undefined | Value::Null => "html",
        Value::String(mode) => mode.as_str(),
        other => {
            return Err(FunctionError::new(format!(
                "escape mode must be a string, got {}",
                other.kind()
            )))
        }
    };

    let escaped = match mode {
        "html" | "html_attr" => s
            .replace('&', "&amp;")
            .replace('"', "&quot;")
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
        "js" => s
            .replace('\\', "\\\\")
            .replace('\n', "\\n")
            .replace('"', "\\\"")
            .replace('\'', "\\'"),
        "url" => PctString::encode(s.chars(), URIReserved).to_string(),
        other => return Err(FunctionError::new(format!("unknown escape mode `{other}`"))),
    };
    Ok(Value::String(escaped))
}

fn raw(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(arg(args, 0).clone())
}

/// Replaces every occurrence of each key of the map by its value, scanning
/// left to right; the first key that matches at a position wins.
fn replace(args: &[Value]) -> Result<Value, FunctionError> {
    let (Value::String(s), Value::Map(pairs)) = (arg(args, 0), arg(args, 1)) else {
        return Ok(arg(args, 0).clone());
    };

    let mut out = String::with_capacity(s.len());
    let mut rest = s.as_str();
    'scan: while let Some(c) = rest.chars().next() {
        for (from, to) in pairs.iter().filter(|(from, _)| !from.is_empty()) {
            if let Some(after) = rest.strip_prefix(from.as_str()) {
                out.push_str(&to.to_string());
                rest = after;
                continue 'scan;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Ok(Value::String(out))
}

fn abs(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::Number(arg(args, 0).to_number().abs()))
}

/// Arguments of `min`/`max`: a single collection is spread.
fn numeric_args(args: &[Value]) -> Vec<&Value> {
    match args {
        [Value::List(items)] => items.iter().collect(),
        [Value::Map(map)] => map.values().collect(),
        _ => args.iter().collect(),
    }
}

fn fold_numbers(args: &[Value], init: f64, pick: fn(f64, f64) -> f64) -> Value {
    let mut acc = init;
    for v in numeric_args(args) {
        match v {
            Value::Number(n) => acc = pick(acc, *n),
            _ => return Value::Number(f64::NAN),
        }
    }
    Value::Number(acc)
}

fn min(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(fold_numbers(args, f64::INFINITY, f64::min))
}

fn max(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(fold_numbers(args, f64::NEG_INFINITY, f64::max))
}
