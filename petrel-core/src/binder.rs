//! Parameter binding: building the arguments a handler declares out of a
//! single request.
//!
//! Each handler carries an explicit descriptor list ([`ParamSpec`]) built at
//! registration time - nothing is inspected per request. For every declared
//! parameter the binder walks the sources in a fixed precedence order: the
//! request itself, path captures, query parameters, headers, cookies, the
//! body (only for types that want structured data), and finally the declared
//! default. The first source that claims the name wins. Failures surface as
//! 422 errors naming the parameter, never as a crash.

use std::collections::HashMap;

use serde_json::{Number, Value};

use crate::error::{ApiError, ApiResult};
use crate::http::constants::headers;
use crate::http::HttpRequest;

/// Declared shape of a handler parameter.
///
/// Scalar variants exist for introspection and documentation; coercion of
/// path/header/cookie values is literal-driven regardless of the declared
/// scalar. Container variants change how query lists are shaped, and
/// `Json`/`List`/`Record` mark parameters fed from the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// No particular shape; plain coerced value.
    Value,
    Bool,
    Int,
    Float,
    Str,
    /// A JSON list; query lists bind here, otherwise the decoded body.
    List,
    /// Like a list, but deduplicated preserving first occurrence.
    Set,
    /// A fixed-shape sequence; bound as a JSON list.
    Tuple,
    /// Raw structured data: the decoded JSON body (or body text).
    Json,
    /// A named record; the body must decode to a JSON object.
    Record(&'static str),
}

impl ParamType {
    /// Whether an unclaimed parameter of this type is fed from the body.
    pub fn wants_body(self) -> bool {
        matches!(self, ParamType::List | ParamType::Json | ParamType::Record(_))
    }

    /// Human-readable type name used by errors and introspection.
    pub fn display_name(self) -> String {
        match self {
            ParamType::Value => "Value".to_string(),
            ParamType::Bool => "Bool".to_string(),
            ParamType::Int => "Int".to_string(),
            ParamType::Float => "Float".to_string(),
            ParamType::Str => "Str".to_string(),
            ParamType::List => "List".to_string(),
            ParamType::Set => "Set".to_string(),
            ParamType::Tuple => "Tuple".to_string(),
            ParamType::Json => "Json".to_string(),
            ParamType::Record(name) => format!("Record({})", name),
        }
    }
}

/// One declared handler parameter: name, shape, optional default.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self { name: name.into(), ty, default: None }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// The bound arguments handed to a handler, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(HashMap<String, Value>);

impl Args {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Coerce a literal token: booleans, nulls, integers, floats, else the
/// original string untouched.
pub fn parse_literal(raw: &str) -> Value {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();

    if lowered == "true" || lowered == "false" {
        return Value::Bool(lowered == "true");
    }
    if lowered == "null" || lowered == "none" {
        return Value::Null;
    }

    let digits = trimmed
        .strip_prefix(|c| c == '+' || c == '-')
        .unwrap_or(trimmed);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::Number(Number::from(n));
        }
    }

    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }

    Value::String(raw.to_string())
}

/// Parse a value as JSON when it looks like an object or array; `None`
/// otherwise (including parse failures - the literal string stays in play).
pub fn parse_json_maybe(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    let looks_like_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !looks_like_json {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Full scalar coercion for path, header, and cookie values: opportunistic
/// JSON first, literal coercion otherwise.
pub fn coerce_scalar(raw: &str) -> Value {
    parse_json_maybe(raw).unwrap_or_else(|| parse_literal(raw))
}

/// Reshape a coerced list to the container the declared type asks for.
fn cast_sequence(value: Value, ty: ParamType) -> Value {
    match (ty, value) {
        (ParamType::Set, Value::Array(items)) => {
            let mut seen: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !seen.contains(&item) {
                    seen.push(item);
                }
            }
            Value::Array(seen)
        }
        (_, value) => value,
    }
}

/// Resolve a query parameter: repeated keys and comma-joined singles become
/// coerced lists; JSON-looking singles parse as JSON; plain singles coerce
/// as literals.
pub fn parse_query_value(name: &str, ty: ParamType, request: &HttpRequest) -> Value {
    let values = request.query_all(name);

    if values.len() > 1 {
        let parsed = values.into_iter().map(parse_literal).collect();
        return cast_sequence(Value::Array(parsed), ty);
    }

    let Some(single) = values.first() else {
        return Value::Null;
    };

    if let Some(json) = parse_json_maybe(single) {
        return cast_sequence(json, ty);
    }

    if single.contains(',') {
        let parsed = single.split(',').map(parse_literal).collect();
        return cast_sequence(Value::Array(parsed), ty);
    }

    parse_literal(single)
}

/// Decoded request body, computed at most once per bind.
fn decode_body(request: &HttpRequest) -> Value {
    let body = request.body();
    if body.is_empty() {
        return Value::Null;
    }

    let is_json = request
        .header(headers::CONTENT_TYPE)
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);

    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(_) if is_json => Value::Null,
        Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()),
    }
}

/// Bind every declared parameter of a handler from the request.
///
/// A parameter literally named `request` is satisfied by the request value
/// handlers already receive, so the binder skips it.
pub fn bind_args(params: &[ParamSpec], request: &HttpRequest) -> ApiResult<Args> {
    let mut bound = HashMap::with_capacity(params.len());
    let mut body_cache: Option<Value> = None;

    for param in params {
        if param.name == "request" {
            continue;
        }

        if let Some(value) = request.path_param(&param.name) {
            bound.insert(param.name.clone(), coerce_scalar(value));
            continue;
        }

        if request.has_query(&param.name) {
            bound.insert(param.name.clone(), parse_query_value(&param.name, param.ty, request));
            continue;
        }

        if let Some(value) = request.header(&param.name) {
            bound.insert(param.name.clone(), coerce_scalar(value));
            continue;
        }

        if let Some(value) = request.cookie(&param.name) {
            bound.insert(param.name.clone(), coerce_scalar(value));
            continue;
        }

        if param.ty.wants_body() {
            let body = body_cache.get_or_insert_with(|| decode_body(request));
            if let ParamType::Record(record) = param.ty {
                if !body.is_object() {
                    return Err(ApiError::invalid_body(&param.name, record));
                }
            }
            bound.insert(param.name.clone(), body.clone());
            continue;
        }

        if let Some(default) = &param.default {
            bound.insert(param.name.clone(), default.clone());
            continue;
        }

        return Err(ApiError::missing_param(&param.name));
    }

    Ok(Args(bound))
}
