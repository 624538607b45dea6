//! Conversion between JSON documents and XML-RPC values.
//!
//! Objects with a single `$base64` or `$datetime` key select the binary and
//! date types; every other object maps to a struct.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDateTime;
use serde_json::{Map, Number, Value as Json};
use std::error::Error;
use xrpc_protocol::{Struct, Value, DATETIME_FORMAT};

const BASE64_KEY: &str = "$base64";
const DATETIME_KEY: &str = "$datetime";

/// Converts a JSON document to an XML-RPC value.
pub fn to_value(json: &Json) -> Result<Value, Box<dyn Error>> {
    Ok(match json {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => number_to_value(n)?,
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(to_value).collect::<Result<_, _>>()?),
        Json::Object(map) => object_to_value(map)?,
    })
}

fn number_to_value(n: &Number) -> Result<Value, Box<dyn Error>> {
    if let Some(i) = n.as_i64() {
        return Ok(match i32::try_from(i) {
            Ok(small) => Value::Int32(small),
            Err(_) => Value::Int64(i),
        });
    }
    if n.is_u64() {
        return Err(format!("integer {} does not fit in 64 bits", n).into());
    }
    n.as_f64()
        .map(Value::Double)
        .ok_or_else(|| format!("unsupported number {}", n).into())
}

fn object_to_value(map: &Map<String, Json>) -> Result<Value, Box<dyn Error>> {
    if map.len() == 1 {
        if let Some(encoded) = map.get(BASE64_KEY) {
            let encoded = encoded
                .as_str()
                .ok_or("$base64 expects a string")?;
            return Ok(Value::Bytes(STANDARD.decode(encoded)?));
        }
        if let Some(text) = map.get(DATETIME_KEY) {
            let text = text.as_str().ok_or("$datetime expects a string")?;
            return Ok(Value::DateTime(parse_datetime(text)?));
        }
    }
    let members = map
        .iter()
        .map(|(name, value)| Ok((name.clone(), to_value(value)?)))
        .collect::<Result<Vec<(String, Value)>, Box<dyn Error>>>()?;
    Ok(Value::Struct(members.into_iter().collect::<Struct>()))
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime, Box<dyn Error>> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| format!("invalid $datetime {:?}, expected YYYYMMDDTHH:MM:SS", text).into())
}

/// Converts an XML-RPC value to JSON for display.
pub fn from_value(value: &Value) -> Json {
    match value {
        Value::Int32(i) => Json::from(*i),
        Value::Int64(i) => Json::from(*i),
        Value::Double(d) => Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null),
        Value::Bool(b) => Json::Bool(*b),
        Value::Str(s) => Json::String(s.clone()),
        Value::DateTime(dt) => tagged(DATETIME_KEY, dt.format(DATETIME_FORMAT).to_string()),
        Value::Bytes(bytes) => tagged(BASE64_KEY, STANDARD.encode(bytes)),
        Value::Struct(s) => Json::Object(
            s.iter()
                .map(|(name, value)| (name.to_string(), from_value(value)))
                .collect(),
        ),
        Value::Array(items) => Json::Array(items.iter().map(from_value).collect()),
        Value::Nil => Json::Null,
    }
}

fn tagged(key: &str, text: String) -> Json {
    let mut map = Map::new();
    map.insert(key.to_string(), Json::String(text));
    Json::Object(map)
}

/// Parses one command-line parameter.
///
/// `@path` reads JSON from a file. Arguments that are not valid JSON are
/// taken as plain strings.
pub fn parse_param(arg: &str) -> Result<Value, Box<dyn Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        return to_value(&serde_json::from_str(&content)?);
    }
    match serde_json::from_str::<Json>(arg) {
        Ok(json) => to_value(&json),
        Err(_) => Ok(Value::Str(arg.to_string())),
    }
}

/// Formats JSON for display.
pub fn format_json(value: &Json) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
