use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

static JSON_LD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Every JSON-LD object on the page, with `@graph` wrappers and arrays flattened
pub fn nodes(document: &Html) -> Vec<Value> {
    let mut nodes = Vec::new();
    for script in document.select(&JSON_LD_SELECTOR) {
        let raw = script.text().collect::<String>();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => flatten(value, &mut nodes),
            Err(e) => tracing::debug!(error = %e, "Skipping malformed JSON-LD block"),
        }
    }
    nodes
}

fn flatten(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|item| flatten(item, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten(graph, out);
            }
            if map.contains_key("@type") {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

/// `@type` names of a node, whether given as a string or an array.
///
/// URL-form types (`http://schema.org/Product`) are reduced to their last segment.
pub fn types(node: &Value) -> Vec<String> {
    let short = |s: &str| s.rsplit(['/', '#']).next().unwrap_or(s).to_string();
    match node.get("@type") {
        Some(Value::String(t)) => vec![short(t)],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(short).collect(),
        _ => Vec::new(),
    }
}

pub fn has_type(node: &Value, wanted: &[&str]) -> bool {
    types(node).iter().any(|t| wanted.iter().any(|w| t.eq_ignore_ascii_case(w)))
}

/// Strings found under a key: a string, a list of strings, or objects with `name`
pub fn strings(node: &Value, key: &str) -> Vec<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => {
                let s = s.trim();
                if !s.is_empty() {
                    out.push(s.to_string());
                }
            }
            Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
            Value::Object(map) => {
                if let Some(name) = map.get("name") {
                    collect(name, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    if let Some(value) = node.get(key) {
        collect(value, &mut out);
    }
    out
}
