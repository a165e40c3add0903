//! Dot-path access into a JSON document (`get`/`set` operations, spec §4.8).

use anyhow::{Result, bail};
use serde_json::Value;

/// Read a field addressed by a dot-separated path, e.g. `"metrics.files_changed"`.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write a field addressed by a dot-separated path. Intermediate objects are
/// created as needed; intermediate array indices must already exist.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    set_inner(root, &segments, value)
}

fn set_inner(node: &mut Value, segments: &[&str], value: Value) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        bail!("empty path segment");
    };
    if rest.is_empty() {
        match node {
            Value::Object(map) => {
                map.insert((*head).to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let idx: usize = head
                    .parse()
                    .map_err(|_| anyhow::anyhow!("'{head}' is not a valid array index"))?;
                if idx >= items.len() {
                    bail!("array index {idx} out of bounds (len {})", items.len());
                }
                items[idx] = value;
                Ok(())
            }
            _ => bail!("cannot index into a scalar at '{head}'"),
        }
    } else {
        match node {
            Value::Object(map) => {
                let child = map
                    .entry((*head).to_string())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
                set_inner(child, rest, value)
            }
            Value::Array(items) => {
                let idx: usize = head
                    .parse()
                    .map_err(|_| anyhow::anyhow!("'{head}' is not a valid array index"))?;
                let child = items
                    .get_mut(idx)
                    .ok_or_else(|| anyhow::anyhow!("array index {idx} out of bounds"))?;
                set_inner(child, rest, value)
            }
            _ => bail!("cannot descend into a scalar at '{head}'"),
        }
    }
}

/// Parse a raw CLI/config string into a JSON scalar, preserving the author's
/// evident type rather than forcing everything through as a string (spec
/// §4.8, "set preserves type"). Falls back to a plain string.
pub fn parse_scalar(raw: &str) -> Value {
    if raw == "null" {
        return Value::Null;
    }
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(raw.to_string())
}
