use serde_json::{Map, Value};

/// The search API omits fields holding their default value (zero metrics,
/// empty names). Fills every selected field back in as null so each page
/// has the same columns.
pub fn fill_selected(mut record: Value, selected: &[String]) -> Value {
    if let Value::Object(root) = &mut record {
        for field in selected {
            fill_path(root, field);
        }
    }
    record
}

fn fill_path(root: &mut Map<String, Value>, field: &str) {
    let mut node = root;
    let mut segments = field.split('.').map(lower_camel).peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            node.entry(segment).or_insert(Value::Null);
            return;
        }
        let child = node
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));
        match child {
            Value::Object(inner) => node = inner,
            _ => return,
        }
    }
}

/// `cost_micros` → `costMicros`, matching the REST field names.
fn lower_camel(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper = false;
    for c in segment.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
