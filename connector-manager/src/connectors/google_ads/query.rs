//! GAQL helpers.

use adsync::FetchWindow;

/// Adds `segments.date BETWEEN` for the window unless the query already
/// constrains `segments.date`.
pub fn with_date_range(query: &str, window: &FetchWindow) -> String {
    let query = query.trim();
    let lower = query.to_ascii_lowercase();
    if find_keyword(&lower, &["segments.date", "between"]).is_some()
        || find_keyword(&lower, &["segments.date", "during"]).is_some()
    {
        return query.to_string();
    }

    let clause = format!(
        "segments.date BETWEEN '{}' AND '{}'",
        window.start_date(),
        window.end_date()
    );

    // ORDER BY, LIMIT and PARAMETERS must stay after WHERE.
    let tail_at = [&["order", "by"][..], &["limit"], &["parameters"]]
        .iter()
        .filter_map(|kw| find_keyword(&lower, kw))
        .min()
        .unwrap_or(query.len());
    let (head, tail) = query.split_at(tail_at);

    let joiner = if find_keyword(&lower[..tail_at], &["where"]).is_some() {
        "AND"
    } else {
        "WHERE"
    };
    let mut out = format!("{} {} {}", head.trim_end(), joiner, clause);
    if !tail.is_empty() {
        out.push(' ');
        out.push_str(tail);
    }
    out
}

/// Dotted field names between SELECT and FROM.
pub fn selected_fields(query: &str) -> Vec<String> {
    let lower = query.to_ascii_lowercase();
    let Some(select) = find_keyword(&lower, &["select"]) else {
        return Vec::new();
    };
    let body = select + "select".len();
    let Some(from) = find_keyword(&lower[body..], &["from"]) else {
        return Vec::new();
    };
    query[body..body + from]
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// Byte offset of the first standalone occurrence of `words`, separated by
/// any run of whitespace. `lower` must already be lowercase.
fn find_keyword(lower: &str, words: &[&str]) -> Option<usize> {
    let bytes = lower.as_bytes();
    let first = words.first()?;
    let mut from = 0;

    while let Some(found) = lower[from..].find(first) {
        let start = from + found;
        from = start + 1;
        if start > 0 && is_word_byte(bytes[start - 1]) {
            continue;
        }

        let mut pos = start + first.len();
        let mut matched = true;
        for word in &words[1..] {
            let gap = bytes[pos..].iter().take_while(|b| b.is_ascii_whitespace()).count();
            if gap == 0 || !lower[pos + gap..].starts_with(word) {
                matched = false;
                break;
            }
            pos += gap + word.len();
        }
        if matched && bytes.get(pos).map_or(true, |b| !is_word_byte(*b)) {
            return Some(start);
        }
    }
    None
}
