//! Message and origin normalization.

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalized messages are cut to this many characters.
pub const MAX_MESSAGE_CHARS: usize = 256;

/// Input beyond this many characters is never scanned. Placeholders are
/// shorter than what they replace, so the cut leaves room to fill
/// `MAX_MESSAGE_CHARS` after normalization.
const SCAN_LIMIT_CHARS: usize = MAX_MESSAGE_CHARS * 4;

/// Volatile substrings and their stable replacements, applied in order.
static VOLATILE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // RFC 3339 / ISO 8601 timestamps, with optional fraction and zone.
        (
            r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
            "<ts>",
        ),
        // Bare clock times (12:03:44.123).
        (r"\b\d{2}:\d{2}:\d{2}(?:\.\d+)?\b", "<time>"),
        (
            r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b",
            "<uuid>",
        ),
        (r"(?i)\b0x[0-9a-f]+\b", "<addr>"),
        // Long hex runs: request ids, hashes.
        (r"(?i)\b[0-9a-f]{16,}\b", "<hex>"),
        (r"\b\d{4,}\b", "<n>"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

static WHITESPACE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\s+").ok());

/// Strip volatile substrings, collapse whitespace and truncate.
pub fn normalize_message(raw: &str) -> String {
    let mut text = truncate_chars(raw, SCAN_LIMIT_CHARS);
    for (re, replacement) in VOLATILE_PATTERNS.iter() {
        if re.is_match(&text) {
            text = re.replace_all(&text, *replacement).into_owned();
        }
    }
    if let Some(ws) = WHITESPACE.as_ref() {
        text = ws.replace_all(&text, " ").into_owned();
    }
    truncate_chars(text.trim(), MAX_MESSAGE_CHARS)
}

/// Reduce `file:line:col` to `file:line`; other shapes pass through trimmed.
pub fn normalize_origin(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut parts = trimmed.rsplitn(3, ':');
    let last = parts.next();
    let middle = parts.next();
    let head = parts.next();
    match (head, middle, last) {
        (Some(file), Some(line), Some(col))
            if is_digits(line) && is_digits(col) && !file.is_empty() =>
        {
            format!("{}:{}", file, line)
        }
        _ => trimmed.to_string(),
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_timestamps_and_addresses() {
        let a = normalize_message("lock timeout at 2024-03-01T12:00:01.123Z on object 0x7ffd5e8c");
        let b = normalize_message("lock timeout at 2025-11-30T08:14:59Z on object 0x10a3");
        assert_eq!(a, b);
        assert_eq!(a, "lock timeout at <ts> on object <addr>");
    }

    #[test]
    fn strips_uuids_ids_and_long_numbers() {
        let a = normalize_message(
            "order 982341 failed for request 6f1c1d1e-58a7-4c37-9d1a-2f6a1f0c9b11",
        );
        let b = normalize_message(
            "order 100200 failed for request 0b7e9c55-2d2b-4b7f-8f55-7d3a0bb2c1aa",
        );
        assert_eq!(a, b);
        // short numbers are meaningful (status codes, ports) and stay
        assert_eq!(normalize_message("HTTP 503 from upstream"), "HTTP 503 from upstream");
    }

    #[test]
    fn collapses_whitespace_and_truncates_on_char_boundary() {
        assert_eq!(normalize_message("  a \n\t b  "), "a b");
        let long = "é".repeat(MAX_MESSAGE_CHARS + 40);
        let out = normalize_message(&long);
        assert_eq!(out.chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn huge_messages_are_cut_before_scanning() {
        let head = "payload rejected by validator ";
        let a = format!("{}{}", head, "x".repeat(1 << 20));
        let b = format!("{}{}{}", head, "x".repeat(SCAN_LIMIT_CHARS), "tail 0xdeadbeef");
        let out = normalize_message(&a);
        assert_eq!(out.chars().count(), MAX_MESSAGE_CHARS);
        assert!(out.starts_with(head.trim_end()));
        assert_eq!(out, normalize_message(&b));
    }

    #[test]
    fn origin_drops_column() {
        assert_eq!(normalize_origin("src/handlers/user.rs:42:17"), "src/handlers/user.rs:42");
        assert_eq!(normalize_origin("src/handlers/user.rs:42"), "src/handlers/user.rs:42");
        assert_eq!(normalize_origin(" worker "), "worker");
        assert_eq!(normalize_origin("C:\\app\\main.rs:10:2"), "C:\\app\\main.rs:10");
    }
}
