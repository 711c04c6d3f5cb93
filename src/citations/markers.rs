// Bracketed citation marker scanning

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// `[3]`, `[1, 4]`, `[2; 5]`
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*\d+(?:\s*[,;]\s*\d+)*\s*\]").expect("marker pattern is valid")
});

static LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("label pattern is valid"));

/// One citation label found in text. `span` covers the label digits only,
/// so replacing it keeps brackets and group separators intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMatch {
    pub label: String,
    pub span: Range<usize>,
}

/// Find every citation label in reading order.
///
/// A bracket immediately followed by `(` is a Markdown link such as
/// `[1](https://…)` and is skipped.
pub fn scan_markers(text: &str) -> Vec<MarkerMatch> {
    let mut found = Vec::new();
    for marker in MARKER.find_iter(text) {
        if text[marker.end()..].starts_with('(') {
            continue;
        }
        for label in LABEL.find_iter(marker.as_str()) {
            found.push(MarkerMatch {
                label: canonical_label(label.as_str()),
                span: marker.start() + label.start()..marker.start() + label.end(),
            });
        }
    }
    found
}

/// Raw labels in order of appearance, e.g. `["1", "3", "1"]`.
pub fn marker_labels(text: &str) -> Vec<String> {
    scan_markers(text).into_iter().map(|m| m.label).collect()
}

/// Normalise a raw marker token: strips brackets and whitespace, and
/// drops leading zeros from numeric labels (`[01]` and `1` are the same).
pub fn canonical_label(raw: &str) -> String {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']').trim();
    match inner.parse::<u64>() {
        Ok(n) => n.to_string(),
        Err(_) => inner.to_string(),
    }
}

/// Replace each span with the string chosen for it. Spans must be sorted
/// and non-overlapping; returns the new text and the new span of every
/// replacement.
pub(crate) fn splice(text: &str, replacements: &[(Range<usize>, String)]) -> (String, Vec<Range<usize>>) {
    let mut out = String::with_capacity(text.len());
    let mut spans = Vec::with_capacity(replacements.len());
    let mut cursor = 0;
    for (span, replacement) in replacements {
        out.push_str(&text[cursor..span.start]);
        let start = out.len();
        out.push_str(replacement);
        spans.push(start..out.len());
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    (out, spans)
}
